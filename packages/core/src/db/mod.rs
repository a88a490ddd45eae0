//! Database Layer
//!
//! This module handles all database interactions using libsql:
//!
//! - Database initialization and connection management
//! - Row operations for pages, locales and audit log entries
//! - Materialized-path tree positioning
//! - Per-operation query metrics
//!
//! # Architecture
//!
//! Every row operation takes the `libsql::Connection` to run on, so the
//! service layer can open one connection, `begin` a transaction, compose any
//! number of operations and `commit` (or `rollback`) them together.

mod database;
mod error;
pub mod events;
mod locales;
mod log_entries;
pub mod metrics;
mod pages;
pub mod tree;

pub use database::{format_timestamp, parse_timestamp, DatabaseService};
pub use error::DatabaseError;
pub use events::DomainEvent;
pub use locales::LocaleRecord;
pub use metrics::{QueryMetrics, QueryStats};
pub use pages::{DbCreatePageParams, PublishedPageRow};
pub use tree::{MaterializedPathTree, TreeError, TreePositioner};
