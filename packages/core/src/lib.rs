//! Canopy Core Business Logic Layer
//!
//! This crate provides the page tree, locale management and audit log for the
//! Canopy content management system.
//!
//! # Architecture
//!
//! - **Materialized paths**: tree position encoded as fixed-width path steps
//! - **Denormalized URLs**: every page stores its full `url_path`, kept in sync
//!   by the move operation
//! - **libsql**: Embedded SQLite-compatible database, one explicit transaction
//!   per structural change
//!
//! # Modules
//!
//! - [`models`] - Data structures (Page, Locale, PageLogEntry)
//! - [`services`] - Business services (PageService, LocaleService, reports)
//! - [`db`] - Database layer with libsql integration
//! - [`config`] - Site and language configuration

pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::{CanopyConfig, ConfigError, LanguageConfig};
pub use models::*;
pub use services::*;
