//! Business Services
//!
//! This module contains the core business logic services:
//!
//! - `PageService` - Page creation, tree reads, publishing, deletion, translation copies
//! - `MovePageAction` - Atomic page moves with URL path propagation
//! - `LocaleService` / `LocaleContext` - Locale lifecycle and default resolution
//! - `PageSignals` - Synchronous pre/post move hooks
//! - `audit_log` - Append-only page audit entries
//! - `reports` - Aging pages report
//!
//! Services coordinate between the database layer and application logic,
//! implementing business rules and orchestrating multi-step operations.

pub mod audit_log;
pub mod error;
pub mod locale_service;
pub mod move_page;
pub mod page_service;
pub mod reports;
pub mod signals;
pub mod url_path;

pub use error::PageServiceError;
pub use locale_service::{LocaleContext, LocaleService};
pub use move_page::{MoveOutcome, MovePageAction};
pub use page_service::PageService;
pub use reports::{aging_pages, AgingFilter, AgingPage};
pub use signals::{PageMoveEvent, PageSignals, ReceiverHandle, Signal};
pub use url_path::{derive_url_path, update_descendant_url_paths};
