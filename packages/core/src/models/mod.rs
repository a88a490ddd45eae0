//! Data Models
//!
//! - `Page` - One node of the content tree
//! - `Locale` - A content language
//! - `PageLogEntry` - Append-only audit record

mod locale;
mod log_entry;
mod page;

pub use locale::Locale;
pub use log_entry::{LogAction, MoveLogData, NewLogEntry, PageLogEntry, PageSummary};
pub use page::{slugify, validate_slug, NewPage, Page, Position, ValidationError};
