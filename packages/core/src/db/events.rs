//! Domain Events for the Page Tree
//!
//! Events are emitted by `PageService` after a change has been committed,
//! using tokio's broadcast channel so any number of subscribers can observe
//! page changes without coupling to the database layer.
//!
//! # Event Flow
//!
//! 1. `PageService` commits a change (create, move, publish, delete)
//! 2. A domain event is sent on the broadcast channel
//! 3. All subscribers receive the event asynchronously
//!
//! Sending with no subscribers is not an error; the event is dropped.

use serde::{Deserialize, Serialize};

use crate::models::Page;

/// Domain events emitted by `PageService`
///
/// These represent domain-level changes, not database operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    /// A new page was created
    #[serde(rename = "pageCreated")]
    PageCreated { page: Page },

    /// A page was moved or reordered (page reflects the committed state)
    #[serde(rename = "pageMoved", rename_all = "camelCase")]
    PageMoved {
        page: Page,
        url_path_before: String,
        url_path_after: String,
    },

    /// A page was published
    #[serde(rename = "pagePublished")]
    PagePublished { page: Page },

    /// A page was taken offline
    #[serde(rename = "pageUnpublished")]
    PageUnpublished { page: Page },

    /// A page and its subtree were deleted
    #[serde(rename = "pageDeleted", rename_all = "camelCase")]
    PageDeleted { id: i64, descendant_ids: Vec<i64> },

    /// A locale was deleted, with root pages reassigned to `reassigned_to`
    #[serde(rename = "localeDeleted", rename_all = "camelCase")]
    LocaleDeleted {
        language_code: String,
        reassigned_to: Option<String>,
    },
}

impl DomainEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            DomainEvent::PageCreated { .. } => "page:created",
            DomainEvent::PageMoved { .. } => "page:moved",
            DomainEvent::PagePublished { .. } => "page:published",
            DomainEvent::PageUnpublished { .. } => "page:unpublished",
            DomainEvent::PageDeleted { .. } => "page:deleted",
            DomainEvent::LocaleDeleted { .. } => "locale:deleted",
        }
    }

    /// Id of the page this event is about, if any
    pub fn page_id(&self) -> Option<i64> {
        match self {
            DomainEvent::PageCreated { page }
            | DomainEvent::PageMoved { page, .. }
            | DomainEvent::PagePublished { page }
            | DomainEvent::PageUnpublished { page } => Some(page.id),
            DomainEvent::PageDeleted { id, .. } => Some(*id),
            DomainEvent::LocaleDeleted { .. } => None,
        }
    }
}
