//! Page Audit Log
//!
//! Builds `page_log_entries` rows for page actions. Entries are append-only;
//! callers pass the connection so an entry can be written inside the same
//! transaction as the change it describes, or right after it commits.

use libsql::Connection;
use serde_json::json;

use crate::db::{DatabaseError, DatabaseService};
use crate::models::{LogAction, MoveLogData, NewLogEntry, Page, PageSummary};

/// `reorder` when the parent did not change, `move` otherwise
pub fn move_action(parent_before: Option<&Page>, parent_after: Option<&Page>) -> LogAction {
    if parent_before.map(|p| p.id) == parent_after.map(|p| p.id) {
        LogAction::Reorder
    } else {
        LogAction::Move
    }
}

fn summary(page: Option<&Page>, site_name: &str) -> Option<PageSummary> {
    page.map(|p| PageSummary {
        id: p.id,
        title: p.admin_display_title(site_name),
    })
}

/// Record a move or reorder of `page`
pub async fn log_move(
    db: &DatabaseService,
    conn: &Connection,
    page: &Page,
    parent_before: Option<&Page>,
    parent_after: Option<&Page>,
    actor: Option<&str>,
    site_name: &str,
) -> Result<i64, DatabaseError> {
    let data = MoveLogData {
        source: summary(parent_before, site_name),
        destination: summary(parent_after, site_name),
    };
    let data = serde_json::to_value(&data)
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to encode move data: {}", e)))?;

    let entry = NewLogEntry::new(page.id, move_action(parent_before, parent_after), &page.title)
        .by(actor)
        .with_data(data);
    db.insert_log_entry(conn, &entry).await
}

/// Record a plain action (`create`, `publish`, `unpublish`) with an empty payload
pub async fn log_action(
    db: &DatabaseService,
    conn: &Connection,
    page: &Page,
    action: LogAction,
    actor: Option<&str>,
) -> Result<i64, DatabaseError> {
    let entry = NewLogEntry::new(page.id, action, &page.title).by(actor);
    db.insert_log_entry(conn, &entry).await
}

/// Record the deletion of `page`; the entry outlives the page
pub async fn log_deletion(
    db: &DatabaseService,
    conn: &Connection,
    page: &Page,
    actor: Option<&str>,
) -> Result<i64, DatabaseError> {
    let entry = NewLogEntry::new(page.id, LogAction::Delete, &page.title)
        .by(actor)
        .with_data(json!({ "url_path": page.url_path }))
        .deleted();
    db.insert_log_entry(conn, &entry).await
}

/// Record a translation copy of `source` into `copy`
pub async fn log_translation_copy(
    db: &DatabaseService,
    conn: &Connection,
    source: &Page,
    copy: &Page,
    language_code: &str,
    actor: Option<&str>,
) -> Result<i64, DatabaseError> {
    let entry = NewLogEntry::new(copy.id, LogAction::CopyForTranslation, &copy.title)
        .by(actor)
        .with_data(json!({
            "source": { "id": source.id, "title": source.title },
            "locale": language_code,
        }));
    db.insert_log_entry(conn, &entry).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn page(id: i64) -> Page {
        Page {
            id,
            path: "0001".to_string(),
            depth: 1,
            numchild: 0,
            title: format!("Page {}", id),
            slug: format!("page-{}", id),
            url_path: format!("page-{}/", id),
            locale_id: 1,
            translation_key: Uuid::new_v4(),
            live: false,
            first_published_at: None,
            last_published_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_move_action_classification() {
        let (a, b) = (page(1), page(2));
        assert_eq!(move_action(Some(&a), Some(&a.clone())), LogAction::Reorder);
        assert_eq!(move_action(None, None), LogAction::Reorder);
        assert_eq!(move_action(Some(&a), Some(&b)), LogAction::Move);
        assert_eq!(move_action(None, Some(&b)), LogAction::Move);
    }

    #[test]
    fn test_summary_uses_site_name_for_roots() {
        let root = page(1);
        let s = summary(Some(&root), "My Site").unwrap();
        assert_eq!(s.title, "My Site");
        assert_eq!(s.id, 1);
        assert!(summary(None, "My Site").is_none());
    }
}
