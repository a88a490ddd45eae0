//! URL Path Maintenance
//!
//! `url_path` is denormalized: each page stores the slugs of all its
//! ancestors. These helpers compute it and keep descendants in step after a
//! page's own path changes.

use libsql::Connection;

use crate::db::{DatabaseError, DatabaseService};
use crate::models::Page;

/// URL path `page` would have under `parent`
///
/// Pure: nothing is persisted.
pub fn derive_url_path(page: &Page, parent: Option<&Page>) -> String {
    url_path_for_slug(&page.slug, parent)
}

pub(crate) fn url_path_for_slug(slug: &str, parent: Option<&Page>) -> String {
    match parent {
        Some(parent) => format!("{}{}/", parent.url_path, slug),
        None => format!("{}/", slug),
    }
}

/// Replace `old_url_path` with `new_url_path` as the prefix of every strict
/// descendant of `page`
///
/// `page.path` must already be the node's new structural path. Runs as one
/// statement on `conn`; suffixes are preserved, not recomputed.
pub async fn update_descendant_url_paths(
    db: &DatabaseService,
    conn: &Connection,
    page: &Page,
    old_url_path: &str,
    new_url_path: &str,
) -> Result<u64, DatabaseError> {
    let updated = db
        .update_descendant_url_paths(conn, &page.path, page.id, old_url_path, new_url_path)
        .await?;
    tracing::debug!(
        "Rewrote url_path prefix '{}' -> '{}' on {} descendant(s) of page {}",
        old_url_path,
        new_url_path,
        updated,
        page.id
    );
    Ok(updated)
}
