//! Reports
//!
//! Read-only views over pages and the audit log.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::DatabaseService;
use crate::models::Page;
use crate::services::error::PageServiceError;

/// One row of the aging pages report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgingPage {
    pub page: Page,
    pub status: &'static str,
    /// Actor of the latest `publish` audit entry, if any
    pub last_published_by: Option<String>,
}

/// Filters for [`aging_pages`]
#[derive(Debug, Clone, Copy, Default)]
pub struct AgingFilter {
    /// Only pages last published at or before this instant
    pub last_published_before: Option<DateTime<Utc>>,
    /// Only live (`Some(true)`) or only unpublished (`Some(false)`) pages
    pub live: Option<bool>,
}

/// Published pages ordered by how long ago they were last published
///
/// Pages that were never published are left out. Unpublished pages stay in
/// unless the filter asks for live ones only.
pub async fn aging_pages(
    db: &DatabaseService,
    filter: AgingFilter,
) -> Result<Vec<AgingPage>, PageServiceError> {
    let conn = db.connect_with_timeout().await?;
    let rows = db
        .fetch_published_pages(&conn, filter.last_published_before.as_ref(), filter.live)
        .await?;
    tracing::debug!("Aging pages report: {} page(s)", rows.len());

    Ok(rows
        .into_iter()
        .map(|row| AgingPage {
            status: row.page.status_string(),
            page: row.page,
            last_published_by: row.last_published_by,
        })
        .collect())
}
