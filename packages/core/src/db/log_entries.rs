//! Audit Log Row Operations
//!
//! Insert and read `page_log_entries`. There is deliberately no update or
//! delete operation.

use libsql::{Connection, Row};

use crate::db::database::{format_timestamp, parse_timestamp, DatabaseService};
use crate::db::error::DatabaseError;
use crate::models::{LogAction, NewLogEntry, PageLogEntry};

fn decode(context: &str, e: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::row_decode("page_log_entry", format!("{}: {}", context, e))
}

fn row_to_log_entry(row: &Row) -> Result<PageLogEntry, DatabaseError> {
    let action: String = row.get(2).map_err(|e| decode("action", e))?;
    let data: String = row.get(5).map_err(|e| decode("data", e))?;
    let deleted: i64 = row.get(6).map_err(|e| decode("deleted", e))?;
    let timestamp: String = row.get(7).map_err(|e| decode("timestamp", e))?;

    Ok(PageLogEntry {
        id: row.get(0).map_err(|e| decode("id", e))?,
        page_id: row.get(1).map_err(|e| decode("page_id", e))?,
        action: action
            .parse::<LogAction>()
            .map_err(|e| decode("action", e))?,
        actor: row.get(3).map_err(|e| decode("actor", e))?,
        label: row.get(4).map_err(|e| decode("label", e))?,
        data: serde_json::from_str(&data).map_err(|e| decode("data", e))?,
        deleted: deleted != 0,
        timestamp: parse_timestamp(&timestamp).map_err(|e| decode("timestamp", e))?,
    })
}

impl DatabaseService {
    /// Append an audit entry and return its id
    pub async fn insert_log_entry(&self, conn: &Connection, entry: &NewLogEntry) -> Result<i64, DatabaseError> {
        let data = serde_json::to_string(&entry.data)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to serialize log data: {}", e)))?;
        self.execute(
            conn,
            "insert_log_entry",
            "INSERT INTO page_log_entries (page_id, action, actor, label, data, deleted, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                entry.page_id,
                entry.action.as_str(),
                entry.actor.clone(),
                entry.label.clone(),
                data,
                entry.deleted as i64,
                format_timestamp(&chrono::Utc::now()),
            ),
        )
        .await?;
        Ok(conn.last_insert_rowid())
    }

    /// Entries for one page, oldest first
    pub async fn log_entries_for_page(
        &self,
        conn: &Connection,
        page_id: i64,
    ) -> Result<Vec<PageLogEntry>, DatabaseError> {
        self.select_log_entries(
            conn,
            "log_entries_for_page",
            "SELECT id, page_id, action, actor, label, data, deleted, timestamp
             FROM page_log_entries WHERE page_id = ? ORDER BY id",
            [page_id],
        )
        .await
    }

    /// The most recent `limit` entries across all pages, newest first
    pub async fn recent_log_entries(
        &self,
        conn: &Connection,
        limit: i64,
    ) -> Result<Vec<PageLogEntry>, DatabaseError> {
        self.select_log_entries(
            conn,
            "recent_log_entries",
            "SELECT id, page_id, action, actor, label, data, deleted, timestamp
             FROM page_log_entries ORDER BY id DESC LIMIT ?",
            [limit],
        )
        .await
    }

    async fn select_log_entries(
        &self,
        conn: &Connection,
        operation: &str,
        sql: &str,
        params: [i64; 1],
    ) -> Result<Vec<PageLogEntry>, DatabaseError> {
        let mut rows = self.query(conn, operation, sql, params).await?;
        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            entries.push(row_to_log_entry(&row)?);
        }
        Ok(entries)
    }
}
