//! Database Connection Management
//!
//! This module provides the libsql connection, schema initialization and the
//! statement helpers every store operation goes through.
//!
//! # Architecture
//!
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **Foreign keys**: Enabled on every connection (pages reference locales)
//! - **Connection-scoped operations**: store operations take a `&Connection`
//!   so a caller can group several of them into one transaction
//! - **Query metrics**: each statement is timed and recorded in [`QueryMetrics`]
//!
//! # Transactions
//!
//! Transactions are explicit: `begin` on a connection, run the operations on
//! that same connection, then `commit`, or `rollback` on any error.
//!
//! ```no_run
//! # use canopy_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabaseService::new(PathBuf::from("./data/canopy.db")).await?;
//! let conn = db.connect_with_timeout().await?;
//!
//! db.begin(&conn).await?;
//! match db.set_page_locale(&conn, 1, 2).await {
//!     Ok(_) => db.commit(&conn).await?,
//!     Err(e) => {
//!         db.rollback(&conn).await;
//!         return Err(e.into());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use libsql::params::IntoParams;
use libsql::{Builder, Connection, Database, Rows};

use crate::db::error::DatabaseError;
use crate::db::metrics::QueryMetrics;

/// Database service for managing the libsql connection and schema
#[derive(Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    metrics: Arc<QueryMetrics>,
}

impl std::fmt::Debug for DatabaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseService")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl DatabaseService {
    /// Open (or create) the database at `db_path` and initialize the schema
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DatabaseError::directory_creation_failed(db_path.clone(), e))?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            metrics: Arc::new(QueryMetrics::new()),
        };

        service.initialize_schema(is_new_database).await?;

        tracing::debug!("Database ready at {}", service.db_path.display());
        Ok(service)
    }

    /// Statement metrics recorded by this service
    pub fn metrics(&self) -> &Arc<QueryMetrics> {
        &self.metrics
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(&self, conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Create tables and indexes (idempotent)
    ///
    /// - `locales`: one row per content language
    /// - `pages`: the materialized-path page tree
    /// - `page_log_entries`: append-only audit log (no foreign key, entries
    ///   outlive the pages they describe)
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        let statements = [
            (
                "locales table",
                "CREATE TABLE IF NOT EXISTS locales (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    language_code TEXT NOT NULL UNIQUE
                )",
            ),
            (
                "pages table",
                "CREATE TABLE IF NOT EXISTS pages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    path TEXT NOT NULL,
                    depth INTEGER NOT NULL,
                    numchild INTEGER NOT NULL DEFAULT 0,
                    title TEXT NOT NULL,
                    slug TEXT NOT NULL,
                    url_path TEXT NOT NULL DEFAULT '',
                    locale_id INTEGER NOT NULL,
                    translation_key TEXT NOT NULL,
                    live INTEGER NOT NULL DEFAULT 0,
                    first_published_at TEXT,
                    last_published_at TEXT,
                    created_at TEXT NOT NULL,
                    UNIQUE (translation_key, locale_id),
                    FOREIGN KEY (locale_id) REFERENCES locales(id) ON DELETE RESTRICT
                )",
            ),
            (
                "page_log_entries table",
                "CREATE TABLE IF NOT EXISTS page_log_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    page_id INTEGER NOT NULL,
                    action TEXT NOT NULL,
                    actor TEXT,
                    label TEXT NOT NULL,
                    data TEXT NOT NULL DEFAULT '{}',
                    deleted INTEGER NOT NULL DEFAULT 0,
                    timestamp TEXT NOT NULL
                )",
            ),
            (
                "pages path index",
                "CREATE INDEX IF NOT EXISTS idx_pages_path ON pages(path)",
            ),
            (
                "pages depth index",
                "CREATE INDEX IF NOT EXISTS idx_pages_depth ON pages(depth)",
            ),
            (
                "pages locale index",
                "CREATE INDEX IF NOT EXISTS idx_pages_locale ON pages(locale_id)",
            ),
            (
                "log page index",
                "CREATE INDEX IF NOT EXISTS idx_log_page ON page_log_entries(page_id)",
            ),
            (
                "log action index",
                "CREATE INDEX IF NOT EXISTS idx_log_action ON page_log_entries(action, page_id)",
            ),
        ];

        for (name, sql) in statements {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!("Failed to create {}: {}", name, e))
            })?;
        }

        // Flush schema for fresh files so other connections see it immediately
        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Get a raw connection handle
    ///
    /// Only for synchronous setup code; async callers use `connect_with_timeout()`.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get a connection with busy timeout and foreign keys configured
    ///
    /// Concurrent writers wait up to 5 seconds for the lock.
    pub async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect()?;
        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;
        Ok(conn)
    }

    /// Execute a statement and record it under `operation`
    pub(crate) async fn execute(
        &self,
        conn: &Connection,
        operation: &str,
        sql: &str,
        params: impl IntoParams,
    ) -> Result<u64, DatabaseError> {
        let started = Instant::now();
        let result = conn.execute(sql, params).await;
        self.metrics.record(operation, started.elapsed());
        result.map_err(|e| DatabaseError::sql_execution(format!("{} failed: {}", operation, e)))
    }

    /// Run a query and record it under `operation`
    pub(crate) async fn query(
        &self,
        conn: &Connection,
        operation: &str,
        sql: &str,
        params: impl IntoParams,
    ) -> Result<Rows, DatabaseError> {
        let started = Instant::now();
        let result = conn.query(sql, params).await;
        self.metrics.record(operation, started.elapsed());
        result.map_err(|e| DatabaseError::sql_execution(format!("{} failed: {}", operation, e)))
    }

    /// Begin a write transaction on `conn`
    ///
    /// `BEGIN IMMEDIATE`: the write lock is taken up front.
    pub async fn begin(&self, conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(())
    }

    pub async fn commit(&self, conn: &Connection) -> Result<(), DatabaseError> {
        if let Err(e) = conn.execute("COMMIT", ()).await {
            self.rollback(conn).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }
        Ok(())
    }

    /// Roll back the open transaction on `conn`
    ///
    /// Failures are logged, not returned.
    pub async fn rollback(&self, conn: &Connection) {
        if let Err(e) = conn.execute("ROLLBACK", ()).await {
            tracing::warn!("Rollback failed: {}", e);
        }
    }
}

/// Format a timestamp for storage
///
/// Fixed-width UTC RFC3339 so stored values sort chronologically as text.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp (RFC3339, or SQLite's `YYYY-MM-DD HH:MM:SS`)
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    Err(format!(
        "Unable to parse timestamp '{}' as RFC3339 or SQLite format",
        s
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_timestamp_formats() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let stored = format_timestamp(&dt);
        assert_eq!(stored, "2024-03-01T12:30:00.000000Z");
        assert_eq!(parse_timestamp(&stored).unwrap(), dt);
        assert_eq!(parse_timestamp("2024-03-01 12:30:00").unwrap(), dt);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_stored_timestamps_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(format_timestamp(&early) < format_timestamp(&late));
    }

    #[tokio::test]
    async fn test_schema_initialization_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("canopy.db");

        let first = DatabaseService::new(db_path.clone()).await.unwrap();
        drop(first);
        let second = DatabaseService::new(db_path).await.unwrap();

        let conn = second.connect_with_timeout().await.unwrap();
        let mut rows = second
            .query(
                &conn,
                "count_tables",
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('locales', 'pages', 'page_log_entries')",
                (),
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 3);
        assert_eq!(second.metrics().count_for("count_tables"), 1);
    }

    #[tokio::test]
    async fn test_unusable_directory_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let db_path = blocker.join("nested").join("canopy.db");

        match DatabaseService::new(db_path.clone()).await {
            Err(DatabaseError::DirectoryCreationFailed { path, .. }) => assert_eq!(path, db_path),
            Err(other) => panic!("Expected DirectoryCreationFailed, got {:?}", other),
            Ok(_) => panic!("Expected DirectoryCreationFailed, got a database"),
        }
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let temp_dir = TempDir::new().unwrap();
        let db = DatabaseService::new(temp_dir.path().join("canopy.db"))
            .await
            .unwrap();
        let conn = db.connect_with_timeout().await.unwrap();

        db.begin(&conn).await.unwrap();
        db.execute(
            &conn,
            "insert_locale",
            "INSERT INTO locales (language_code) VALUES (?)",
            ["en"],
        )
        .await
        .unwrap();
        db.rollback(&conn).await;

        let mut rows = db
            .query(&conn, "count_locales", "SELECT COUNT(*) FROM locales", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 0);
    }
}
