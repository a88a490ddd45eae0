//! Locale Row Operations
//!
//! SQL for the `locales` table. Rows carry only the identity and language
//! code; display names come from configuration in the service layer.

use libsql::{Connection, Row, Rows};

use crate::db::database::DatabaseService;
use crate::db::error::DatabaseError;

/// A stored locale row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleRecord {
    pub id: i64,
    pub language_code: String,
}

fn row_to_locale(row: &Row) -> Result<LocaleRecord, DatabaseError> {
    Ok(LocaleRecord {
        id: row
            .get::<i64>(0)
            .map_err(|e| DatabaseError::row_decode("locale", format!("id: {}", e)))?,
        language_code: row
            .get::<String>(1)
            .map_err(|e| DatabaseError::row_decode("locale", format!("language_code: {}", e)))?,
    })
}

async fn collect_locales(mut rows: Rows) -> Result<Vec<LocaleRecord>, DatabaseError> {
    let mut locales = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    {
        locales.push(row_to_locale(&row)?);
    }
    Ok(locales)
}

impl DatabaseService {
    pub async fn locale_by_code(
        &self,
        conn: &Connection,
        language_code: &str,
    ) -> Result<Option<LocaleRecord>, DatabaseError> {
        let rows = self
            .query(
                conn,
                "locale_by_code",
                "SELECT id, language_code FROM locales WHERE language_code = ?",
                [language_code],
            )
            .await?;
        Ok(collect_locales(rows).await?.into_iter().next())
    }

    pub async fn locale_by_id(&self, conn: &Connection, id: i64) -> Result<Option<LocaleRecord>, DatabaseError> {
        let rows = self
            .query(
                conn,
                "locale_by_id",
                "SELECT id, language_code FROM locales WHERE id = ?",
                [id],
            )
            .await?;
        Ok(collect_locales(rows).await?.into_iter().next())
    }

    /// All locales ordered by id
    pub async fn list_locales(&self, conn: &Connection) -> Result<Vec<LocaleRecord>, DatabaseError> {
        let rows = self
            .query(
                conn,
                "locale_list",
                "SELECT id, language_code FROM locales ORDER BY id",
                (),
            )
            .await?;
        collect_locales(rows).await
    }

    /// Insert a locale for `language_code` unless one already exists
    ///
    /// Returns whether a row was written. Concurrent callers racing on the
    /// same code never see a UNIQUE violation.
    pub async fn insert_locale_if_missing(
        &self,
        conn: &Connection,
        language_code: &str,
    ) -> Result<bool, DatabaseError> {
        let inserted = self
            .execute(
                conn,
                "locale_insert",
                "INSERT INTO locales (language_code) VALUES (?) ON CONFLICT(language_code) DO NOTHING",
                [language_code],
            )
            .await?;
        Ok(inserted > 0)
    }

    pub async fn delete_locale_row(&self, conn: &Connection, id: i64) -> Result<u64, DatabaseError> {
        self.execute(conn, "locale_delete", "DELETE FROM locales WHERE id = ?", [id])
            .await
    }
}
