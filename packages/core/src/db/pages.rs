//! Page Row Operations
//!
//! SQL for the `pages` table. Every operation takes the connection to run on
//! so callers can compose several of them inside one transaction.

use chrono::{DateTime, Utc};
use libsql::{Connection, Row, Rows};
use uuid::Uuid;

use crate::db::database::{format_timestamp, parse_timestamp, DatabaseService};
use crate::db::error::DatabaseError;
use crate::models::Page;

const PAGE_COLUMNS: &str = "id, path, depth, numchild, title, slug, url_path, locale_id, \
     translation_key, live, first_published_at, last_published_at, created_at";

/// Parameters for page insertion (avoids too-many-arguments lint)
pub struct DbCreatePageParams<'a> {
    pub path: &'a str,
    pub depth: i64,
    pub title: &'a str,
    pub slug: &'a str,
    pub url_path: &'a str,
    pub locale_id: i64,
    pub translation_key: &'a Uuid,
}

/// A live page together with the actor of its latest publication
#[derive(Debug, Clone)]
pub struct PublishedPageRow {
    pub page: Page,
    pub last_published_by: Option<String>,
}

fn int(row: &Row, idx: i32, name: &str) -> Result<i64, DatabaseError> {
    row.get::<i64>(idx)
        .map_err(|e| DatabaseError::row_decode("page", format!("{}: {}", name, e)))
}

fn text(row: &Row, idx: i32, name: &str) -> Result<String, DatabaseError> {
    row.get::<String>(idx)
        .map_err(|e| DatabaseError::row_decode("page", format!("{}: {}", name, e)))
}

fn optional_text(row: &Row, idx: i32, name: &str) -> Result<Option<String>, DatabaseError> {
    row.get::<Option<String>>(idx)
        .map_err(|e| DatabaseError::row_decode("page", format!("{}: {}", name, e)))
}

fn optional_timestamp(
    value: Option<String>,
    name: &str,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    value
        .map(|s| parse_timestamp(&s))
        .transpose()
        .map_err(|e| DatabaseError::row_decode("page", format!("{}: {}", name, e)))
}

/// Convert a row selected with `PAGE_COLUMNS` into a `Page`
pub(crate) fn row_to_page(row: &Row) -> Result<Page, DatabaseError> {
    let translation_key = text(row, 8, "translation_key")?;
    let created_at = text(row, 12, "created_at")?;

    Ok(Page {
        id: int(row, 0, "id")?,
        path: text(row, 1, "path")?,
        depth: int(row, 2, "depth")?,
        numchild: int(row, 3, "numchild")?,
        title: text(row, 4, "title")?,
        slug: text(row, 5, "slug")?,
        url_path: text(row, 6, "url_path")?,
        locale_id: int(row, 7, "locale_id")?,
        translation_key: Uuid::parse_str(&translation_key)
            .map_err(|e| DatabaseError::row_decode("page", format!("translation_key: {}", e)))?,
        live: int(row, 9, "live")? != 0,
        first_published_at: optional_timestamp(
            optional_text(row, 10, "first_published_at")?,
            "first_published_at",
        )?,
        last_published_at: optional_timestamp(
            optional_text(row, 11, "last_published_at")?,
            "last_published_at",
        )?,
        created_at: parse_timestamp(&created_at)
            .map_err(|e| DatabaseError::row_decode("page", format!("created_at: {}", e)))?,
    })
}

async fn collect_pages(mut rows: Rows) -> Result<Vec<Page>, DatabaseError> {
    let mut pages = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    {
        pages.push(row_to_page(&row)?);
    }
    Ok(pages)
}

async fn first_page(mut rows: Rows) -> Result<Option<Page>, DatabaseError> {
    match rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    {
        Some(row) => Ok(Some(row_to_page(&row)?)),
        None => Ok(None),
    }
}

impl DatabaseService {
    pub async fn fetch_page(&self, conn: &Connection, id: i64) -> Result<Option<Page>, DatabaseError> {
        let rows = self
            .query(
                conn,
                "fetch_page",
                &format!("SELECT {} FROM pages WHERE id = ?", PAGE_COLUMNS),
                [id],
            )
            .await?;
        first_page(rows).await
    }

    pub async fn fetch_page_by_path(
        &self,
        conn: &Connection,
        path: &str,
    ) -> Result<Option<Page>, DatabaseError> {
        let rows = self
            .query(
                conn,
                "fetch_page_by_path",
                &format!("SELECT {} FROM pages WHERE path = ?", PAGE_COLUMNS),
                [path],
            )
            .await?;
        first_page(rows).await
    }

    /// Direct children in tree order; `None` lists the roots
    pub async fn fetch_children(
        &self,
        conn: &Connection,
        parent: Option<&Page>,
    ) -> Result<Vec<Page>, DatabaseError> {
        let rows = match parent {
            Some(parent) => {
                self.query(
                    conn,
                    "fetch_children",
                    &format!(
                        "SELECT {} FROM pages WHERE path LIKE ? AND depth = ? ORDER BY path",
                        PAGE_COLUMNS
                    ),
                    (format!("{}%", parent.path), parent.depth + 1),
                )
                .await?
            }
            None => {
                self.query(
                    conn,
                    "fetch_roots",
                    &format!("SELECT {} FROM pages WHERE depth = 1 ORDER BY path", PAGE_COLUMNS),
                    (),
                )
                .await?
            }
        };
        collect_pages(rows).await
    }

    /// The page at `path` and everything below it, in tree order
    pub async fn fetch_subtree(&self, conn: &Connection, path: &str) -> Result<Vec<Page>, DatabaseError> {
        let rows = self
            .query(
                conn,
                "fetch_subtree",
                &format!("SELECT {} FROM pages WHERE path LIKE ? ORDER BY path", PAGE_COLUMNS),
                [format!("{}%", path)],
            )
            .await?;
        collect_pages(rows).await
    }

    /// Highest structural path among the children of `parent` (`None` = roots)
    pub async fn last_child_path(
        &self,
        conn: &Connection,
        parent: Option<&Page>,
    ) -> Result<Option<String>, DatabaseError> {
        let (pattern, depth) = match parent {
            Some(parent) => (format!("{}%", parent.path), parent.depth + 1),
            None => ("%".to_string(), 1),
        };
        let mut rows = self
            .query(
                conn,
                "last_child_path",
                "SELECT MAX(path) FROM pages WHERE path LIKE ? AND depth = ?",
                (pattern, depth),
            )
            .await?;
        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => row
                .get::<Option<String>>(0)
                .map_err(|e| DatabaseError::row_decode("page", e.to_string())),
            None => Ok(None),
        }
    }

    /// True if a child of `parent` other than `exclude_id` already uses `slug`
    pub async fn sibling_slug_exists(
        &self,
        conn: &Connection,
        parent: Option<&Page>,
        slug: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, DatabaseError> {
        let (pattern, depth) = match parent {
            Some(parent) => (format!("{}%", parent.path), parent.depth + 1),
            None => ("%".to_string(), 1),
        };
        let mut rows = self
            .query(
                conn,
                "sibling_slug_exists",
                "SELECT COUNT(*) FROM pages WHERE path LIKE ? AND depth = ? AND slug = ? AND id <> ?",
                (pattern, depth, slug.to_string(), exclude_id.unwrap_or(-1)),
            )
            .await?;
        let count = match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::row_decode("page", e.to_string()))?,
            None => 0,
        };
        Ok(count > 0)
    }

    /// Translation of the page identified by `translation_key` in `locale_id`
    pub async fn fetch_translation(
        &self,
        conn: &Connection,
        translation_key: &Uuid,
        locale_id: i64,
    ) -> Result<Option<Page>, DatabaseError> {
        let rows = self
            .query(
                conn,
                "fetch_translation",
                &format!(
                    "SELECT {} FROM pages WHERE translation_key = ? AND locale_id = ?",
                    PAGE_COLUMNS
                ),
                (translation_key.to_string(), locale_id),
            )
            .await?;
        first_page(rows).await
    }

    /// Insert a page row and return its id
    pub async fn insert_page(
        &self,
        conn: &Connection,
        params: DbCreatePageParams<'_>,
    ) -> Result<i64, DatabaseError> {
        self.execute(
            conn,
            "insert_page",
            "INSERT INTO pages (path, depth, numchild, title, slug, url_path, locale_id, translation_key, live, created_at)
             VALUES (?, ?, 0, ?, ?, ?, ?, ?, 0, ?)",
            (
                params.path.to_string(),
                params.depth,
                params.title.to_string(),
                params.slug.to_string(),
                params.url_path.to_string(),
                params.locale_id,
                params.translation_key.to_string(),
                format_timestamp(&Utc::now()),
            ),
        )
        .await?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn update_page_url_path(
        &self,
        conn: &Connection,
        id: i64,
        url_path: &str,
    ) -> Result<(), DatabaseError> {
        self.execute(
            conn,
            "update_url_path",
            "UPDATE pages SET url_path = ? WHERE id = ?",
            (url_path.to_string(), id),
        )
        .await?;
        Ok(())
    }

    /// Rewrite the URL-path prefix of every strict descendant of the page at `path`
    ///
    /// Suffixes below the page are kept as stored. Returns the number of rows changed.
    pub async fn update_descendant_url_paths(
        &self,
        conn: &Connection,
        path: &str,
        page_id: i64,
        old_url_path: &str,
        new_url_path: &str,
    ) -> Result<u64, DatabaseError> {
        let suffix_start = old_url_path.chars().count() as i64 + 1;
        self.execute(
            conn,
            "update_descendant_url_paths",
            "UPDATE pages SET url_path = ? || substr(url_path, ?) WHERE path LIKE ? AND id <> ?",
            (
                new_url_path.to_string(),
                suffix_start,
                format!("{}%", path),
                page_id,
            ),
        )
        .await
    }

    /// Set the structural path and depth of one page
    pub async fn update_tree_position(
        &self,
        conn: &Connection,
        id: i64,
        path: &str,
        depth: i64,
    ) -> Result<(), DatabaseError> {
        self.execute(
            conn,
            "update_tree_position",
            "UPDATE pages SET path = ?, depth = ? WHERE id = ?",
            (path.to_string(), depth, id),
        )
        .await?;
        Ok(())
    }

    pub async fn adjust_numchild(&self, conn: &Connection, id: i64, delta: i64) -> Result<(), DatabaseError> {
        self.execute(
            conn,
            "adjust_numchild",
            "UPDATE pages SET numchild = MAX(numchild + ?, 0) WHERE id = ?",
            (delta, id),
        )
        .await?;
        Ok(())
    }

    pub async fn set_page_locale(&self, conn: &Connection, id: i64, locale_id: i64) -> Result<(), DatabaseError> {
        self.execute(
            conn,
            "set_page_locale",
            "UPDATE pages SET locale_id = ? WHERE id = ?",
            (locale_id, id),
        )
        .await?;
        Ok(())
    }

    /// Mark a page live, keeping the first publication date once set
    pub async fn mark_published(
        &self,
        conn: &Connection,
        id: i64,
        at: &DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let at = format_timestamp(at);
        self.execute(
            conn,
            "mark_published",
            "UPDATE pages SET live = 1, first_published_at = COALESCE(first_published_at, ?), last_published_at = ? WHERE id = ?",
            (at.clone(), at, id),
        )
        .await?;
        Ok(())
    }

    /// Take a page offline, keeping its publication dates
    pub async fn mark_unpublished(&self, conn: &Connection, id: i64) -> Result<(), DatabaseError> {
        self.execute(conn, "mark_unpublished", "UPDATE pages SET live = 0 WHERE id = ?", [id])
            .await?;
        Ok(())
    }

    /// Delete the page at `path` and its whole subtree
    pub async fn delete_subtree(&self, conn: &Connection, path: &str) -> Result<u64, DatabaseError> {
        self.execute(
            conn,
            "delete_subtree",
            "DELETE FROM pages WHERE path LIKE ?",
            [format!("{}%", path)],
        )
        .await
    }

    /// Pages using `locale_id` at or below `min_depth`
    pub async fn pages_with_locale(
        &self,
        conn: &Connection,
        locale_id: i64,
        min_depth: i64,
    ) -> Result<Vec<Page>, DatabaseError> {
        let rows = self
            .query(
                conn,
                "pages_with_locale",
                &format!(
                    "SELECT {} FROM pages WHERE locale_id = ? AND depth >= ? ORDER BY path",
                    PAGE_COLUMNS
                ),
                (locale_id, min_depth),
            )
            .await?;
        collect_pages(rows).await
    }

    /// Pages that have been published at least once, oldest publication first
    ///
    /// `live` narrows the rows to pages that are (or are no longer) live.
    /// Each row carries the actor of the page's latest `publish` audit entry.
    pub async fn fetch_published_pages(
        &self,
        conn: &Connection,
        published_before: Option<&DateTime<Utc>>,
        live: Option<bool>,
    ) -> Result<Vec<PublishedPageRow>, DatabaseError> {
        let cutoff = published_before
            .map(format_timestamp)
            .unwrap_or_else(|| "9999-12-31T23:59:59.999999Z".to_string());
        let live_clause = match live {
            Some(live) => format!(" AND p.live = {}", i64::from(live)),
            None => String::new(),
        };
        let columns: Vec<String> = PAGE_COLUMNS
            .split(", ")
            .map(|c| format!("p.{}", c.trim()))
            .collect();

        let mut rows = self
            .query(
                conn,
                "fetch_published_pages",
                &format!(
                    "SELECT {},
                        (SELECT l.actor FROM page_log_entries l
                          WHERE l.page_id = p.id AND l.action = 'publish'
                          ORDER BY l.id DESC LIMIT 1) AS last_published_by
                     FROM pages p
                     WHERE p.last_published_at IS NOT NULL AND p.last_published_at <= ?{}
                     ORDER BY p.last_published_at, p.id",
                    columns.join(", "),
                    live_clause
                ),
                [cutoff],
            )
            .await?;

        let mut published = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            published.push(PublishedPageRow {
                page: row_to_page(&row)?,
                last_published_by: optional_text(&row, 13, "last_published_by")?,
            });
        }
        Ok(published)
    }
}
