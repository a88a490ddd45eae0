//! Page Move Orchestration
//!
//! Moving a page is the one operation that touches many rows: the tree
//! positioner rewrites structural paths, then the page's `url_path` and the
//! `url_path` prefix of every descendant are rewritten to match. All of it
//! runs in a single `BEGIN IMMEDIATE` transaction.
//!
//! # Sequence
//!
//! 1. Re-read the page and capture its current parent and URL path
//! 2. Work out the prospective parent and the URL path the page will get
//! 3. Send `pre_page_move` (pre-transaction state)
//! 4. Transaction: relocate, persist the new URL path, propagate it to
//!    descendants, commit
//! 5. Send `post_page_move` (committed state)
//! 6. Write a `move` or `reorder` audit entry
//!
//! If anything in step 4 fails the transaction is rolled back and steps 5
//! and 6 never happen. The pre-move signal is not retracted.

use std::sync::Arc;

use libsql::Connection;

use crate::db::{DatabaseService, TreePositioner};
use crate::models::{LogAction, Page, Position};
use crate::services::audit_log;
use crate::services::error::PageServiceError;
use crate::services::signals::{PageMoveEvent, PageSignals};
use crate::services::url_path::{derive_url_path, update_descendant_url_paths};

/// Result of a committed move
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    /// The page as persisted after the move
    pub page: Page,
    pub parent_before: Option<Page>,
    pub parent_after: Option<Page>,
    pub url_path_before: String,
    pub url_path_after: String,
    /// `Move` or `Reorder`
    pub action: LogAction,
}

/// Moves pages through a [`TreePositioner`] while keeping URL paths,
/// signals and the audit log consistent
pub struct MovePageAction {
    db: Arc<DatabaseService>,
    positioner: Arc<dyn TreePositioner>,
    signals: Arc<PageSignals>,
    site_name: String,
}

impl MovePageAction {
    pub fn new(
        db: Arc<DatabaseService>,
        positioner: Arc<dyn TreePositioner>,
        signals: Arc<PageSignals>,
        site_name: impl Into<String>,
    ) -> Self {
        Self {
            db,
            positioner,
            signals,
            site_name: site_name.into(),
        }
    }

    /// Move `page` to `position` relative to `target`
    ///
    /// `page` and `target` are only used for their ids; both are re-read.
    pub async fn execute(
        &self,
        page: &Page,
        target: &Page,
        position: Position,
        user: Option<&str>,
    ) -> Result<MoveOutcome, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;

        let page = self.require_page(&conn, page.id).await?;
        let target = self.require_page(&conn, target.id).await?;
        let parent_before = self.parent_of(&conn, &page).await?;
        let parent_after = if position.is_child() {
            Some(target.clone())
        } else {
            self.parent_of(&conn, &target).await?
        };

        let url_path_before = page.url_path.clone();
        let url_path_after = derive_url_path(&page, parent_after.as_ref());

        // Moves into the page's own subtree are rejected by the positioner
        let into_own_subtree = target.id == page.id || target.is_descendant_of(&page);
        if !into_own_subtree
            && parent_before.as_ref().map(|p| p.id) != parent_after.as_ref().map(|p| p.id)
            && self
                .db
                .sibling_slug_exists(&conn, parent_after.as_ref(), &page.slug, Some(page.id))
                .await?
        {
            return Err(PageServiceError::slug_in_use(page.slug.clone()));
        }

        self.signals.pre_page_move.send(&PageMoveEvent {
            page: page.clone(),
            parent_before: parent_before.clone(),
            parent_after: parent_after.clone(),
            url_path_before: url_path_before.clone(),
            url_path_after: url_path_after.clone(),
        });

        self.db.begin(&conn).await?;
        let moved = match self
            .relocate_in_tx(&conn, &page, &target, position, &url_path_before, &url_path_after)
            .await
        {
            Ok(moved) => moved,
            Err(e) => {
                self.db.rollback(&conn).await;
                tracing::warn!("Move of page {} rolled back: {}", page.id, e);
                return Err(e);
            }
        };
        self.db.commit(&conn).await?;

        // Committed state of the destination parent (numchild changed)
        let parent_after = self.parent_of(&conn, &moved).await?;

        self.signals.post_page_move.send(&PageMoveEvent {
            page: moved.clone(),
            parent_before: parent_before.clone(),
            parent_after: parent_after.clone(),
            url_path_before: url_path_before.clone(),
            url_path_after: url_path_after.clone(),
        });

        audit_log::log_move(
            &self.db,
            &conn,
            &moved,
            parent_before.as_ref(),
            parent_after.as_ref(),
            user,
            &self.site_name,
        )
        .await?;

        tracing::info!(
            "Page moved: \"{}\" id={} path={}",
            moved.title,
            moved.id,
            moved.url_path
        );

        Ok(MoveOutcome {
            action: audit_log::move_action(parent_before.as_ref(), parent_after.as_ref()),
            page: moved,
            parent_before,
            parent_after,
            url_path_before,
            url_path_after,
        })
    }

    async fn relocate_in_tx(
        &self,
        conn: &Connection,
        page: &Page,
        target: &Page,
        position: Position,
        url_path_before: &str,
        url_path_after: &str,
    ) -> Result<Page, PageServiceError> {
        self.positioner
            .relocate(conn, page.id, target.id, position)
            .await?;

        // The positioner does not refresh caller-held values
        let mut moved = self.require_page(conn, page.id).await?;
        self.db
            .update_page_url_path(conn, moved.id, url_path_after)
            .await?;
        moved.url_path = url_path_after.to_string();

        if url_path_before != url_path_after {
            update_descendant_url_paths(&self.db, conn, &moved, url_path_before, url_path_after)
                .await?;
        }
        Ok(moved)
    }

    async fn require_page(&self, conn: &Connection, id: i64) -> Result<Page, PageServiceError> {
        self.db
            .fetch_page(conn, id)
            .await?
            .ok_or_else(|| PageServiceError::page_not_found(id))
    }

    async fn parent_of(&self, conn: &Connection, page: &Page) -> Result<Option<Page>, PageServiceError> {
        match page.parent_path() {
            Some(path) => Ok(self.db.fetch_page_by_path(conn, path).await?),
            None => Ok(None),
        }
    }
}
