//! Page Service
//!
//! Business operations on the page tree: creating roots and children,
//! reading tree relations, publishing, deleting, copying for translation and
//! moving. Every structural change runs in one transaction on one connection,
//! writes its audit entries, and broadcasts a [`DomainEvent`] after commit.

use std::sync::Arc;

use libsql::Connection;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::CanopyConfig;
use crate::db::tree::next_child_path;
use crate::db::{
    DatabaseService, DbCreatePageParams, DomainEvent, LocaleRecord, MaterializedPathTree,
    TreePositioner,
};
use crate::models::{LogAction, NewPage, Page, PageLogEntry, Position, ValidationError};
use crate::services::audit_log;
use crate::services::error::PageServiceError;
use crate::services::locale_service::LocaleService;
use crate::services::move_page::{MoveOutcome, MovePageAction};
use crate::services::signals::PageSignals;
use crate::services::url_path::url_path_for_slug;

/// Capacity of the domain event broadcast channel
const DOMAIN_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Where a translation copy goes
struct CopyDestination {
    parent: Option<Page>,
    /// Append `-<language_code>` to the first copied slug
    suffix_slug: bool,
    /// Untranslated ancestors to copy first, outermost first
    ancestors: Vec<Page>,
}

/// Page tree operations
///
/// `Clone` is cheap: every field is an `Arc` or a channel handle.
#[derive(Clone)]
pub struct PageService {
    db: Arc<DatabaseService>,
    config: Arc<CanopyConfig>,
    positioner: Arc<dyn TreePositioner>,
    signals: Arc<PageSignals>,
    locales: LocaleService,
    event_tx: broadcast::Sender<DomainEvent>,
}

impl PageService {
    /// Create a PageService positioning pages with [`MaterializedPathTree`]
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use canopy_core::services::PageService;
    /// # use canopy_core::db::DatabaseService;
    /// # use canopy_core::config::CanopyConfig;
    /// # use std::sync::Arc;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Arc::new(DatabaseService::new("./data/canopy.db".into()).await?);
    /// let service = PageService::new(db, Arc::new(CanopyConfig::default()));
    /// let home = service.add_root(canopy_core::NewPage::new("Home"), None).await?;
    /// assert_eq!(home.url_path, "home/");
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(db: Arc<DatabaseService>, config: Arc<CanopyConfig>) -> Self {
        let positioner = Arc::new(MaterializedPathTree::new(Arc::clone(&db)));
        Self::with_positioner(db, config, positioner)
    }

    /// Create a PageService with a custom tree positioner
    pub fn with_positioner(
        db: Arc<DatabaseService>,
        config: Arc<CanopyConfig>,
        positioner: Arc<dyn TreePositioner>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(DOMAIN_EVENT_CHANNEL_CAPACITY);
        let locales = LocaleService::new(Arc::clone(&db), Arc::clone(&config), event_tx.clone());
        Self {
            db,
            config,
            positioner,
            signals: Arc::new(PageSignals::default()),
            locales,
            event_tx,
        }
    }

    pub fn db(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    pub fn config(&self) -> &CanopyConfig {
        &self.config
    }

    /// Pre/post move signals; connect receivers here
    pub fn signals(&self) -> &Arc<PageSignals> {
        &self.signals
    }

    pub fn locales(&self) -> &LocaleService {
        &self.locales
    }

    /// Subscribe to domain events sent after each committed change
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.event_tx.subscribe()
    }

    /// Emit a domain event to all subscribers
    ///
    /// Ignores errors if no subscribers.
    fn emit_event(&self, event: DomainEvent) {
        let _ = self.event_tx.send(event);
    }

    // Creation

    /// Create a new tree root
    ///
    /// Uses the default locale (created if missing) unless `new_page` names one.
    pub async fn add_root(&self, new_page: NewPage, user: Option<&str>) -> Result<Page, PageServiceError> {
        validate_new_page(&new_page)?;
        let locale_id = match new_page.locale_id {
            Some(id) => id,
            None => {
                let code = self.config.default_content_language()?;
                self.locales.get_or_create(&code).await?.id
            }
        };
        self.create_page(None, new_page, locale_id, user).await
    }

    /// Create a new last child of `parent_id`, inheriting its locale by default
    pub async fn add_child(
        &self,
        parent_id: i64,
        new_page: NewPage,
        user: Option<&str>,
    ) -> Result<Page, PageServiceError> {
        validate_new_page(&new_page)?;
        let conn = self.db.connect_with_timeout().await?;
        let parent = self.require_page(&conn, parent_id).await?;
        let locale_id = new_page.locale_id.unwrap_or(parent.locale_id);
        self.create_page(Some(parent), new_page, locale_id, user).await
    }

    async fn create_page(
        &self,
        parent: Option<Page>,
        new_page: NewPage,
        locale_id: i64,
        user: Option<&str>,
    ) -> Result<Page, PageServiceError> {
        let slug = new_page.resolved_slug();
        let translation_key = new_page.translation_key.unwrap_or_else(Uuid::new_v4);

        let conn = self.db.connect_with_timeout().await?;
        self.db.begin(&conn).await?;
        let result: Result<Page, PageServiceError> = async {
            if self
                .db
                .sibling_slug_exists(&conn, parent.as_ref(), &slug, None)
                .await?
            {
                return Err(PageServiceError::slug_in_use(slug.clone()));
            }
            let page = self
                .insert_in_tx(&conn, parent.as_ref(), &new_page.title, &slug, locale_id, &translation_key)
                .await?;
            audit_log::log_action(&self.db, &conn, &page, LogAction::Create, user).await?;
            Ok(page)
        }
        .await;
        let page = self.finish_tx(&conn, result).await?;

        tracing::info!(
            "Page created: \"{}\" id={} path={}",
            page.title,
            page.id,
            page.url_path
        );
        self.emit_event(DomainEvent::PageCreated { page: page.clone() });
        Ok(page)
    }

    /// Insert a page as the last child of `parent` and bump the parent's `numchild`
    async fn insert_in_tx(
        &self,
        conn: &Connection,
        parent: Option<&Page>,
        title: &str,
        slug: &str,
        locale_id: i64,
        translation_key: &Uuid,
    ) -> Result<Page, PageServiceError> {
        let last_child = self.db.last_child_path(conn, parent).await?;
        let parent_path = parent.map(|p| p.path.as_str()).unwrap_or("");
        let path = next_child_path(parent_path, last_child.as_deref())?;
        let depth = parent.map(|p| p.depth + 1).unwrap_or(1);
        let url_path = url_path_for_slug(slug, parent);

        let id = self
            .db
            .insert_page(
                conn,
                DbCreatePageParams {
                    path: &path,
                    depth,
                    title,
                    slug,
                    url_path: &url_path,
                    locale_id,
                    translation_key,
                },
            )
            .await?;
        if let Some(parent) = parent {
            self.db.adjust_numchild(conn, parent.id, 1).await?;
        }
        self.require_page(conn, id).await
    }

    // Reads

    pub async fn get_page(&self, id: i64) -> Result<Option<Page>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(self.db.fetch_page(&conn, id).await?)
    }

    /// Parent of a page, `None` for roots
    pub async fn get_parent(&self, id: i64) -> Result<Option<Page>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        let page = self.require_page(&conn, id).await?;
        self.parent_of(&conn, &page).await
    }

    /// Direct children in tree order
    pub async fn get_children(&self, id: i64) -> Result<Vec<Page>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        let page = self.require_page(&conn, id).await?;
        Ok(self.db.fetch_children(&conn, Some(&page)).await?)
    }

    /// All tree roots in tree order
    pub async fn get_roots(&self) -> Result<Vec<Page>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(self.db.fetch_children(&conn, None).await?)
    }

    /// Strict descendants in tree order
    pub async fn get_descendants(&self, id: i64) -> Result<Vec<Page>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        let page = self.require_page(&conn, id).await?;
        Ok(self
            .db
            .fetch_subtree(&conn, &page.path)
            .await?
            .into_iter()
            .filter(|p| p.id != page.id)
            .collect())
    }

    pub async fn get_first_root(&self) -> Result<Option<Page>, PageServiceError> {
        Ok(self.get_roots().await?.into_iter().next())
    }

    /// Translation of a page in `locale_id`, if one exists
    pub async fn get_translation(&self, id: i64, locale_id: i64) -> Result<Option<Page>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        let page = self.require_page(&conn, id).await?;
        Ok(self
            .db
            .fetch_translation(&conn, &page.translation_key, locale_id)
            .await?)
    }

    /// Audit entries for a page, oldest first (including entries of deleted pages)
    pub async fn page_history(&self, id: i64) -> Result<Vec<PageLogEntry>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(self.db.log_entries_for_page(&conn, id).await?)
    }

    /// Latest audit entries across all pages, newest first
    pub async fn recent_activity(&self, limit: i64) -> Result<Vec<PageLogEntry>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(self.db.recent_log_entries(&conn, limit).await?)
    }

    // Mutations

    /// Publish a page
    ///
    /// Sets `live` and `last_published_at`; `first_published_at` only the first time.
    pub async fn publish_page(&self, id: i64, user: Option<&str>) -> Result<Page, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        self.db.begin(&conn).await?;
        let result: Result<Page, PageServiceError> = async {
            let page = self.require_page(&conn, id).await?;
            self.db.mark_published(&conn, id, &chrono::Utc::now()).await?;
            audit_log::log_action(&self.db, &conn, &page, LogAction::Publish, user).await?;
            self.require_page(&conn, id).await
        }
        .await;
        let page = self.finish_tx(&conn, result).await?;

        tracing::info!("Page published: \"{}\" id={}", page.title, page.id);
        self.emit_event(DomainEvent::PagePublished { page: page.clone() });
        Ok(page)
    }

    /// Take a published page offline
    ///
    /// `first_published_at` and `last_published_at` are kept, so the page
    /// reports as `unpublished` rather than `draft`.
    pub async fn unpublish_page(&self, id: i64, user: Option<&str>) -> Result<Page, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        self.db.begin(&conn).await?;
        let result: Result<Page, PageServiceError> = async {
            let page = self.require_page(&conn, id).await?;
            self.db.mark_unpublished(&conn, id).await?;
            audit_log::log_action(&self.db, &conn, &page, LogAction::Unpublish, user).await?;
            self.require_page(&conn, id).await
        }
        .await;
        let page = self.finish_tx(&conn, result).await?;

        tracing::info!("Page unpublished: \"{}\" id={}", page.title, page.id);
        self.emit_event(DomainEvent::PageUnpublished { page: page.clone() });
        Ok(page)
    }

    /// Delete a page and its whole subtree
    ///
    /// Writes a `delete` audit entry (with `deleted` set) for every
    /// descendant and for the page itself before removing the rows.
    pub async fn delete_page(&self, id: i64, user: Option<&str>) -> Result<(), PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        self.db.begin(&conn).await?;
        let result: Result<(Page, Vec<Page>), PageServiceError> = async {
            let page = self.require_page(&conn, id).await?;
            let subtree = self.db.fetch_subtree(&conn, &page.path).await?;
            let descendants: Vec<Page> = subtree.into_iter().filter(|p| p.id != page.id).collect();

            for descendant in &descendants {
                audit_log::log_deletion(&self.db, &conn, descendant, user).await?;
            }
            audit_log::log_deletion(&self.db, &conn, &page, user).await?;

            let removed = self.db.delete_subtree(&conn, &page.path).await?;
            if let Some(parent) = self.parent_of(&conn, &page).await? {
                self.db.adjust_numchild(&conn, parent.id, -1).await?;
            }
            tracing::debug!("Removed {} row(s) for page {}", removed, page.id);
            Ok((page, descendants))
        }
        .await;
        let (page, descendants) = self.finish_tx(&conn, result).await?;

        tracing::info!(
            "Page deleted: \"{}\" id={} with {} descendant(s)",
            page.title,
            page.id,
            descendants.len()
        );
        self.emit_event(DomainEvent::PageDeleted {
            id: page.id,
            descendant_ids: descendants.iter().map(|p| p.id).collect(),
        });
        Ok(())
    }

    /// Create a draft copy of a page in another locale
    ///
    /// The copy shares the page's `translation_key` and is placed under the
    /// translation of the page's parent. Pages whose parent is a tree root
    /// (and roots themselves) are copied alongside the original with the
    /// language code appended to the slug. With `copy_parents`, untranslated
    /// ancestors are copied first; otherwise they cause `ParentNotTranslated`.
    pub async fn copy_for_translation(
        &self,
        page_id: i64,
        locale_id: i64,
        copy_parents: bool,
        user: Option<&str>,
    ) -> Result<Page, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        self.db.begin(&conn).await?;
        let result: Result<Vec<Page>, PageServiceError> = async {
            let page = self.require_page(&conn, page_id).await?;
            let locale = self
                .db
                .locale_by_id(&conn, locale_id)
                .await?
                .ok_or_else(|| PageServiceError::locale_not_found(format!("id={}", locale_id)))?;
            if self
                .db
                .fetch_translation(&conn, &page.translation_key, locale.id)
                .await?
                .is_some()
            {
                return Err(PageServiceError::TranslationExists {
                    page_id,
                    language_code: locale.language_code,
                });
            }

            let destination = self.copy_destination(&conn, &page, &locale, copy_parents).await?;
            let mut parent = destination.parent;
            let mut suffix_slug = destination.suffix_slug;
            let mut copies = Vec::new();
            for source in destination.ancestors.iter().chain(std::iter::once(&page)) {
                let copy = self
                    .copy_one_in_tx(&conn, source, parent.as_ref(), &locale, suffix_slug, user)
                    .await?;
                suffix_slug = false;
                parent = Some(copy.clone());
                copies.push(copy);
            }
            Ok(copies)
        }
        .await;
        let copies = self.finish_tx(&conn, result).await?;

        let mut created = None;
        for copy in copies {
            tracing::info!(
                "Page copied for translation: \"{}\" id={} path={}",
                copy.title,
                copy.id,
                copy.url_path
            );
            self.emit_event(DomainEvent::PageCreated { page: copy.clone() });
            created = Some(copy);
        }
        created.ok_or_else(|| PageServiceError::transaction_failed("translation copy produced no page"))
    }

    async fn copy_destination(
        &self,
        conn: &Connection,
        page: &Page,
        locale: &LocaleRecord,
        copy_parents: bool,
    ) -> Result<CopyDestination, PageServiceError> {
        let mut ancestors = Vec::new();
        let mut current = page.clone();
        loop {
            let parent = match self.parent_of(conn, &current).await? {
                None => {
                    return Ok(CopyDestination {
                        parent: None,
                        suffix_slug: true,
                        ancestors,
                    })
                }
                Some(parent) => parent,
            };
            if parent.is_root() {
                return Ok(CopyDestination {
                    parent: Some(parent),
                    suffix_slug: true,
                    ancestors,
                });
            }
            if let Some(translated) = self
                .db
                .fetch_translation(conn, &parent.translation_key, locale.id)
                .await?
            {
                return Ok(CopyDestination {
                    parent: Some(translated),
                    suffix_slug: false,
                    ancestors,
                });
            }
            if !copy_parents {
                return Err(PageServiceError::ParentNotTranslated {
                    page_id: page.id,
                    locale_id: locale.id,
                });
            }
            ancestors.insert(0, parent.clone());
            current = parent;
        }
    }

    async fn copy_one_in_tx(
        &self,
        conn: &Connection,
        source: &Page,
        parent: Option<&Page>,
        locale: &LocaleRecord,
        suffix_slug: bool,
        user: Option<&str>,
    ) -> Result<Page, PageServiceError> {
        let base = if suffix_slug {
            format!("{}-{}", source.slug, locale.language_code)
        } else {
            source.slug.clone()
        };
        let slug = self.find_available_slug(conn, parent, &base).await?;
        let copy = self
            .insert_in_tx(conn, parent, &source.title, &slug, locale.id, &source.translation_key)
            .await?;
        audit_log::log_translation_copy(&self.db, conn, source, &copy, &locale.language_code, user)
            .await?;
        Ok(copy)
    }

    /// `base`, or `base-2`, `base-3`, … whichever is first free among the children of `parent`
    async fn find_available_slug(
        &self,
        conn: &Connection,
        parent: Option<&Page>,
        base: &str,
    ) -> Result<String, PageServiceError> {
        let mut slug = base.to_string();
        let mut number = 1;
        while self.db.sibling_slug_exists(conn, parent, &slug, None).await? {
            number += 1;
            slug = format!("{}-{}", base, number);
        }
        Ok(slug)
    }

    /// Move `page` to `position` relative to `target`
    pub async fn move_page(
        &self,
        page: &Page,
        target: &Page,
        position: Position,
        user: Option<&str>,
    ) -> Result<MoveOutcome, PageServiceError> {
        let action = MovePageAction::new(
            Arc::clone(&self.db),
            Arc::clone(&self.positioner),
            Arc::clone(&self.signals),
            self.config.site_name.clone(),
        );
        let outcome = action.execute(page, target, position, user).await?;

        self.emit_event(DomainEvent::PageMoved {
            page: outcome.page.clone(),
            url_path_before: outcome.url_path_before.clone(),
            url_path_after: outcome.url_path_after.clone(),
        });
        Ok(outcome)
    }

    // Helpers

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

    /// Commit on success, roll back on failure
    async fn finish_tx<T>(
        &self,
        conn: &Connection,
        result: Result<T, PageServiceError>,
    ) -> Result<T, PageServiceError> {
        match result {
            Ok(value) => {
                self.db.commit(conn).await?;
                Ok(value)
            }
            Err(e) => {
                self.db.rollback(conn).await;
                Err(e)
            }
        }
    }
}

fn validate_new_page(new_page: &NewPage) -> Result<(), PageServiceError> {
    new_page.validate().map_err(|e| match e {
        ValidationError::InvalidSlug(slug) => PageServiceError::InvalidSlug(slug),
        other => other.into(),
    })
}
