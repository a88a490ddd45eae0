//! Locale Service
//!
//! Locales are created on first use of a language code. Which locale is the
//! default comes from configuration: the configured language code, resolved
//! to a supported content language variant (`fr-ca` → `fr`).
//!
//! Default lookups are memoized per request in a [`LocaleContext`], and the
//! per-instance default flag is cached on the [`Locale`] itself, so listing
//! locales and asking each whether it is the default costs one query.

use std::sync::Arc;

use libsql::Connection;
use tokio::sync::{broadcast, OnceCell};

use crate::config::CanopyConfig;
use crate::db::{DatabaseService, DomainEvent, LocaleRecord};
use crate::models::{Locale, Page};
use crate::services::error::PageServiceError;

/// Locale lookups and lifecycle
#[derive(Clone)]
pub struct LocaleService {
    db: Arc<DatabaseService>,
    config: Arc<CanopyConfig>,
    event_tx: broadcast::Sender<DomainEvent>,
}

impl LocaleService {
    pub fn new(
        db: Arc<DatabaseService>,
        config: Arc<CanopyConfig>,
        event_tx: broadcast::Sender<DomainEvent>,
    ) -> Self {
        Self {
            db,
            config,
            event_tx,
        }
    }

    /// Start a request-scoped context using the default language as active
    pub fn context(&self) -> LocaleContext {
        LocaleContext::new(self.clone(), None)
    }

    /// Start a request-scoped context with an explicit active language
    pub fn context_for_language(&self, language_code: impl Into<String>) -> LocaleContext {
        LocaleContext::new(self.clone(), Some(language_code.into()))
    }

    pub(crate) fn to_locale(&self, record: LocaleRecord) -> Locale {
        let display_name = self
            .config
            .language_name(&record.language_code)
            .map(str::to_string);
        Locale::new(record.id, record.language_code, display_name)
    }

    /// Fetch the locale for `language_code`, creating it if needed
    pub async fn get_or_create(&self, language_code: &str) -> Result<Locale, PageServiceError> {
        let language_code = language_code.to_lowercase();
        let conn = self.db.connect_with_timeout().await?;
        if let Some(record) = self.db.locale_by_code(&conn, &language_code).await? {
            return Ok(self.to_locale(record));
        }

        let created = self.db.insert_locale_if_missing(&conn, &language_code).await?;
        let record = self
            .db
            .locale_by_code(&conn, &language_code)
            .await?
            .ok_or_else(|| PageServiceError::locale_not_found(language_code.as_str()))?;
        if created {
            tracing::info!("Created locale '{}' id={}", record.language_code, record.id);
        }
        Ok(self.to_locale(record))
    }

    /// Locale serving `language_code`, after resolving it to a supported variant
    pub async fn get_for_language(&self, language_code: &str) -> Result<Locale, PageServiceError> {
        let code = self.config.supported_content_language_variant(language_code)?;
        let conn = self.db.connect_with_timeout().await?;
        self.db
            .locale_by_code(&conn, &code)
            .await?
            .map(|record| self.to_locale(record))
            .ok_or_else(|| PageServiceError::locale_not_found(code))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Locale>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(self
            .db
            .locale_by_id(&conn, id)
            .await?
            .map(|record| self.to_locale(record)))
    }

    pub async fn list_locales(&self) -> Result<Vec<Locale>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(self
            .db
            .list_locales(&conn)
            .await?
            .into_iter()
            .map(|record| self.to_locale(record))
            .collect())
    }

    /// All locales with their default flag already computed
    ///
    /// When no default locale exists every locale is flagged non-default.
    pub async fn annotated_locales(&self, ctx: &LocaleContext) -> Result<Vec<Locale>, PageServiceError> {
        let default_id = match ctx.get_default().await {
            Ok(locale) => Some(locale.id),
            Err(PageServiceError::LocaleNotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let locales = self.list_locales().await?;
        for locale in &locales {
            locale.cache_is_default(Some(locale.id) == default_id);
        }
        Ok(locales)
    }

    /// Delete a locale
    ///
    /// Fails with `LocaleInUse` while non-root pages use it. Root pages using
    /// it are reassigned to the default locale, or to any remaining locale
    /// when the deleted one is the default.
    pub async fn delete_locale(&self, id: i64) -> Result<(), PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        self.db.begin(&conn).await?;

        let result = self.delete_locale_in_tx(&conn, id).await;
        let (record, reassigned_to) = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.db.rollback(&conn).await;
                return Err(e);
            }
        };
        self.db.commit(&conn).await?;

        tracing::info!(
            "Locale deleted: '{}' id={} roots reassigned to {:?}",
            record.language_code,
            record.id,
            reassigned_to
        );
        let _ = self.event_tx.send(DomainEvent::LocaleDeleted {
            language_code: record.language_code,
            reassigned_to,
        });
        Ok(())
    }

    async fn delete_locale_in_tx(
        &self,
        conn: &Connection,
        id: i64,
    ) -> Result<(LocaleRecord, Option<String>), PageServiceError> {
        let record = self
            .db
            .locale_by_id(conn, id)
            .await?
            .ok_or_else(|| PageServiceError::locale_not_found(format!("id={}", id)))?;

        let in_use = self.db.pages_with_locale(conn, id, 2).await?;
        if !in_use.is_empty() {
            return Err(PageServiceError::LocaleInUse {
                language_code: record.language_code,
                page_count: in_use.len(),
            });
        }

        let roots: Vec<Page> = self.db.pages_with_locale(conn, id, 1).await?;
        let mut reassigned_to = None;
        if !roots.is_empty() {
            let fallback = self.fallback_locale(conn, &record).await?;
            for root in &roots {
                self.db.set_page_locale(conn, root.id, fallback.id).await?;
            }
            tracing::debug!(
                "Reassigned {} root page(s) from '{}' to '{}'",
                roots.len(),
                record.language_code,
                fallback.language_code
            );
            reassigned_to = Some(fallback.language_code);
        }

        self.db.delete_locale_row(conn, id).await?;
        Ok((record, reassigned_to))
    }

    async fn fallback_locale(
        &self,
        conn: &Connection,
        deleting: &LocaleRecord,
    ) -> Result<LocaleRecord, PageServiceError> {
        if let Ok(code) = self.config.default_content_language() {
            if let Some(default) = self.db.locale_by_code(conn, &code).await? {
                if default.id != deleting.id {
                    return Ok(default);
                }
            }
        }

        self.db
            .list_locales(conn)
            .await?
            .into_iter()
            .find(|l| l.id != deleting.id)
            .ok_or_else(|| PageServiceError::NoFallbackLocale(deleting.language_code.clone()))
    }
}

/// Request-scoped locale lookups
///
/// Create one per request or operation and drop it afterwards; results are
/// memoized for the lifetime of the context only.
pub struct LocaleContext {
    service: LocaleService,
    active_language: Option<String>,
    default: OnceCell<Locale>,
    active: OnceCell<Locale>,
}

impl LocaleContext {
    fn new(service: LocaleService, active_language: Option<String>) -> Self {
        Self {
            service,
            active_language,
            default: OnceCell::new(),
            active: OnceCell::new(),
        }
    }

    /// The default locale; errors with `LocaleNotFound` when it does not exist
    pub async fn get_default(&self) -> Result<&Locale, PageServiceError> {
        self.default
            .get_or_try_init(|| async {
                let code = self.service.config.default_content_language()?;
                let conn = self.service.db.connect_with_timeout().await?;
                let record = self
                    .service
                    .db
                    .locale_by_code(&conn, &code)
                    .await?
                    .ok_or_else(|| PageServiceError::locale_not_found(code))?;
                let locale = self.service.to_locale(record);
                locale.cache_is_default(true);
                Ok::<_, PageServiceError>(locale)
            })
            .await
    }

    /// The locale for the context's active language
    ///
    /// Falls back to the default locale when the active language is unset,
    /// unsupported, or has no locale yet.
    pub async fn get_active(&self) -> Result<&Locale, PageServiceError> {
        let language = match &self.active_language {
            Some(language) => language,
            None => return self.get_default().await,
        };

        let found = self
            .active
            .get_or_try_init(|| async {
                match self.service.get_for_language(language).await {
                    Ok(locale) => Ok::<_, PageServiceError>(locale),
                    Err(PageServiceError::LocaleNotFound(_)) | Err(PageServiceError::ConfigError(_)) => {
                        tracing::debug!("No locale for active language '{}', using default", language);
                        self.get_default().await.cloned()
                    }
                    Err(e) => Err(e),
                }
            })
            .await?;
        Ok(found)
    }

    /// Whether `locale` is the default, caching the answer on the instance
    pub async fn is_default_locale(&self, locale: &Locale) -> Result<bool, PageServiceError> {
        if let Some(cached) = locale.cached_is_default() {
            return Ok(cached);
        }
        let default = self.get_default().await?;
        Ok(locale.cache_is_default(default.id == locale.id))
    }
}

impl Locale {
    /// Whether this locale is the configured default
    ///
    /// Computed once per instance; later calls use the cached flag.
    pub async fn is_default_locale(&self, ctx: &LocaleContext) -> Result<bool, PageServiceError> {
        ctx.is_default_locale(self).await
    }
}
