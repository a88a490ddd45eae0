//! Service Layer Error Types
//!
//! This module defines error types for service-layer operations, providing
//! detailed error handling for business logic failures.

use crate::config::ConfigError;
use crate::db::{DatabaseError, TreeError};
use crate::models::ValidationError;
use thiserror::Error;

/// Service operation errors
///
/// Provides high-level error types for all service operations,
/// with detailed context and proper error chaining.
#[derive(Error, Debug)]
pub enum PageServiceError {
    /// Page not found by ID
    #[error("Page not found: {id}")]
    PageNotFound { id: i64 },

    /// No locale for the requested language or id
    #[error("Locale not found: {0}")]
    LocaleNotFound(String),

    /// Locale still referenced by non-root pages
    #[error("Locale '{language_code}' is still used by {page_count} non-root page(s)")]
    LocaleInUse {
        language_code: String,
        page_count: usize,
    },

    /// Root pages would be left without any locale
    #[error("Cannot delete locale '{0}': no other locale to reassign root pages to")]
    NoFallbackLocale(String),

    /// Slug contains characters outside `[-\w]`
    #[error("Invalid slug: '{0}'")]
    InvalidSlug(String),

    /// Slug already used by a sibling
    #[error("The slug '{slug}' is already in use within the parent page")]
    SlugInUse { slug: String },

    /// Copying for translation needs the parent translated first
    #[error("Parent of page {page_id} has no translation in locale {locale_id}")]
    ParentNotTranslated { page_id: i64, locale_id: i64 },

    /// The page already has a translation in the target locale
    #[error("Page {page_id} is already translated into '{language_code}'")]
    TranslationExists {
        page_id: i64,
        language_code: String,
    },

    /// Validation failed for page input
    #[error("Page validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    DatabaseError(#[from] DatabaseError),

    /// Tree positioning failed
    #[error("Tree operation failed: {0}")]
    TreeError(#[from] TreeError),

    /// Configuration lookup failed
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Transaction failed
    #[error("Transaction failed: {context}")]
    TransactionFailed { context: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl PageServiceError {
    /// Create a page not found error
    pub fn page_not_found(id: i64) -> Self {
        Self::PageNotFound { id }
    }

    /// Create a locale not found error
    pub fn locale_not_found(what: impl Into<String>) -> Self {
        Self::LocaleNotFound(what.into())
    }

    /// Create a slug in use error
    pub fn slug_in_use(slug: impl Into<String>) -> Self {
        Self::SlugInUse { slug: slug.into() }
    }

    /// Create a transaction failed error
    pub fn transaction_failed(context: impl Into<String>) -> Self {
        Self::TransactionFailed {
            context: context.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization_error(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// True when the error is a move below the node's own subtree
    pub fn is_invalid_move(&self) -> bool {
        matches!(
            self,
            Self::TreeError(TreeError::InvalidMoveToDescendant { .. })
        )
    }
}

impl From<serde_json::Error> for PageServiceError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}
