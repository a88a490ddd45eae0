//! Page Data Structures
//!
//! A `Page` is one node of the content tree. Its position is encoded in the
//! structural `path` (see [`crate::db::tree`]); its public address is the
//! denormalized `url_path`, built from the slugs of its ancestors.
//!
//! # Examples
//!
//! ```rust
//! use canopy_core::models::NewPage;
//!
//! let page = NewPage::new("About us");
//! assert_eq!(page.resolved_slug(), "about-us");
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::tree::{parent_path, STEPLEN};

/// Validation errors for page input
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid slug '{0}': only letters, numbers, underscores and hyphens are allowed")]
    InvalidSlug(String),

    #[error("Invalid move position: {0}")]
    InvalidPosition(String),
}

/// One node of the page tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: i64,

    /// Structural path: fixed-width steps, one per ancestor level
    pub path: String,

    /// Tree depth (roots are at depth 1)
    pub depth: i64,

    /// Number of direct children
    pub numchild: i64,

    pub title: String,

    pub slug: String,

    /// Materialized URL path, e.g. `home/about/`
    pub url_path: String,

    pub locale_id: i64,

    /// Shared by every translation of the same page
    pub translation_key: Uuid,

    pub live: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_published_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_published_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Page {
    pub fn is_root(&self) -> bool {
        self.depth == 1
    }

    /// Structural path of the parent, `None` for roots
    pub fn parent_path(&self) -> Option<&str> {
        parent_path(&self.path)
    }

    /// True if `self` sits strictly below `other`
    pub fn is_descendant_of(&self, other: &Page) -> bool {
        self.path.len() > other.path.len() && self.path.starts_with(&other.path)
    }

    /// Position of this page among its siblings, as encoded by its last path step
    pub fn step(&self) -> &str {
        &self.path[self.path.len().saturating_sub(STEPLEN)..]
    }

    /// Title shown in admin listings and audit entries
    ///
    /// Tree roots are shown under the configured site name.
    pub fn admin_display_title(&self, site_name: &str) -> String {
        if self.is_root() && !site_name.is_empty() {
            site_name.to_string()
        } else {
            self.title.clone()
        }
    }

    /// Human readable publication status
    pub fn status_string(&self) -> &'static str {
        if self.live {
            "live"
        } else if self.first_published_at.is_some() {
            "unpublished"
        } else {
            "draft"
        }
    }
}

/// Input for creating a page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPage {
    pub title: String,

    /// Derived from the title when absent
    #[serde(default)]
    pub slug: Option<String>,

    /// Inherited from the parent when absent (roots use the default locale)
    #[serde(default)]
    pub locale_id: Option<i64>,

    /// Generated when absent
    #[serde(default)]
    pub translation_key: Option<Uuid>,
}

impl NewPage {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_locale(mut self, locale_id: i64) -> Self {
        self.locale_id = Some(locale_id);
        self
    }

    pub fn with_translation_key(mut self, key: Uuid) -> Self {
        self.translation_key = Some(key);
        self
    }

    /// Explicit slug, or one derived from the title
    pub fn resolved_slug(&self) -> String {
        match &self.slug {
            Some(slug) => slug.clone(),
            None => slugify(&self.title),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingField("title".to_string()));
        }
        validate_slug(&self.resolved_slug())
    }
}

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[-\w]+$").expect("slug pattern is valid"))
}

fn slug_separators() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\w]+|_+").expect("separator pattern is valid"))
}

/// Turn a title into a URL-safe slug
pub fn slugify(title: &str) -> String {
    let lowered = title.trim().to_lowercase();
    slug_separators()
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if slug_pattern().is_match(slug) {
        Ok(())
    } else {
        Err(ValidationError::InvalidSlug(slug.to_string()))
    }
}

/// Placement of a moved page relative to the target page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    /// Immediately before the target, under the target's parent
    Before,
    /// Immediately after the target, under the target's parent
    After,
    FirstChild,
    LastChild,
    /// Among the target's children, ordered by title
    SortedChild,
}

impl Position {
    /// True when the target becomes the new parent
    pub fn is_child(self) -> bool {
        matches!(
            self,
            Position::FirstChild | Position::LastChild | Position::SortedChild
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Position::Before => "before",
            Position::After => "after",
            Position::FirstChild => "first-child",
            Position::LastChild => "last-child",
            Position::SortedChild => "sorted-child",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Position {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" | "left" => Ok(Position::Before),
            "after" | "right" => Ok(Position::After),
            "first-child" => Ok(Position::FirstChild),
            "last-child" => Ok(Position::LastChild),
            "sorted-child" => Ok(Position::SortedChild),
            other => Err(ValidationError::InvalidPosition(other.to_string())),
        }
    }
}
