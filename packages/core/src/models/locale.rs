//! Locale Model
//!
//! A `Locale` identifies one content language. Whether a locale is the
//! default is never stored: it is derived from configuration and cached on
//! the instance the first time it is asked for.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locale {
    pub id: i64,

    pub language_code: String,

    /// Configured display name, `None` for unconfigured language codes
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(skip)]
    is_default: OnceLock<bool>,
}

impl Locale {
    pub fn new(id: i64, language_code: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            id,
            language_code: language_code.into(),
            display_name,
            is_default: OnceLock::new(),
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Cached default flag, if it has been computed for this instance
    pub fn cached_is_default(&self) -> Option<bool> {
        self.is_default.get().copied()
    }

    /// Record the default flag; the first recorded value wins
    pub fn cache_is_default(&self, is_default: bool) -> bool {
        *self.is_default.get_or_init(|| is_default)
    }
}

// The cached default flag is not part of a locale's identity
impl PartialEq for Locale {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.language_code == other.language_code
            && self.display_name == other.display_name
    }
}

impl Eq for Locale {}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name().unwrap_or(&self.language_code))
    }
}
