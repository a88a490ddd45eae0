//! Core Configuration
//!
//! Process-wide settings the page tree reads but never writes: the default
//! content language, the configured languages and their display names, the
//! site name shown for tree roots, and the database location.
//!
//! Configuration is loaded from an optional JSON file and then overridden by
//! environment variables. Every field carries a serde default so older files
//! without newer fields still deserialize.
//!
//! # Environment Variables
//!
//! - `CANOPY_DB_PATH` - Override the database location
//! - `CANOPY_LANGUAGE_CODE` - Override the default language code
//! - `CANOPY_SITE_NAME` - Override the site display name

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

pub const ENV_DB_PATH: &str = "CANOPY_DB_PATH";
pub const ENV_LANGUAGE_CODE: &str = "CANOPY_LANGUAGE_CODE";
pub const ENV_SITE_NAME: &str = "CANOPY_SITE_NAME";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The language code has no supported variant among the configured languages
    #[error("Language code '{0}' is not a configured content language")]
    UnsupportedLanguage(String),
}

/// A content language the site is configured to serve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub code: String,
    pub name: String,
}

impl LanguageConfig {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// Canopy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanopyConfig {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// Default content language (may be a regional variant such as `fr-ca`)
    #[serde(default = "default_language_code")]
    pub language_code: String,

    #[serde(default = "default_languages")]
    pub languages: Vec<LanguageConfig>,

    /// Display name used for tree roots in admin titles
    #[serde(default = "default_site_name")]
    pub site_name: String,
}

impl Default for CanopyConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            language_code: default_language_code(),
            languages: default_languages(),
            site_name: default_site_name(),
        }
    }
}

fn default_language_code() -> String {
    "en".to_string()
}

fn default_languages() -> Vec<LanguageConfig> {
    vec![
        LanguageConfig::new("en", "English"),
        LanguageConfig::new("fr", "French"),
    ]
}

fn default_site_name() -> String {
    "Canopy".to_string()
}

impl CanopyConfig {
    /// Load configuration from a JSON file
    ///
    /// A missing file yields the defaults; an unreadable or malformed file is an error.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;

        serde_json::from_str(&contents).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `CANOPY_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(db_path) = std::env::var(ENV_DB_PATH) {
            if !db_path.is_empty() {
                tracing::info!("Using database path from {}: {}", ENV_DB_PATH, db_path);
                self.database_path = Some(PathBuf::from(db_path));
            }
        }
        if let Ok(code) = std::env::var(ENV_LANGUAGE_CODE) {
            if !code.is_empty() {
                self.language_code = code;
            }
        }
        if let Ok(name) = std::env::var(ENV_SITE_NAME) {
            if !name.is_empty() {
                self.site_name = name;
            }
        }
        self
    }

    /// Configured display name for a language code, if any
    pub fn language_name(&self, code: &str) -> Option<&str> {
        self.languages
            .iter()
            .find(|lang| lang.code == code)
            .map(|lang| lang.name.as_str())
    }

    /// Resolve a language code to the configured content language serving it
    ///
    /// Tries the exact code, then its generic form (`fr-ca` → `fr`), then any
    /// configured variant of the generic form (`fr` → `fr-ca`).
    pub fn supported_content_language_variant(&self, code: &str) -> Result<String, ConfigError> {
        let code = code.to_lowercase();
        if self.language_name(&code).is_some() {
            return Ok(code);
        }

        let generic = code.split('-').next().unwrap_or(&code);
        if self.language_name(generic).is_some() {
            return Ok(generic.to_string());
        }

        let prefix = format!("{}-", generic);
        self.languages
            .iter()
            .find(|lang| lang.code.starts_with(&prefix))
            .map(|lang| lang.code.clone())
            .ok_or(ConfigError::UnsupportedLanguage(code))
    }

    /// The configured default language resolved to a supported variant
    pub fn default_content_language(&self) -> Result<String, ConfigError> {
        self.supported_content_language_variant(&self.language_code)
    }
}
