//! Audit Log Entries
//!
//! Append-only records of actions taken on pages. Entries are written once
//! and never updated.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of action recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Create,
    /// Page changed parent
    Move,
    /// Page changed position among its existing siblings
    Reorder,
    Publish,
    Unpublish,
    Delete,
    CopyForTranslation,
}

impl LogAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LogAction::Create => "create",
            LogAction::Move => "move",
            LogAction::Reorder => "reorder",
            LogAction::Publish => "publish",
            LogAction::Unpublish => "unpublish",
            LogAction::Delete => "delete",
            LogAction::CopyForTranslation => "copy_for_translation",
        }
    }
}

impl fmt::Display for LogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for LogAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(LogAction::Create),
            "move" => Ok(LogAction::Move),
            "reorder" => Ok(LogAction::Reorder),
            "publish" => Ok(LogAction::Publish),
            "unpublish" => Ok(LogAction::Unpublish),
            "delete" => Ok(LogAction::Delete),
            "copy_for_translation" => Ok(LogAction::CopyForTranslation),
            other => Err(format!("Unknown log action: {}", other)),
        }
    }
}

/// Summary of a page referenced from an audit payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub id: i64,
    pub title: String,
}

/// Payload of `move` and `reorder` entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveLogData {
    pub source: Option<PageSummary>,
    pub destination: Option<PageSummary>,
}

/// A persisted audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLogEntry {
    pub id: i64,
    pub page_id: i64,
    pub action: LogAction,
    /// Identifier of the acting user, `None` for system actions
    pub actor: Option<String>,
    /// Page title at the time of the action
    pub label: String,
    pub data: serde_json::Value,
    /// Set when the page no longer exists after this action
    pub deleted: bool,
    pub timestamp: DateTime<Utc>,
}

impl PageLogEntry {
    /// Decode the payload of a `move`/`reorder` entry
    pub fn move_data(&self) -> Option<MoveLogData> {
        match self.action {
            LogAction::Move | LogAction::Reorder => serde_json::from_value(self.data.clone()).ok(),
            _ => None,
        }
    }
}

/// An audit entry about to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    pub page_id: i64,
    pub action: LogAction,
    pub actor: Option<String>,
    pub label: String,
    pub data: serde_json::Value,
    pub deleted: bool,
}

impl NewLogEntry {
    pub fn new(page_id: i64, action: LogAction, label: impl Into<String>) -> Self {
        Self {
            page_id,
            action,
            actor: None,
            label: label.into(),
            data: serde_json::Value::Object(Default::default()),
            deleted: false,
        }
    }

    pub fn by(mut self, actor: Option<&str>) -> Self {
        self.actor = actor.map(str::to_string);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }
}
