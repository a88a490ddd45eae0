//! Materialized-Path Tree Positioning
//!
//! Structural paths are strings of fixed-width base-36 steps, one step per
//! level: the root `0001`, its children `00010001`, `00010002`, and so on.
//! Lexicographic order of paths is tree order, and a subtree is every path
//! sharing a prefix, so both ordering and subtree queries are plain string
//! comparisons.
//!
//! [`TreePositioner`] is the seam the move orchestrator relocates nodes
//! through. Its contract:
//!
//! - it rewrites structural paths, depths and `numchild` counters only;
//! - it never touches `url_path`;
//! - it never refreshes `Page` values held by the caller, which must be
//!   re-read after a relocation.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::Connection;
use thiserror::Error;

use crate::db::database::DatabaseService;
use crate::db::error::DatabaseError;
use crate::models::{Page, Position};

/// Characters per path step
pub const STEPLEN: usize = 4;

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Largest sibling number a step can encode (36^4 - 1)
pub const MAX_STEP: u64 = 1_679_615;

/// Tree positioning errors
#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Tree node not found: {id}")]
    NodeNotFound { id: i64 },

    /// The node would end up inside its own subtree
    #[error("Cannot move node {node_id} relative to {target_id}: target is the node itself or one of its descendants")]
    InvalidMoveToDescendant { node_id: i64, target_id: i64 },

    #[error("Invalid structural path: {0}")]
    InvalidPath(String),

    #[error("No free sibling position under '{parent_path}'")]
    PathOverflow { parent_path: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Encode a 1-based sibling number as one path step
pub fn encode_step(n: u64) -> Option<String> {
    if n > MAX_STEP {
        return None;
    }
    let mut digits = [b'0'; STEPLEN];
    let mut rest = n;
    for slot in digits.iter_mut().rev() {
        *slot = ALPHABET[(rest % 36) as usize];
        rest /= 36;
    }
    Some(digits.iter().map(|&b| b as char).collect())
}

pub fn decode_step(step: &str) -> Option<u64> {
    if step.len() != STEPLEN {
        return None;
    }
    step.chars().try_fold(0u64, |acc, c| {
        c.to_digit(36)
            .filter(|_| !c.is_ascii_lowercase())
            .map(|d| acc * 36 + d as u64)
    })
}

/// Path of the parent, `None` for roots (and malformed short paths)
pub fn parent_path(path: &str) -> Option<&str> {
    if path.len() > STEPLEN {
        Some(&path[..path.len() - STEPLEN])
    } else {
        None
    }
}

/// Path for a new last child given the current last child path
pub fn next_child_path(parent_path: &str, last_child: Option<&str>) -> Result<String, TreeError> {
    let next = match last_child {
        Some(path) => {
            let step = &path[path.len().saturating_sub(STEPLEN)..];
            decode_step(step).ok_or_else(|| TreeError::InvalidPath(path.to_string()))? + 1
        }
        None => 1,
    };
    let step = encode_step(next).ok_or_else(|| TreeError::PathOverflow {
        parent_path: parent_path.to_string(),
    })?;
    Ok(format!("{}{}", parent_path, step))
}

/// Physically repositions nodes in the tree
#[async_trait]
pub trait TreePositioner: Send + Sync {
    /// Move `node_id` (with its subtree) to `position` relative to `target_id`
    ///
    /// Runs on `conn`, inside whatever transaction the caller has open.
    async fn relocate(
        &self,
        conn: &Connection,
        node_id: i64,
        target_id: i64,
        position: Position,
    ) -> Result<(), TreeError>;
}

/// `TreePositioner` over the `pages` table
pub struct MaterializedPathTree {
    db: Arc<DatabaseService>,
}

impl MaterializedPathTree {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    async fn load(&self, conn: &Connection, id: i64) -> Result<Page, TreeError> {
        self.db
            .fetch_page(conn, id)
            .await?
            .ok_or(TreeError::NodeNotFound { id })
    }

    async fn load_by_path(&self, conn: &Connection, path: &str) -> Result<Page, TreeError> {
        self.db
            .fetch_page_by_path(conn, path)
            .await?
            .ok_or_else(|| TreeError::InvalidPath(path.to_string()))
    }
}

#[async_trait]
impl TreePositioner for MaterializedPathTree {
    async fn relocate(
        &self,
        conn: &Connection,
        node_id: i64,
        target_id: i64,
        position: Position,
    ) -> Result<(), TreeError> {
        let node = self.load(conn, node_id).await?;
        let target = self.load(conn, target_id).await?;

        if target.id == node.id {
            if position.is_child() {
                return Err(TreeError::InvalidMoveToDescendant { node_id, target_id });
            }
            // Before/after itself leaves the tree as it is
            return Ok(());
        }
        if target.is_descendant_of(&node) {
            return Err(TreeError::InvalidMoveToDescendant { node_id, target_id });
        }

        let new_parent = if position.is_child() {
            Some(target.clone())
        } else {
            match target.parent_path() {
                Some(path) => Some(self.load_by_path(conn, path).await?),
                None => None,
            }
        };
        let old_parent = match node.parent_path() {
            Some(path) => Some(self.load_by_path(conn, path).await?),
            None => None,
        };

        let mut siblings: Vec<Page> = self
            .db
            .fetch_children(conn, new_parent.as_ref())
            .await?
            .into_iter()
            .filter(|p| p.id != node.id)
            .collect();

        let index = match position {
            Position::FirstChild => 0,
            Position::LastChild => siblings.len(),
            Position::SortedChild => siblings
                .iter()
                .position(|s| s.title > node.title)
                .unwrap_or(siblings.len()),
            Position::Before | Position::After => {
                let at = siblings
                    .iter()
                    .position(|s| s.id == target.id)
                    .ok_or(TreeError::NodeNotFound { id: target.id })?;
                if position == Position::After {
                    at + 1
                } else {
                    at
                }
            }
        };
        siblings.insert(index, node.clone());

        let (parent_prefix, parent_depth) = match &new_parent {
            Some(parent) => (parent.path.clone(), parent.depth),
            None => (String::new(), 0),
        };

        // Snapshot everything before writing: the moved subtree may currently
        // sit inside a sibling's subtree that is about to be renumbered.
        let moved_subtree = self.db.fetch_subtree(conn, &node.path).await?;
        let moved_ids: HashSet<i64> = moved_subtree.iter().map(|p| p.id).collect();

        let mut updates: Vec<(i64, String, i64)> = Vec::new();
        for (i, sibling) in siblings.iter().enumerate() {
            let step = encode_step(i as u64 + 1).ok_or_else(|| TreeError::PathOverflow {
                parent_path: parent_prefix.clone(),
            })?;
            let new_path = format!("{}{}", parent_prefix, step);

            if sibling.id == node.id {
                for row in &moved_subtree {
                    let path = format!("{}{}", new_path, &row.path[node.path.len()..]);
                    let depth = parent_depth + 1 + (row.depth - node.depth);
                    if path != row.path || depth != row.depth {
                        updates.push((row.id, path, depth));
                    }
                }
            } else if new_path != sibling.path {
                for row in self.db.fetch_subtree(conn, &sibling.path).await? {
                    if moved_ids.contains(&row.id) {
                        continue;
                    }
                    let path = format!("{}{}", new_path, &row.path[sibling.path.len()..]);
                    updates.push((row.id, path, row.depth));
                }
            }
        }

        tracing::debug!(
            "Relocating node {} {} node {}: {} path rewrites",
            node_id,
            position,
            target_id,
            updates.len()
        );

        for (id, path, depth) in &updates {
            self.db.update_tree_position(conn, *id, path, *depth).await?;
        }

        let old_parent_id = old_parent.as_ref().map(|p| p.id);
        let new_parent_id = new_parent.as_ref().map(|p| p.id);
        if old_parent_id != new_parent_id {
            if let Some(id) = old_parent_id {
                self.db.adjust_numchild(conn, id, -1).await?;
            }
            if let Some(id) = new_parent_id {
                self.db.adjust_numchild(conn, id, 1).await?;
            }
        }

        Ok(())
    }
}
