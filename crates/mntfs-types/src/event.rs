//! Change notifications.

use serde::{Deserialize, Serialize};

use crate::path;

/// What happened to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Changed,
    Deleted,
}

/// A single filesystem change.
///
/// `parent_dir_path` always ends with `/`, so watchers can match a directory
/// by prefix without tripping over sibling names (`/a/b/` vs `/a/bc`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub full_path: String,
    pub parent_dir_path: String,
    pub entry_name: String,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, full_path: &str) -> Self {
        let normalized = path::normalize(full_path);
        let full = path::trim_trailing_slash(&normalized).to_string();
        let parent = path::dirname(&full);
        let parent_dir_path = if parent.ends_with('/') {
            parent
        } else {
            format!("{parent}/")
        };
        Self {
            kind,
            entry_name: path::basename(&full).to_string(),
            parent_dir_path,
            full_path: full,
        }
    }

    pub fn created(full_path: &str) -> Self {
        Self::new(ChangeKind::Created, full_path)
    }

    pub fn changed(full_path: &str) -> Self {
        Self::new(ChangeKind::Changed, full_path)
    }

    pub fn deleted(full_path: &str) -> Self {
        Self::new(ChangeKind::Deleted, full_path)
    }
}
