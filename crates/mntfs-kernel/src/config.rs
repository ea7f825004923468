//! Configuration for an mntfs context.
//!
//! Loaded from `~/.config/mntfs/config.toml`. A missing file means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use mntfs_types::Encoding;
use serde::{Deserialize, Serialize};

use crate::native::PermissionPolicy;
use crate::state::paths;

/// Engine behind every path outside `/mnt`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VirtualBackendKind {
    /// Lost when the process exits.
    Memory,
    /// A sandboxed host directory.
    #[default]
    Disk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VfsConfig {
    /// SQLite file holding the mount map. Contexts sharing it share mounts.
    #[serde(default = "paths::mounts_db")]
    pub store_path: PathBuf,

    #[serde(default)]
    pub virtual_backend: VirtualBackendKind,

    /// Root for the disk backend; defaults to the data dir.
    #[serde(default)]
    pub virtual_root: Option<PathBuf>,

    /// How often the binding guard checks the global slot.
    #[serde(default = "default_guard_interval")]
    pub guard_interval_ms: u64,

    /// Used by reads and text writes that name no encoding.
    #[serde(default)]
    pub default_encoding: Encoding,

    /// Seed `/fs/local/default project` on first boot.
    #[serde(default = "default_true")]
    pub create_default_project: bool,

    /// How host directories answer permission prompts.
    #[serde(default)]
    pub permission_policy: PermissionPolicy,
}

fn default_guard_interval() -> u64 {
    1_000
}

fn default_true() -> bool {
    true
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            store_path: paths::mounts_db(),
            virtual_backend: VirtualBackendKind::default(),
            virtual_root: None,
            guard_interval_ms: default_guard_interval(),
            default_encoding: Encoding::default(),
            create_default_project: true,
            permission_policy: PermissionPolicy::default(),
        }
    }
}

impl VfsConfig {
    /// Load from the default path, or defaults if there is no file.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    pub fn config_path() -> Result<PathBuf> {
        let dirs =
            ProjectDirs::from("", "", "mntfs").context("Could not determine config directory")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Everything under one directory, with an in-memory virtual backend.
    /// Handy for tests and throwaway sessions.
    pub fn ephemeral(dir: &Path) -> Self {
        Self {
            store_path: dir.join("mounts.db"),
            virtual_backend: VirtualBackendKind::Memory,
            virtual_root: Some(dir.join("root")),
            ..Self::default()
        }
    }

    pub fn virtual_root(&self) -> PathBuf {
        self.virtual_root.clone().unwrap_or_else(paths::virtual_root)
    }

    pub fn guard_interval(&self) -> Duration {
        Duration::from_millis(self.guard_interval_ms.max(1))
    }
}
