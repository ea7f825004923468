//! XDG Base Directory paths for mntfs state.
//!
//! | Purpose | XDG Variable | Default | mntfs Path |
//! |---------|--------------|---------|------------|
//! | Mount store | `$XDG_DATA_HOME` | `~/.local/share` | `$XDG_DATA_HOME/mntfs/mounts.db` |
//! | Disk root | `$XDG_DATA_HOME` | `~/.local/share` | `$XDG_DATA_HOME/mntfs/root/` |
//! | History | `$XDG_DATA_HOME` | `~/.local/share` | `$XDG_DATA_HOME/mntfs/history.txt` |
//! | Config | `$XDG_CONFIG_HOME` | `~/.config` | `$XDG_CONFIG_HOME/mntfs/config.toml` |

use std::path::PathBuf;

use directories::BaseDirs;

const APP: &str = "mntfs";

/// `$XDG_DATA_HOME/mntfs`, or `~/.local/share/mntfs`.
pub fn data_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| home_fallback().join(".local").join("share"))
        .join(APP)
}

/// `$XDG_CONFIG_HOME/mntfs`, or `~/.config/mntfs`.
pub fn config_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| home_fallback().join(".config"))
        .join(APP)
}

/// SQLite file holding the mount map.
pub fn mounts_db() -> PathBuf {
    data_dir().join("mounts.db")
}

/// Host directory backing the disk virtual backend.
pub fn virtual_root() -> PathBuf {
    data_dir().join("root")
}

pub fn history_file() -> PathBuf {
    data_dir().join("history.txt")
}

fn home_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir())
}
