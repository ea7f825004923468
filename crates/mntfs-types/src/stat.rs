//! Backend-agnostic file metadata.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// What an entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
}

/// Metadata for a single entry.
///
/// Native handles do not always expose timestamps, so they are optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub name: String,
    pub path: String,
    pub kind: FileKind,
    pub size: u64,
    #[serde(default)]
    pub mtime: Option<SystemTime>,
    #[serde(default)]
    pub ctime: Option<SystemTime>,
    #[serde(default)]
    pub atime: Option<SystemTime>,
}

impl Stat {
    pub fn file(path: &str, size: u64) -> Self {
        Self::new(path, FileKind::File, size)
    }

    pub fn directory(path: &str) -> Self {
        Self::new(path, FileKind::Directory, 0)
    }

    fn new(path: &str, kind: FileKind, size: u64) -> Self {
        Self {
            name: crate::path::basename(path).to_string(),
            path: path.to_string(),
            kind,
            size,
            mtime: None,
            ctime: None,
            atime: None,
        }
    }

    /// Set all three timestamps from a single modification time.
    ///
    /// Native handles only report last-modified, so it stands in for the rest.
    pub fn with_mtime(mut self, mtime: Option<SystemTime>) -> Self {
        self.mtime = mtime;
        self.ctime = mtime;
        self.atime = mtime;
        self
    }

    pub fn with_times(
        mut self,
        mtime: Option<SystemTime>,
        ctime: Option<SystemTime>,
        atime: Option<SystemTime>,
    ) -> Self {
        self.mtime = mtime;
        self.ctime = ctime;
        self.atime = atime;
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }
}
