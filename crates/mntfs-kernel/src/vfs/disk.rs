//! Disk-backed virtual filesystem.
//!
//! Stores the virtual namespace under a sandbox directory on the host.
//! Virtual paths never escape the root, neither through `..` nor through
//! symlinks planted inside it.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mntfs_types::{path, FsError, FsResult, Stat};
use tokio::fs;

use super::traits::FilesystemBackend;

/// Virtual filesystem rooted at a host directory.
///
/// `read("/fs/local/a.txt")` reads `<root>/fs/local/a.txt`.
#[derive(Debug, Clone)]
pub struct DiskFs {
    root: PathBuf,
}

fn with_path(path: &str) -> impl FnOnce(io::Error) -> FsError + '_ {
    move |err| FsError::from(err).at(path)
}

impl DiskFs {
    /// Create a disk filesystem rooted at `root`, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> FsResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a virtual path to a host path inside the root.
    ///
    /// Returns `EACCES` if an existing ancestor resolves outside the root.
    fn resolve(&self, path: &str) -> FsResult<PathBuf> {
        let mut full = self.root.clone();
        for segment in path::segments(&format!("/{path}")) {
            full.push(segment);
        }

        // Canonicalize the deepest existing ancestor to catch symlinks.
        let mut probe = full.as_path();
        while !probe.exists() {
            match probe.parent() {
                Some(parent) => probe = parent,
                None => break,
            }
        }
        let canonical = probe.canonicalize().map_err(with_path(path))?;
        if !canonical.starts_with(&self.root) {
            return Err(FsError::access_denied(format!(
                "path escapes root: {} is not under {}",
                canonical.display(),
                self.root.display()
            ))
            .at(path));
        }

        Ok(full)
    }
}

#[async_trait]
impl FilesystemBackend for DiskFs {
    fn name(&self) -> &str {
        "disk"
    }

    async fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        let full = self.resolve(path)?;
        let mut dir = fs::read_dir(&full).await.map_err(with_path(path))?;

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(with_path(path))? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn stat(&self, path: &str) -> FsResult<Stat> {
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full).await.map_err(with_path(path))?;

        let virtual_path = path::normalize(&format!("/{path}"));
        let virtual_path = path::trim_trailing_slash(&virtual_path);
        let stat = if meta.is_dir() {
            Stat::directory(virtual_path)
        } else {
            // Sockets, pipes and devices are reported as files.
            Stat::file(virtual_path, meta.len())
        };
        Ok(stat.with_times(
            meta.modified().ok(),
            meta.created().ok(),
            meta.accessed().ok(),
        ))
    }

    async fn read(&self, path: &str) -> FsResult<Vec<u8>> {
        let full = self.resolve(path)?;
        if fs::metadata(&full).await.map_err(with_path(path))?.is_dir() {
            return Err(FsError::is_a_directory("is a directory").at(path));
        }
        fs::read(&full).await.map_err(with_path(path))
    }

    async fn write(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let full = self.resolve(path)?;
        if let Ok(meta) = fs::metadata(&full).await
            && meta.is_dir()
        {
            return Err(FsError::is_a_directory("is a directory").at(path));
        }
        fs::write(&full, data).await.map_err(with_path(path))
    }

    async fn mkdir(&self, path: &str) -> FsResult<()> {
        let full = self.resolve(path)?;
        fs::create_dir(&full).await.map_err(with_path(path))
    }

    async fn unlink(&self, path: &str) -> FsResult<()> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(FsError::not_permitted("cannot remove root directory").at(path));
        }
        let meta = fs::metadata(&full).await.map_err(with_path(path))?;

        if meta.is_dir() {
            fs::remove_dir(&full).await.map_err(with_path(path))
        } else {
            fs::remove_file(&full).await.map_err(with_path(path))
        }
    }

    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        if from_path == self.root {
            return Err(FsError::not_permitted("cannot rename root directory").at(from));
        }
        fs::rename(&from_path, &to_path).await.map_err(with_path(from))
    }
}
