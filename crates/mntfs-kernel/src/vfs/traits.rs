//! Backend trait shared by the virtual filesystems and native mounts.

use async_trait::async_trait;
use mntfs_types::{FsResult, Stat};

/// POSIX-like async filesystem addressed by absolute, normalized paths.
///
/// Every failure is an `FsError` from the closed errno taxonomy; backends
/// normalize host errors before returning them.
#[async_trait]
pub trait FilesystemBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Names of the entries in a directory, sorted.
    async fn readdir(&self, path: &str) -> FsResult<Vec<String>>;

    async fn stat(&self, path: &str) -> FsResult<Stat>;

    /// Read the full contents of a file.
    async fn read(&self, path: &str) -> FsResult<Vec<u8>>;

    /// Create or truncate a file. The parent directory must exist.
    async fn write(&self, path: &str, data: &[u8]) -> FsResult<()>;

    /// Create one directory. Fails `EEXIST` if anything is already there
    /// and `ENOENT` if the parent is missing.
    async fn mkdir(&self, path: &str) -> FsResult<()>;

    /// Move a file or directory tree.
    async fn rename(&self, from: &str, to: &str) -> FsResult<()>;

    /// Remove a file or an empty directory.
    async fn unlink(&self, path: &str) -> FsResult<()>;

    async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }
}
