//! Capability-handle abstraction for user-granted host directories.
//!
//! A handle is an opaque reference to a directory or file that the user
//! granted access to. Before use, read (or read-write) permission must be
//! queried and, if not already granted, requested again. Only an explicit
//! grant counts.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use mntfs_types::{ErrorCode, FileKind, FsError, FsResult};
use serde::{Deserialize, Serialize};

/// Access level a permission query or request is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    Read,
    ReadWrite,
}

/// Answer to a permission query or request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not decided yet; a request will ask the user.
    Prompt,
}

/// Durable form of a directory handle.
///
/// Stored in the mount-point store and turned back into a live handle by
/// the provider named in `provider`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleRecord {
    pub provider: String,
    pub locator: String,
}

/// File size and modification time as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

#[async_trait]
pub trait NativeFile: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    async fn read(&self) -> FsResult<Vec<u8>>;

    async fn metadata(&self) -> FsResult<FileMetadata>;

    /// Replace the file's contents.
    async fn write_all(&self, data: &[u8]) -> FsResult<()>;
}

#[async_trait]
pub trait NativeDirectory: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Durable form of this handle.
    fn record(&self) -> HandleRecord;

    async fn get_directory_handle(
        &self,
        name: &str,
        create: bool,
    ) -> FsResult<Arc<dyn NativeDirectory>>;

    async fn get_file_handle(&self, name: &str, create: bool) -> FsResult<Arc<dyn NativeFile>>;

    /// Child names and kinds, sorted by name.
    async fn entries(&self) -> FsResult<Vec<(String, FileKind)>>;

    async fn remove_entry(&self, name: &str, recursive: bool) -> FsResult<()>;

    /// True if `other` refers to the same host directory.
    async fn is_same_entry(&self, other: &dyn NativeDirectory) -> bool {
        self.record() == other.record()
    }

    /// Path segments from `self` down to `descendant`.
    ///
    /// Empty for the same entry, `None` when `descendant` is not inside.
    async fn resolve(&self, descendant: &dyn NativeDirectory) -> Option<Vec<String>> {
        relative_segments(&self.record(), &descendant.record())
    }

    async fn query_permission(&self, mode: PermissionMode) -> PermissionState;

    async fn request_permission(&self, mode: PermissionMode) -> PermissionState;

    /// Look up a child that may be either a directory or a file.
    async fn child(&self, name: &str) -> FsResult<NativeEntry> {
        match self.get_directory_handle(name, false).await {
            Ok(dir) => Ok(NativeEntry::Directory(dir)),
            Err(err) if err.is(ErrorCode::NotADirectory) => self
                .get_file_handle(name, false)
                .await
                .map(NativeEntry::File),
            Err(err) => Err(err),
        }
    }
}

/// A resolved handle: directory or file.
#[derive(Debug, Clone)]
pub enum NativeEntry {
    Directory(Arc<dyn NativeDirectory>),
    File(Arc<dyn NativeFile>),
}

impl NativeEntry {
    pub fn name(&self) -> &str {
        match self {
            NativeEntry::Directory(d) => d.name(),
            NativeEntry::File(f) => f.name(),
        }
    }

    pub fn kind(&self) -> FileKind {
        match self {
            NativeEntry::Directory(_) => FileKind::Directory,
            NativeEntry::File(_) => FileKind::File,
        }
    }

    pub fn as_directory(&self) -> Option<&Arc<dyn NativeDirectory>> {
        match self {
            NativeEntry::Directory(d) => Some(d),
            NativeEntry::File(_) => None,
        }
    }
}

/// Source of native directory handles.
#[async_trait]
pub trait NativeDirectoryProvider: Send + Sync {
    /// Identifier written into every `HandleRecord` this provider makes.
    fn id(&self) -> &str;

    /// Ask the user to pick a directory. Fails `ECANCELED` when they decline.
    async fn pick_directory(&self) -> FsResult<Arc<dyn NativeDirectory>>;

    /// Open a directory the caller names directly, by this provider's
    /// locator syntax (a host path for host providers).
    async fn open(&self, locator: &str) -> FsResult<Arc<dyn NativeDirectory>>;

    /// Turn a stored record back into a live handle.
    async fn restore(&self, record: &HandleRecord) -> FsResult<Arc<dyn NativeDirectory>>;
}

impl fmt::Debug for dyn NativeDirectoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeDirectoryProvider({})", self.id())
    }
}

/// Segments leading from `base` to `candidate` when both come from the same
/// provider and `candidate`'s locator lies under `base`'s.
pub fn relative_segments(base: &HandleRecord, candidate: &HandleRecord) -> Option<Vec<String>> {
    if base.provider != candidate.provider {
        return None;
    }
    if base.locator == candidate.locator {
        return Some(Vec::new());
    }
    let prefix = if base.locator.ends_with('/') {
        base.locator.clone()
    } else {
        format!("{}/", base.locator)
    };
    candidate.locator.strip_prefix(&prefix).map(|rest| {
        rest.split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

/// Reject names that are not a single path component.
pub fn validate_entry_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(FsError::invalid(format!("invalid entry name: {name:?}")));
    }
    Ok(())
}
