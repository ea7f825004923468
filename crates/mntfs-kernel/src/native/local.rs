//! Host directories as native handles.
//!
//! Locators are canonical absolute paths. Permission answers come from a
//! configurable policy, since there is no browser prompt to consult.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use mntfs_types::{FileKind, FsError, FsResult};
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::provider::{
    validate_entry_name, FileMetadata, HandleRecord, NativeDirectory, NativeDirectoryProvider,
    NativeFile, PermissionMode, PermissionState,
};

const PROVIDER_ID: &str = "local";

/// How permission queries on host directories are answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionPolicy {
    #[default]
    GrantAll,
    ReadOnly,
    DenyAll,
}

impl PermissionPolicy {
    fn answer(self, mode: PermissionMode) -> PermissionState {
        match (self, mode) {
            (PermissionPolicy::GrantAll, _) => PermissionState::Granted,
            (PermissionPolicy::ReadOnly, PermissionMode::Read) => PermissionState::Granted,
            (PermissionPolicy::ReadOnly, PermissionMode::ReadWrite) => PermissionState::Denied,
            (PermissionPolicy::DenyAll, _) => PermissionState::Denied,
        }
    }
}

fn with_path(path: &Path) -> impl FnOnce(io::Error) -> FsError + '_ {
    move |err| FsError::from(err).at(path.display().to_string())
}

/// Provider over the host filesystem.
#[derive(Debug)]
pub struct LocalProvider {
    policy: PermissionPolicy,
    pick: Mutex<Option<PathBuf>>,
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new(PermissionPolicy::default())
    }
}

impl LocalProvider {
    pub fn new(policy: PermissionPolicy) -> Self {
        Self {
            policy,
            pick: Mutex::new(None),
        }
    }

    /// Directory returned by the next `pick_directory` call.
    pub fn set_pick(&self, dir: impl Into<PathBuf>) {
        *self.pick.lock().unwrap_or_else(PoisonError::into_inner) = Some(dir.into());
    }

    /// Open a host directory as a handle.
    pub async fn open_dir(&self, dir: impl AsRef<Path>) -> FsResult<Arc<dyn NativeDirectory>> {
        let dir = dir.as_ref();
        let canonical = fs::canonicalize(dir).await.map_err(with_path(dir))?;
        let meta = fs::metadata(&canonical).await.map_err(with_path(dir))?;
        if !meta.is_dir() {
            return Err(FsError::not_a_directory("not a directory").at(dir.display().to_string()));
        }
        Ok(Arc::new(LocalDirectory::new(canonical, self.policy)))
    }
}

#[async_trait]
impl NativeDirectoryProvider for LocalProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn pick_directory(&self) -> FsResult<Arc<dyn NativeDirectory>> {
        let pick = self
            .pick
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pick {
            Some(dir) => self.open_dir(dir).await,
            None => Err(FsError::canceled("no directory was picked")),
        }
    }

    async fn open(&self, locator: &str) -> FsResult<Arc<dyn NativeDirectory>> {
        self.open_dir(locator).await
    }

    async fn restore(&self, record: &HandleRecord) -> FsResult<Arc<dyn NativeDirectory>> {
        if record.provider != PROVIDER_ID {
            return Err(FsError::invalid(format!(
                "handle belongs to provider {}",
                record.provider
            )));
        }
        self.open_dir(&record.locator).await
    }
}

#[derive(Debug)]
pub struct LocalDirectory {
    path: PathBuf,
    name: String,
    policy: PermissionPolicy,
}

impl LocalDirectory {
    fn new(path: PathBuf, policy: PermissionPolicy) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name, policy }
    }

    fn child_path(&self, name: &str) -> FsResult<PathBuf> {
        validate_entry_name(name)?;
        Ok(self.path.join(name))
    }
}

#[async_trait]
impl NativeDirectory for LocalDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn record(&self) -> HandleRecord {
        HandleRecord {
            provider: PROVIDER_ID.to_string(),
            locator: self.path.to_string_lossy().into_owned(),
        }
    }

    async fn get_directory_handle(
        &self,
        name: &str,
        create: bool,
    ) -> FsResult<Arc<dyn NativeDirectory>> {
        let child = self.child_path(name)?;
        match fs::metadata(&child).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(FsError::not_a_directory("entry is a file")
                    .at(child.display().to_string()));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound && create => {
                fs::create_dir(&child).await.map_err(with_path(&child))?;
            }
            Err(err) => return Err(with_path(&child)(err)),
        }
        Ok(Arc::new(LocalDirectory::new(child, self.policy)))
    }

    async fn get_file_handle(&self, name: &str, create: bool) -> FsResult<Arc<dyn NativeFile>> {
        let child = self.child_path(name)?;
        match fs::metadata(&child).await {
            Ok(meta) if meta.is_dir() => {
                return Err(FsError::is_a_directory("entry is a directory")
                    .at(child.display().to_string()));
            }
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound && create => {
                fs::write(&child, b"").await.map_err(with_path(&child))?;
            }
            Err(err) => return Err(with_path(&child)(err)),
        }
        Ok(Arc::new(LocalFile {
            name: name.to_string(),
            path: child,
        }))
    }

    async fn entries(&self) -> FsResult<Vec<(String, FileKind)>> {
        let mut dir = fs::read_dir(&self.path).await.map_err(with_path(&self.path))?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(with_path(&self.path))? {
            // Follow symlinks so a linked directory lists as a directory.
            let kind = match fs::metadata(entry.path()).await {
                Ok(meta) if meta.is_dir() => FileKind::Directory,
                _ => FileKind::File,
            };
            entries.push((entry.file_name().to_string_lossy().into_owned(), kind));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    async fn remove_entry(&self, name: &str, recursive: bool) -> FsResult<()> {
        let child = self.child_path(name)?;
        let meta = fs::symlink_metadata(&child).await.map_err(with_path(&child))?;
        let result = if meta.is_dir() && recursive {
            fs::remove_dir_all(&child).await
        } else if meta.is_dir() {
            fs::remove_dir(&child).await
        } else {
            fs::remove_file(&child).await
        };
        result.map_err(with_path(&child))
    }

    async fn query_permission(&self, mode: PermissionMode) -> PermissionState {
        self.policy.answer(mode)
    }

    async fn request_permission(&self, mode: PermissionMode) -> PermissionState {
        self.policy.answer(mode)
    }
}

#[derive(Debug)]
pub struct LocalFile {
    name: String,
    path: PathBuf,
}

#[async_trait]
impl NativeFile for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self) -> FsResult<Vec<u8>> {
        fs::read(&self.path).await.map_err(with_path(&self.path))
    }

    async fn metadata(&self) -> FsResult<FileMetadata> {
        let meta = fs::metadata(&self.path).await.map_err(with_path(&self.path))?;
        Ok(FileMetadata {
            size: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    async fn write_all(&self, data: &[u8]) -> FsResult<()> {
        fs::write(&self.path, data).await.map_err(with_path(&self.path))
    }
}
