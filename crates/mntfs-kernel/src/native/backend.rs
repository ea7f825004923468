//! Filesystem operations over mounted capability handles.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use mntfs_types::{path, ErrorCode, FsError, FsResult, Stat};

use super::provider::{NativeDirectory, NativeEntry, PermissionMode};
use crate::mount::{verify_permission, MountRegistry};
use crate::vfs::FilesystemBackend;

/// The `/mnt` side of the router.
#[derive(Debug, Clone)]
pub struct NativeBackend {
    registry: Arc<MountRegistry>,
}

impl NativeBackend {
    pub fn new(registry: Arc<MountRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MountRegistry> {
        &self.registry
    }

    /// Resolve the parent of `p` as a writable directory.
    ///
    /// Entries directly under `/mnt` are mounts, not files; they are created
    /// by mounting only.
    async fn parent_dir(&self, p: &str) -> FsResult<(Arc<dyn NativeDirectory>, String)> {
        let normalized = path::normalize(p);
        let parent = path::dirname(&normalized);
        if path::is_mount_root(&parent) || path::is_mount_root(&normalized) {
            return Err(FsError::invalid("entries directly under /mnt are mounts").at(p));
        }

        let name = path::basename(&normalized).to_string();
        match self.registry.resolve(&parent, PermissionMode::ReadWrite).await? {
            NativeEntry::Directory(dir) => Ok((dir, name)),
            NativeEntry::File(_) => {
                Err(FsError::not_a_directory("parent is not a directory").at(p))
            }
        }
    }

    /// Optional lookup of `name` under `dir`.
    async fn lookup(dir: &dyn NativeDirectory, name: &str) -> FsResult<Option<NativeEntry>> {
        match dir.child(name).await {
            Ok(entry) => Ok(Some(entry)),
            Err(err) if err.is(ErrorCode::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Copy `src` to `<dst_dir>/<src basename>`, or onto `dst` itself when it
    /// does not exist yet. Returns the path that was created.
    ///
    /// Both paths must be inside mounts.
    pub async fn copy(&self, src: &str, dst: &str) -> FsResult<String> {
        let source = self.registry.resolve(src, PermissionMode::Read).await?;
        let dst_norm = path::trim_trailing_slash(&path::normalize(dst)).to_string();

        let existing = self
            .registry
            .get_handle_from_path_if_present(&dst_norm)
            .await?;

        let (target_dir, name, created) = match (existing, &source) {
            (Some(NativeEntry::Directory(dir)), _) => {
                let name = path::basename(&path::normalize(src)).to_string();
                if Self::lookup(dir.as_ref(), &name).await?.is_some() {
                    return Err(FsError::already_exists("destination already exists")
                        .at(path::join([dst_norm.as_str(), name.as_str()])));
                }
                let created = path::join([dst_norm.as_str(), name.as_str()]);
                (dir, name, created)
            }
            (Some(NativeEntry::File(_)), _) => {
                return Err(FsError::already_exists("destination already exists").at(dst));
            }
            (None, NativeEntry::Directory(_)) => {
                return Err(FsError::not_found("destination directory does not exist").at(dst));
            }
            (None, NativeEntry::File(_)) => {
                let (dir, name) = self.parent_dir(&dst_norm).await?;
                (dir, name, dst_norm.clone())
            }
        };

        if !verify_permission(target_dir.as_ref(), PermissionMode::ReadWrite).await {
            return Err(FsError::access_denied("write permission was not granted").at(dst));
        }
        let src_norm = path::trim_trailing_slash(&path::normalize(src)).to_string();
        if matches!(source, NativeEntry::Directory(_))
            && created.starts_with(&format!("{src_norm}/"))
        {
            return Err(FsError::invalid("cannot copy a directory into itself").at(dst));
        }

        copy_entry(source, target_dir, name).await?;
        Ok(created)
    }
}

/// Recursively copy `entry` into `dir` under `name`.
fn copy_entry(
    entry: NativeEntry,
    dir: Arc<dyn NativeDirectory>,
    name: String,
) -> BoxFuture<'static, FsResult<()>> {
    async move {
        match entry {
            NativeEntry::File(file) => {
                let data = file.read().await?;
                let target = dir.get_file_handle(&name, true).await?;
                target.write_all(&data).await
            }
            NativeEntry::Directory(source) => {
                let target = dir.get_directory_handle(&name, true).await?;
                for (child_name, _) in source.entries().await? {
                    let child = source.child(&child_name).await?;
                    copy_entry(child, target.clone(), child_name).await?;
                }
                Ok(())
            }
        }
    }
    .boxed()
}

#[async_trait]
impl FilesystemBackend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    async fn readdir(&self, p: &str) -> FsResult<Vec<String>> {
        if path::is_mount_root(p) {
            return Ok(self.registry.mount_names());
        }
        match self.registry.resolve(p, PermissionMode::Read).await? {
            NativeEntry::Directory(dir) => Ok(dir
                .entries()
                .await?
                .into_iter()
                .map(|(name, _)| name)
                .collect()),
            NativeEntry::File(_) => Err(FsError::not_a_directory("not a directory").at(p)),
        }
    }

    async fn stat(&self, p: &str) -> FsResult<Stat> {
        let normalized = path::normalize(p);
        let full = path::trim_trailing_slash(&normalized);
        if path::is_mount_root(full) {
            return Ok(Stat::directory(path::MOUNT_ROOT));
        }
        match self.registry.resolve(full, PermissionMode::Read).await? {
            NativeEntry::Directory(_) => Ok(Stat::directory(full)),
            NativeEntry::File(file) => {
                let meta = file.metadata().await?;
                Ok(Stat::file(full, meta.size).with_mtime(meta.modified))
            }
        }
    }

    async fn read(&self, p: &str) -> FsResult<Vec<u8>> {
        if path::is_mount_root(p) {
            return Err(FsError::is_a_directory("is a directory").at(p));
        }
        match self.registry.resolve(p, PermissionMode::Read).await? {
            NativeEntry::File(file) => file.read().await,
            NativeEntry::Directory(_) => Err(FsError::is_a_directory("is a directory").at(p)),
        }
    }

    async fn write(&self, p: &str, data: &[u8]) -> FsResult<()> {
        let (dir, name) = self.parent_dir(p).await?;
        let file = dir.get_file_handle(&name, true).await.map_err(|e| e.at(p))?;
        file.write_all(data).await
    }

    async fn mkdir(&self, p: &str) -> FsResult<()> {
        let (dir, name) = self.parent_dir(p).await?;
        match dir.get_directory_handle(&name, true).await {
            Ok(_) => Ok(()),
            Err(err) if err.is(ErrorCode::NotADirectory) => {
                Err(FsError::already_exists("a file with that name exists").at(p))
            }
            Err(err) => Err(err.at(p)),
        }
    }

    async fn unlink(&self, p: &str) -> FsResult<()> {
        if path::split_mount_path(&path::normalize(p)).is_some_and(|(_, rest)| rest.is_empty()) {
            return Err(FsError::not_permitted("unmount the folder instead").at(p));
        }
        let (dir, name) = self.parent_dir(p).await?;
        dir.remove_entry(&name, false).await.map_err(|e| e.at(p))
    }

    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let from_norm = path::trim_trailing_slash(&path::normalize(from)).to_string();
        let to_norm = path::trim_trailing_slash(&path::normalize(to)).to_string();

        let (from_mount, from_rest) = path::split_mount_path(&from_norm)
            .ok_or_else(|| FsError::invalid("not a mount path").at(from))?;
        let (to_mount, to_rest) = path::split_mount_path(&to_norm)
            .ok_or_else(|| FsError::invalid("not a mount path").at(to))?;
        if from_rest.is_empty() || to_rest.is_empty() {
            return Err(FsError::not_permitted("cannot rename a mount root").at(from));
        }
        if from_mount != to_mount {
            return Err(FsError::cross_device("cannot rename across mounts").at(to));
        }
        if from_norm == to_norm {
            return Ok(());
        }
        if to_norm.starts_with(&format!("{from_norm}/")) {
            return Err(FsError::invalid("cannot move a directory into itself").at(to));
        }

        let source = self.registry.resolve(&from_norm, PermissionMode::ReadWrite).await?;
        let (from_dir, from_name) = self.parent_dir(&from_norm).await?;
        let (to_dir, to_name) = self.parent_dir(&to_norm).await?;

        match (&source, Self::lookup(to_dir.as_ref(), &to_name).await?) {
            (_, None) => {}
            (NativeEntry::File(_), Some(NativeEntry::File(_))) => {
                to_dir.remove_entry(&to_name, false).await?;
            }
            (NativeEntry::File(_), Some(NativeEntry::Directory(_))) => {
                return Err(FsError::is_a_directory("destination is a directory").at(to));
            }
            (NativeEntry::Directory(_), Some(NativeEntry::File(_))) => {
                return Err(FsError::not_a_directory("destination is not a directory").at(to));
            }
            (NativeEntry::Directory(_), Some(NativeEntry::Directory(_))) => {
                return Err(FsError::already_exists("destination already exists").at(to));
            }
        }

        copy_entry(source, to_dir, to_name).await?;
        from_dir.remove_entry(&from_name, true).await
    }
}
