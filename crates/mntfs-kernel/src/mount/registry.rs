//! Mount registry: mounting, dedupe, and path → handle resolution.

use std::sync::Arc;

use futures::future::join_all;
use mntfs_types::{path, ErrorCode, FsError, FsResult};

use super::store::{Claim, MountMap, MountPointStore};
use crate::bus::{BusEndpoint, ContextMessage};
use crate::native::{
    NativeDirectory, NativeDirectoryProvider, NativeEntry, PermissionMode, PermissionState,
};

/// The authoritative set of mounts for one context.
#[derive(Debug)]
pub struct MountRegistry {
    store: Arc<MountPointStore>,
    provider: Arc<dyn NativeDirectoryProvider>,
    bus: BusEndpoint,
}

/// Outcome of the dedupe probe against one existing mount.
struct Probe {
    name: String,
    same: bool,
    descendant: Option<Vec<String>>,
}

impl MountRegistry {
    pub fn new(
        store: Arc<MountPointStore>,
        provider: Arc<dyn NativeDirectoryProvider>,
        bus: BusEndpoint,
    ) -> Self {
        Self {
            store,
            provider,
            bus,
        }
    }

    pub fn store(&self) -> &Arc<MountPointStore> {
        &self.store
    }

    /// Mount a directory and return its `/mnt/...` path.
    ///
    /// With no handle the provider's picker is asked for one. A directory
    /// that is already mounted, or lies inside a mount, resolves to the
    /// existing path instead of a new mount. Every failure is reported as
    /// `ENOTMOUNTED`.
    pub async fn mount_native_folder(
        &self,
        handle: Option<Arc<dyn NativeDirectory>>,
    ) -> FsResult<String> {
        let mounted = self.mount_inner(handle).await.map_err(|err| {
            tracing::warn!(error = %err, "Mount failed");
            FsError::not_mounted(err)
        })?;
        self.bus.publish(ContextMessage::MountsChanged);
        Ok(mounted)
    }

    async fn mount_inner(&self, handle: Option<Arc<dyn NativeDirectory>>) -> FsResult<String> {
        self.store.refresh_mount_points().await?;

        let handle = match handle {
            Some(handle) => handle,
            None => self.provider.pick_directory().await?,
        };

        if let Some(existing) = self.find_existing(&handle).await {
            tracing::debug!(path = %existing, "Directory already mounted");
            return Ok(existing);
        }

        let claim = self.store.claim_mount_point(handle).await?;
        let mount = path::mount_path(claim.name());
        match claim {
            Claim::Created(_) => tracing::info!(path = %mount, "Mounted native folder"),
            Claim::Existing(_) => tracing::debug!(path = %mount, "Mount claimed by another context"),
        }
        Ok(mount)
    }

    /// Probe every mount concurrently for same-entry or ancestry.
    async fn find_existing(&self, handle: &Arc<dyn NativeDirectory>) -> Option<String> {
        let mounts = self.store.mount_points();
        let probes = join_all(mounts.iter().map(|(name, mounted)| async move {
            Probe {
                name: name.clone(),
                same: mounted.is_same_entry(handle.as_ref()).await,
                descendant: mounted.resolve(handle.as_ref()).await,
            }
        }))
        .await;

        if let Some(probe) = probes.iter().find(|p| p.same) {
            return Some(path::mount_path(&probe.name));
        }
        probes.iter().find_map(|p| match &p.descendant {
            Some(segments) if !segments.is_empty() => Some(format!(
                "{}/{}",
                path::mount_path(&p.name),
                segments.join("/")
            )),
            _ => None,
        })
    }

    /// Forget a mount in every context.
    pub async fn unmount(&self, name: &str) -> FsResult<()> {
        if !self.store.remove_mount_point(name).await? {
            return Err(FsError::not_found("no such mount").at(path::mount_path(name)));
        }
        tracing::info!(mount = %name, "Unmounted native folder");
        self.bus.publish(ContextMessage::MountsChanged);
        Ok(())
    }

    /// Reload the mount map after another context changed it.
    pub async fn refresh(&self) -> FsResult<()> {
        self.store.refresh_mount_points().await
    }

    pub fn mount_names(&self) -> Vec<String> {
        self.store.mount_names()
    }

    pub fn mount_points(&self) -> MountMap {
        self.store.mount_points()
    }

    pub fn is_mount_path(&self, p: &str) -> bool {
        path::is_mount_path(p)
    }

    pub fn is_mount_sub_path(&self, p: &str) -> bool {
        path::is_mount_sub_path(p)
    }

    /// Resolve a mount subpath to its handle, checking read permission.
    pub async fn get_handle_from_path(&self, p: &str) -> FsResult<NativeEntry> {
        self.resolve(p, PermissionMode::Read).await
    }

    /// Like [`get_handle_from_path`](Self::get_handle_from_path), but a
    /// missing entry is `None` rather than `ENOENT`.
    pub async fn get_handle_from_path_if_present(&self, p: &str) -> FsResult<Option<NativeEntry>> {
        match self.resolve(p, PermissionMode::Read).await {
            Ok(entry) => Ok(Some(entry)),
            Err(err) if err.is(ErrorCode::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Walk `/mnt/<name>/<segments...>` from the mount's root handle.
    pub(crate) async fn resolve(&self, p: &str, mode: PermissionMode) -> FsResult<NativeEntry> {
        let normalized = path::normalize(p);
        let trimmed = path::trim_trailing_slash(&normalized);
        let parts: Vec<&str> = trimmed.split('/').collect();

        let name = match parts.as_slice() {
            ["", "mnt", name, ..] if !name.is_empty() => *name,
            _ => return Err(FsError::invalid("not a mount path").at(p)),
        };

        let root = self
            .store
            .get(name)
            .ok_or_else(|| FsError::not_found("no such mount").at(p))?;

        if !verify_permission(root.as_ref(), mode).await {
            return Err(FsError::access_denied("permission to the mounted folder was not granted").at(p));
        }

        let mut current = NativeEntry::Directory(root);
        for segment in &parts[3..] {
            let dir = match &current {
                NativeEntry::Directory(dir) => dir.clone(),
                NativeEntry::File(_) => {
                    return Err(FsError::not_a_directory("not a directory").at(p));
                }
            };
            verify_readable(dir.as_ref(), p).await?;
            current = dir.child(segment).await.map_err(|err| match err.code() {
                ErrorCode::NotFound => FsError::not_found("no such file or directory").at(p),
                _ => err,
            })?;
        }

        if let NativeEntry::Directory(dir) = &current {
            verify_readable(dir.as_ref(), p).await?;
        }
        Ok(current)
    }
}

/// Query, then request if needed. Only an explicit grant counts.
pub async fn verify_permission(handle: &dyn NativeDirectory, mode: PermissionMode) -> bool {
    if handle.query_permission(mode).await == PermissionState::Granted {
        return true;
    }
    handle.request_permission(mode).await == PermissionState::Granted
}

/// A directory handle can outlive the directory; listing it tells us.
async fn verify_readable(dir: &dyn NativeDirectory, p: &str) -> FsResult<()> {
    match dir.entries().await {
        Ok(_) => Ok(()),
        Err(err) if err.is(ErrorCode::NotFound) => {
            Err(FsError::not_found("directory no longer exists").at(p))
        }
        Err(err) => Err(FsError::io(format!("directory cannot be read: {}", err.message())).at(p)),
    }
}
