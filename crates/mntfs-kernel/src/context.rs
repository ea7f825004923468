//! One open context: a window, tab, or process with its own registry,
//! watchers and router.
//!
//! Contexts that share a store file and a bus see each other's mounts and
//! file events. Each context listens on the bus in a background task that
//! ends when the context is dropped.

use std::sync::{Arc, Weak};

use anyhow::{Context as _, Result};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::task::JoinHandle;

use crate::bus::{BusEndpoint, ContextId, ContextMessage, ContextTransport, LocalBus};
use crate::config::{VfsConfig, VirtualBackendKind};
use crate::mount::{MountPointStore, MountRegistry};
use crate::native::{LocalProvider, NativeDirectoryProvider};
use crate::router::PathRouter;
use crate::vfs::{DiskFs, FilesystemBackend, MemoryFs};
use crate::watch::WatchService;

/// Collaborators a context is built from.
pub struct ContextDeps {
    pub provider: Arc<dyn NativeDirectoryProvider>,
    pub transport: Arc<dyn ContextTransport>,
    /// Overrides the backend named in the config.
    pub virtual_fs: Option<Arc<dyn FilesystemBackend>>,
}

impl ContextDeps {
    pub fn new(
        provider: Arc<dyn NativeDirectoryProvider>,
        transport: Arc<dyn ContextTransport>,
    ) -> Self {
        Self {
            provider,
            transport,
            virtual_fs: None,
        }
    }

    /// Host directories and an in-process bus.
    pub fn local(config: &VfsConfig) -> Self {
        Self::new(
            Arc::new(LocalProvider::new(config.permission_policy)),
            Arc::new(LocalBus::default()),
        )
    }

    pub fn with_virtual_fs(mut self, fs: Arc<dyn FilesystemBackend>) -> Self {
        self.virtual_fs = Some(fs);
        self
    }
}

#[derive(Debug)]
pub struct FsContext {
    id: ContextId,
    config: VfsConfig,
    provider: Arc<dyn NativeDirectoryProvider>,
    router: Arc<PathRouter>,
    listener: JoinHandle<()>,
}

impl FsContext {
    /// Open the store, load current mounts and start listening on the bus.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(config: VfsConfig, deps: ContextDeps) -> Result<Self> {
        let id = ContextId::next();
        let endpoint = BusEndpoint::new(id, deps.transport);
        // Subscribe before the first load so a peer's change made while it
        // runs still triggers a refresh.
        let messages = endpoint.subscribe();

        if let Some(parent) = config.store_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let store = Arc::new(MountPointStore::open(&config.store_path, deps.provider.clone())?);
        store
            .refresh_mount_points()
            .await
            .context("Failed to load mount points")?;

        let virtual_fs = match deps.virtual_fs {
            Some(fs) => fs,
            None => virtual_backend(&config)?,
        };

        let registry = Arc::new(MountRegistry::new(
            store,
            deps.provider.clone(),
            endpoint.clone(),
        ));
        let watch = Arc::new(WatchService::new(endpoint.clone()));
        let router = Arc::new(PathRouter::new(
            registry,
            virtual_fs,
            watch,
            config.default_encoding,
        ));

        let listener = tokio::spawn(listen(id, Arc::downgrade(&router), messages));

        tracing::info!(context = %id, store = %config.store_path.display(), "Context opened");
        Ok(Self {
            id,
            config,
            provider: deps.provider,
            router,
            listener,
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn NativeDirectoryProvider> {
        &self.provider
    }

    pub fn router(&self) -> &Arc<PathRouter> {
        &self.router
    }

    pub fn registry(&self) -> &Arc<MountRegistry> {
        self.router.registry()
    }

    pub fn watch_service(&self) -> &Arc<WatchService> {
        self.router.watch_service()
    }
}

impl Drop for FsContext {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

fn virtual_backend(config: &VfsConfig) -> Result<Arc<dyn FilesystemBackend>> {
    Ok(match config.virtual_backend {
        VirtualBackendKind::Memory => Arc::new(MemoryFs::new()),
        VirtualBackendKind::Disk => {
            let root = config.virtual_root();
            Arc::new(
                DiskFs::new(&root)
                    .with_context(|| format!("Failed to open virtual root {}", root.display()))?,
            )
        }
    })
}

/// Apply messages from other contexts until the router goes away.
async fn listen(
    id: ContextId,
    router: Weak<PathRouter>,
    mut messages: BoxStream<'static, ContextMessage>,
) {
    while let Some(message) = messages.next().await {
        let Some(router) = router.upgrade() else {
            break;
        };
        match message {
            ContextMessage::MountsChanged => {
                if let Err(e) = router.registry().refresh().await {
                    tracing::warn!(context = %id, error = %e, "Failed to refresh mount points");
                }
            }
            ContextMessage::Watch(event) => router.watch_service().process_remote(&event),
        }
    }
    tracing::debug!(context = %id, "Bus listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{HandleRecord, MemoryProvider, NativeDirectory};
    use mntfs_types::FsResult;

    #[tokio::test]
    async fn opens_with_memory_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = VfsConfig::ephemeral(dir.path());
        let deps = ContextDeps::new(Arc::new(MemoryProvider::new()), Arc::new(LocalBus::default()));
        let ctx = FsContext::open(config, deps).await.unwrap();

        assert!(ctx.registry().mount_names().is_empty());
        assert!(ctx.router().stat("/").await.unwrap().is_directory());
        assert!(dir.path().join("mounts.db").exists());
    }

    #[tokio::test]
    async fn opens_with_disk_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = VfsConfig {
            virtual_backend: VirtualBackendKind::Disk,
            ..VfsConfig::ephemeral(dir.path())
        };
        let ctx = FsContext::open(config, ContextDeps::local(&VfsConfig::default()))
            .await
            .unwrap();

        ctx.router().write_file("/hello.txt", b"hi").await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("root/hello.txt")).unwrap(), b"hi");
    }

    /// Lets a peer context mount a directory while the first load is
    /// restoring records.
    struct PeerMountsDuringLoad {
        inner: MemoryProvider,
        peer: std::sync::Mutex<Option<(Arc<MountPointStore>, BusEndpoint)>>,
    }

    #[async_trait::async_trait]
    impl NativeDirectoryProvider for PeerMountsDuringLoad {
        fn id(&self) -> &str {
            self.inner.id()
        }
        async fn pick_directory(&self) -> FsResult<Arc<dyn NativeDirectory>> {
            self.inner.pick_directory().await
        }
        async fn open(&self, locator: &str) -> FsResult<Arc<dyn NativeDirectory>> {
            self.inner.open(locator).await
        }
        async fn restore(&self, record: &HandleRecord) -> FsResult<Arc<dyn NativeDirectory>> {
            let peer = self.peer.lock().unwrap().take();
            if let Some((store, endpoint)) = peer {
                store
                    .claim_mount_point(self.inner.directory("/work/proj").unwrap())
                    .await
                    .unwrap();
                endpoint.publish(ContextMessage::MountsChanged);
            }
            self.inner.restore(record).await
        }
    }

    #[tokio::test]
    async fn mounts_made_during_open_are_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let config = VfsConfig::ephemeral(dir.path());
        let bus: Arc<dyn ContextTransport> = Arc::new(LocalBus::default());
        let provider = MemoryProvider::new();
        provider.create_dir_all("/work/docs").unwrap();
        provider.create_dir_all("/work/proj").unwrap();

        let peer_store =
            Arc::new(MountPointStore::open(&config.store_path, Arc::new(provider.clone())).unwrap());
        peer_store
            .claim_mount_point(provider.directory("/work/docs").unwrap())
            .await
            .unwrap();
        let peer = BusEndpoint::new(ContextId::next(), bus.clone());

        let hooked = PeerMountsDuringLoad {
            inner: provider,
            peer: std::sync::Mutex::new(Some((peer_store, peer))),
        };
        let ctx = FsContext::open(config, ContextDeps::new(Arc::new(hooked), bus))
            .await
            .unwrap();

        for _ in 0..200 {
            if ctx.registry().mount_names().len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(ctx.registry().mount_names(), vec!["docs", "proj"]);
    }

    #[tokio::test]
    async fn store_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = VfsConfig {
            store_path: dir.path().join("nested/deeper/mounts.db"),
            ..VfsConfig::ephemeral(dir.path())
        };
        let deps = ContextDeps::new(Arc::new(MemoryProvider::new()), Arc::new(LocalBus::default()));
        FsContext::open(config, deps).await.unwrap();
        assert!(dir.path().join("nested/deeper/mounts.db").exists());
    }
}
