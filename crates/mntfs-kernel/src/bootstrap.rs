//! Process startup: global bindings, the binding guard, and the fixed
//! application directories.

use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, Weak};
use std::time::Duration;

use mntfs_types::{ErrorCode, FsError, FsResult};
use tokio::task::JoinHandle;

use crate::context::FsContext;
use crate::router::PathRouter;

pub const ROOT_DIR: &str = "/fs/";
pub const APP_SUPPORT_DIR: &str = "/fs/app/";
pub const EXTENSIONS_DIR: &str = "/fs/app/extensions/";
pub const LOCAL_DIR: &str = "/fs/local/";
pub const DOCUMENTS_DIR: &str = "/fs/local/Documents/";
pub const TRASH_DIR: &str = "/fs/trash/";
pub const TEMP_DIR: &str = "/fs/tmp/";
pub const DEFAULT_PROJECT_DIR: &str = "/fs/local/default project/";

/// Created on every start, in order. Parents come before children.
pub const APP_DIRS: [&str; 9] = [
    ROOT_DIR,
    APP_SUPPORT_DIR,
    EXTENSIONS_DIR,
    "/fs/app/extensions/user/",
    "/fs/app/extensions/dev/",
    LOCAL_DIR,
    DOCUMENTS_DIR,
    TRASH_DIR,
    TEMP_DIR,
];

const SAMPLE_HTML: &str = r#"<!DOCTYPE html>
<html>
    <head>
        <title>Default project</title>
    </head>
    <body>
        <h1>Welcome to mntfs</h1>
        <p>Files here live in the virtual filesystem. Mount a folder from
        your machine to work on it under /mnt.</p>
    </body>
</html>
"#;

/// The process-wide slot other code reaches the filesystem through.
#[derive(Default)]
pub struct GlobalBindings {
    router: RwLock<Option<Arc<PathRouter>>>,
}

impl fmt::Debug for GlobalBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalBindings")
            .field("bound", &self.current().is_some())
            .finish()
    }
}

impl GlobalBindings {
    /// The bindings shared by the whole process.
    pub fn global() -> Arc<GlobalBindings> {
        static GLOBAL: OnceLock<Arc<GlobalBindings>> = OnceLock::new();
        GLOBAL.get_or_init(Arc::default).clone()
    }

    pub fn current(&self) -> Option<Arc<PathRouter>> {
        self.router
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bind `router`, returning whatever was bound before.
    pub fn replace(&self, router: Arc<PathRouter>) -> Option<Arc<PathRouter>> {
        self.router
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(router)
    }

    pub fn clear(&self) -> Option<Arc<PathRouter>> {
        self.router
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn is_bound_to(&self, router: &Arc<PathRouter>) -> bool {
        self.current().is_some_and(|r| Arc::ptr_eq(&r, router))
    }
}

/// Puts the authoritative router back whenever something else replaces or
/// clears the global slot.
///
/// The slot holds the router strongly, so the binding lives as long as the
/// guard. Dropping the guard stops it and clears the slot if it still points
/// at this router. The task also stops on its own once the router has been
/// released everywhere, which can only happen after a foreign replacement.
#[derive(Debug)]
pub struct BindingGuard {
    task: JoinHandle<()>,
    bindings: Arc<GlobalBindings>,
    authoritative: Weak<PathRouter>,
}

impl BindingGuard {
    pub fn spawn(bindings: Arc<GlobalBindings>, router: &Arc<PathRouter>, every: Duration) -> Self {
        let authoritative = Arc::downgrade(router);
        Self {
            task: tokio::spawn(guard(bindings.clone(), authoritative.clone(), every)),
            bindings,
            authoritative,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        self.task.abort();
        if let Some(router) = self.authoritative.upgrade()
            && self.bindings.is_bound_to(&router)
        {
            self.bindings.clear();
        }
    }
}

async fn guard(bindings: Arc<GlobalBindings>, authoritative: Weak<PathRouter>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(router) = authoritative.upgrade() else {
            break;
        };
        if !bindings.is_bound_to(&router) {
            tracing::warn!("Global filesystem binding was replaced, restoring it");
            bindings.replace(router);
        }
    }
}

/// What a bootstrap run did.
#[derive(Debug)]
pub struct Boot {
    /// The default project did not exist yet.
    pub first_boot: bool,
    /// Directories and files created by this run.
    pub created: Vec<String>,
    pub guard: BindingGuard,
}

pub struct Bootstrapper;

impl Bootstrapper {
    /// Bind `ctx` into the process-wide slot and prepare the app directories.
    pub async fn run(ctx: &FsContext) -> FsResult<Boot> {
        Self::run_with(ctx, GlobalBindings::global()).await
    }

    pub async fn run_with(ctx: &FsContext, bindings: Arc<GlobalBindings>) -> FsResult<Boot> {
        let router = ctx.router();
        Self::verify(router).await?;

        if let Some(previous) = bindings.replace(router.clone())
            && !Arc::ptr_eq(&previous, router)
        {
            tracing::debug!("Replacing previously bound filesystem");
        }
        let guard = BindingGuard::spawn(bindings, router, ctx.config().guard_interval());

        let mut created = Vec::new();
        for dir in APP_DIRS {
            if ensure_dir(router, dir).await? {
                created.push(dir.to_string());
            }
        }

        let first_boot = !router.exists(DEFAULT_PROJECT_DIR).await;
        if first_boot && ctx.config().create_default_project {
            let index = format!("{DEFAULT_PROJECT_DIR}index.html");
            ensure_dir(router, DEFAULT_PROJECT_DIR).await?;
            created.push(DEFAULT_PROJECT_DIR.to_string());
            if !router.exists(&index).await {
                router.write_text(&index, SAMPLE_HTML, None).await?;
                created.push(index);
            }
        }

        tracing::info!(first_boot, created = created.len(), "Filesystem bootstrapped");
        Ok(Boot {
            first_boot,
            created,
            guard,
        })
    }

    /// Fail fast if the virtual backend is unusable.
    async fn verify(router: &PathRouter) -> FsResult<()> {
        match router.stat("/").await {
            Ok(stat) if stat.is_directory() => Ok(()),
            Ok(_) => Err(FsError::with_message(
                ErrorCode::FilesystemState,
                "virtual root is not a directory",
            )),
            Err(err) => Err(FsError::with_message(
                ErrorCode::FilesystemState,
                format!("filesystem is not available: {err}"),
            )),
        }
    }
}

/// `mkdir` that tolerates an existing directory. True if it created one.
async fn ensure_dir(router: &PathRouter, dir: &str) -> FsResult<bool> {
    match router.mkdir(dir).await {
        Ok(()) => Ok(true),
        Err(err) if err.is(ErrorCode::AlreadyExists) => {
            if router.stat(dir).await?.is_directory() {
                Ok(false)
            } else {
                Err(FsError::not_a_directory("a file is in the way").at(dir))
            }
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::config::VfsConfig;
    use crate::context::ContextDeps;
    use crate::native::MemoryProvider;
    use crate::vfs::FilesystemBackend;
    use mntfs_types::path;

    async fn context(dir: &std::path::Path) -> FsContext {
        let config = VfsConfig {
            guard_interval_ms: 10,
            ..VfsConfig::ephemeral(dir)
        };
        let deps = ContextDeps::new(Arc::new(MemoryProvider::new()), Arc::new(LocalBus::default()));
        FsContext::open(config, deps).await.unwrap()
    }

    #[tokio::test]
    async fn creates_app_dirs_and_default_project() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let boot = Bootstrapper::run_with(&ctx, Arc::default()).await.unwrap();

        assert!(boot.first_boot);
        for d in APP_DIRS {
            assert!(ctx.router().stat(d).await.unwrap().is_directory(), "{d}");
        }
        let html = ctx
            .router()
            .read_file("/fs/local/default project/index.html", None)
            .await
            .unwrap();
        assert!(html.contains("<h1>"));
    }

    #[tokio::test]
    async fn fresh_disk_backend_gets_every_app_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = VfsConfig {
            virtual_backend: crate::config::VirtualBackendKind::Disk,
            ..VfsConfig::ephemeral(dir.path())
        };
        let deps = ContextDeps::new(Arc::new(MemoryProvider::new()), Arc::new(LocalBus::default()));
        let ctx = FsContext::open(config, deps).await.unwrap();

        let boot = Bootstrapper::run_with(&ctx, Arc::default()).await.unwrap();
        assert!(boot.first_boot);
        assert_eq!(boot.created.len(), APP_DIRS.len() + 2);
        for d in APP_DIRS {
            let host = dir.path().join("root").join(d.trim_matches('/'));
            assert!(host.is_dir(), "{}", host.display());
        }
        assert!(dir.path().join("root/fs/local/default project/index.html").is_file());
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let bindings: Arc<GlobalBindings> = Arc::default();
        Bootstrapper::run_with(&ctx, bindings.clone()).await.unwrap();

        let again = Bootstrapper::run_with(&ctx, bindings).await.unwrap();
        assert!(!again.first_boot);
        assert!(again.created.is_empty());
    }

    #[tokio::test]
    async fn default_project_can_be_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = VfsConfig {
            create_default_project: false,
            ..VfsConfig::ephemeral(dir.path())
        };
        let deps = ContextDeps::new(Arc::new(MemoryProvider::new()), Arc::new(LocalBus::default()));
        let ctx = FsContext::open(config, deps).await.unwrap();

        let boot = Bootstrapper::run_with(&ctx, Arc::default()).await.unwrap();
        assert!(boot.first_boot);
        assert!(!ctx.router().exists(DEFAULT_PROJECT_DIR).await);
    }

    #[rstest::rstest]
    #[case("/fs")]
    #[case("/fs/app/extensions")]
    #[case("/fs/tmp")]
    #[tokio::test]
    async fn a_file_in_the_way_fails(#[case] blocker: &str) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        ctx.router().mkdirs(&path::dirname(blocker)).await.unwrap();
        ctx.router().write_file(blocker, b"not a dir").await.unwrap();
        let err = Bootstrapper::run_with(&ctx, Arc::default()).await.unwrap_err();
        assert!(err.is(ErrorCode::NotADirectory), "{err}");
    }

    #[tokio::test]
    async fn binds_the_router() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let bindings: Arc<GlobalBindings> = Arc::default();
        let _boot = Bootstrapper::run_with(&ctx, bindings.clone()).await.unwrap();
        assert!(bindings.is_bound_to(ctx.router()));
    }

    #[tokio::test]
    async fn dropping_the_boot_releases_the_binding() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let bindings: Arc<GlobalBindings> = Arc::default();
        let boot = Bootstrapper::run_with(&ctx, bindings.clone()).await.unwrap();
        let router = Arc::downgrade(ctx.router());

        drop(boot);
        assert!(bindings.current().is_none());
        drop(ctx);
        assert!(router.upgrade().is_none());
    }

    #[tokio::test]
    async fn dropping_a_guard_leaves_a_foreign_binding_alone() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let other = context(dir.path()).await;
        let bindings: Arc<GlobalBindings> = Arc::default();

        let guard = BindingGuard::spawn(bindings.clone(), ctx.router(), Duration::from_secs(60));
        bindings.replace(other.router().clone());
        drop(guard);
        assert!(bindings.is_bound_to(other.router()));
    }

    #[tokio::test]
    async fn guard_reverts_foreign_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let other = context(dir.path()).await;
        let bindings: Arc<GlobalBindings> = Arc::default();
        bindings.replace(ctx.router().clone());

        let guard = BindingGuard::spawn(bindings.clone(), ctx.router(), Duration::from_millis(5));
        bindings.replace(other.router().clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(bindings.is_bound_to(ctx.router()));

        bindings.clear();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(bindings.is_bound_to(ctx.router()));
        assert!(guard.is_running());
    }

    #[tokio::test]
    async fn guard_stops_when_router_is_gone() {
        let bindings: Arc<GlobalBindings> = Arc::default();
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let router = ctx.router().clone();
        let guard = BindingGuard::spawn(bindings.clone(), &router, Duration::from_millis(5));
        drop(router);
        drop(ctx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!guard.is_running());
        assert!(bindings.current().is_none());
    }

    /// A virtual backend whose storage never came up.
    struct Unavailable;

    #[async_trait::async_trait]
    impl FilesystemBackend for Unavailable {
        fn name(&self) -> &str {
            "unavailable"
        }
        async fn readdir(&self, _: &str) -> FsResult<Vec<String>> {
            Err(FsError::io("storage offline"))
        }
        async fn stat(&self, _: &str) -> FsResult<mntfs_types::Stat> {
            Err(FsError::io("storage offline"))
        }
        async fn read(&self, _: &str) -> FsResult<Vec<u8>> {
            Err(FsError::io("storage offline"))
        }
        async fn write(&self, _: &str, _: &[u8]) -> FsResult<()> {
            Err(FsError::io("storage offline"))
        }
        async fn mkdir(&self, _: &str) -> FsResult<()> {
            Err(FsError::io("storage offline"))
        }
        async fn rename(&self, _: &str, _: &str) -> FsResult<()> {
            Err(FsError::io("storage offline"))
        }
        async fn unlink(&self, _: &str) -> FsResult<()> {
            Err(FsError::io("storage offline"))
        }
    }

    #[tokio::test]
    async fn unavailable_virtual_backend_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let deps = ContextDeps::new(Arc::new(MemoryProvider::new()), Arc::new(LocalBus::default()))
            .with_virtual_fs(Arc::new(Unavailable));
        let ctx = FsContext::open(VfsConfig::ephemeral(dir.path()), deps).await.unwrap();
        let bindings: Arc<GlobalBindings> = Arc::default();

        let err = Bootstrapper::run_with(&ctx, bindings.clone()).await.unwrap_err();
        assert!(err.is(ErrorCode::FilesystemState));
        assert!(err.message().contains("storage offline"));
        assert!(bindings.current().is_none());
    }
}
