//! Single entry point for filesystem calls.
//!
//! Paths under `/mnt` go to the native backend; everything else goes to the
//! virtual backend. Every successful mutation reports a change event before
//! the call returns.

use std::fmt;
use std::sync::Arc;

use mntfs_types::{path, Encoding, ErrorCode, FsError, FsResult, Stat};

use crate::mount::MountRegistry;
use crate::native::{NativeBackend, NativeDirectory};
use crate::vfs::FilesystemBackend;
use crate::watch::{WatchCallback, WatchId, WatchService};

/// Which backend owns a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Native,
    Virtual,
}

impl Route {
    pub fn of(p: &str) -> Self {
        if path::is_mount_path(p) {
            Route::Native
        } else {
            Route::Virtual
        }
    }
}

pub struct PathRouter {
    registry: Arc<MountRegistry>,
    native: NativeBackend,
    virtual_fs: Arc<dyn FilesystemBackend>,
    watch: Arc<WatchService>,
    default_encoding: Encoding,
}

impl fmt::Debug for PathRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathRouter")
            .field("virtual", &self.virtual_fs.name())
            .field("mounts", &self.registry.mount_names())
            .field("default_encoding", &self.default_encoding)
            .finish()
    }
}

/// Normalize and require an absolute path.
fn absolute(p: &str) -> FsResult<String> {
    if !path::is_absolute(p) {
        return Err(FsError::invalid("path must be absolute").at(p));
    }
    Ok(path::trim_trailing_slash(&path::normalize(p)).to_string())
}

impl PathRouter {
    pub fn new(
        registry: Arc<MountRegistry>,
        virtual_fs: Arc<dyn FilesystemBackend>,
        watch: Arc<WatchService>,
        default_encoding: Encoding,
    ) -> Self {
        Self {
            native: NativeBackend::new(registry.clone()),
            registry,
            virtual_fs,
            watch,
            default_encoding,
        }
    }

    pub fn registry(&self) -> &Arc<MountRegistry> {
        &self.registry
    }

    pub fn watch_service(&self) -> &Arc<WatchService> {
        &self.watch
    }

    pub fn default_encoding(&self) -> Encoding {
        self.default_encoding
    }

    fn backend(&self, route: Route) -> &dyn FilesystemBackend {
        match route {
            Route::Native => &self.native,
            Route::Virtual => self.virtual_fs.as_ref(),
        }
    }

    /// Normalize `p` and pick its backend.
    fn dispatch(&self, op: &str, p: &str) -> FsResult<(&dyn FilesystemBackend, String)> {
        let normalized = absolute(p)?;
        let backend = self.backend(Route::of(&normalized));
        tracing::debug!(op, path = %normalized, backend = backend.name(), "Routing");
        Ok((backend, normalized))
    }

    pub async fn readdir(&self, p: &str) -> FsResult<Vec<String>> {
        let (backend, p) = self.dispatch("readdir", p)?;
        backend.readdir(&p).await
    }

    pub async fn stat(&self, p: &str) -> FsResult<Stat> {
        let (backend, p) = self.dispatch("stat", p)?;
        backend.stat(&p).await
    }

    pub async fn exists(&self, p: &str) -> bool {
        match self.dispatch("exists", p) {
            Ok((backend, p)) => backend.exists(&p).await,
            Err(_) => false,
        }
    }

    /// Read and decode a file; `None` uses the configured default encoding.
    pub async fn read_file(&self, p: &str, encoding: Option<Encoding>) -> FsResult<String> {
        let bytes = self.read_file_bytes(p).await?;
        Ok(encoding.unwrap_or(self.default_encoding).decode(&bytes))
    }

    pub async fn read_file_bytes(&self, p: &str) -> FsResult<Vec<u8>> {
        let (backend, p) = self.dispatch("read", p)?;
        backend.read(&p).await
    }

    /// Create or replace a file. Reports `changed` if it existed, else
    /// `created`.
    pub async fn write_file(&self, p: &str, data: &[u8]) -> FsResult<()> {
        let (backend, p) = self.dispatch("write", p)?;
        let existed = backend.exists(&p).await;
        backend.write(&p, data).await?;
        if existed {
            self.watch.report_change_event(&p);
        } else {
            self.watch.report_create_event(&p);
        }
        Ok(())
    }

    pub async fn write_text(&self, p: &str, text: &str, encoding: Option<Encoding>) -> FsResult<()> {
        let data = encoding.unwrap_or(self.default_encoding).encode(text);
        self.write_file(p, &data).await
    }

    pub async fn mkdir(&self, p: &str) -> FsResult<()> {
        let (backend, p) = self.dispatch("mkdir", p)?;
        backend.mkdir(&p).await?;
        self.watch.report_create_event(&p);
        Ok(())
    }

    /// `mkdir -p`: create every missing directory along `p`.
    ///
    /// Succeeds when the whole path already exists. Each directory actually
    /// created gets its own `created` event.
    pub async fn mkdirs(&self, p: &str) -> FsResult<()> {
        let target = absolute(p)?;
        let segments = path::segments(&target);

        let mut current = String::new();
        for segment in &segments {
            current.push('/');
            current.push_str(segment);

            match self.stat(&current).await {
                Ok(stat) if stat.is_directory() => continue,
                Ok(_) => {
                    return Err(FsError::not_a_directory("path component is a file").at(&current));
                }
                Err(err) if err.is(ErrorCode::NotFound) => {}
                Err(err) => return Err(err),
            }

            let backend = self.backend(Route::of(&current));
            match backend.mkdir(&current).await {
                Ok(()) => self.watch.report_create_event(&current),
                // Someone else made it between our stat and mkdir.
                Err(err) if err.is(ErrorCode::AlreadyExists) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Move a file or directory tree within one backend.
    pub async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        if path::is_mount_root(from) || path::is_mount_root(to) {
            return Err(FsError::not_permitted("the mount root cannot be renamed").at(from));
        }
        let (from_route, to_route) = (Route::of(from), Route::of(to));
        if from_route != to_route {
            return Err(FsError::cross_device("rename across backends").at(from));
        }

        let (backend, from) = self.dispatch("rename", from)?;
        let to = absolute(to)?;
        backend.rename(&from, &to).await?;
        self.watch.report_unlink_event(&from);
        self.watch.report_create_event(&to);
        Ok(())
    }

    pub async fn unlink(&self, p: &str) -> FsResult<()> {
        if path::is_mount_root(p) {
            return Err(FsError::not_permitted("the mount root cannot be removed").at(p));
        }
        let (backend, p) = self.dispatch("unlink", p)?;
        backend.unlink(&p).await?;
        self.watch.report_unlink_event(&p);
        Ok(())
    }

    /// Copy between (or within) native mounts.
    ///
    /// Anything touching the virtual backend fails `ENOSYS`.
    pub async fn copy(&self, src: &str, dst: &str) -> FsResult<()> {
        if !path::is_mount_sub_path(src) || !path::is_mount_sub_path(dst) {
            return Err(FsError::not_implemented("copy is only supported between mounted folders").at(src));
        }
        let src = absolute(src)?;
        let dst = absolute(dst)?;
        tracing::debug!(src = %src, dst = %dst, "Routing copy");
        let created = self.native.copy(&src, &dst).await?;
        self.watch.report_create_event(&created);
        Ok(())
    }

    pub fn watch<I, S>(&self, p: &str, ignore: I, callback: WatchCallback) -> FsResult<WatchId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.watch.watch(p, ignore, callback)
    }

    pub fn unwatch(&self, p: &str) -> usize {
        self.watch.unwatch(p)
    }

    pub fn unwatch_all(&self) {
        self.watch.unwatch_all()
    }

    pub async fn mount_native_folder(
        &self,
        handle: Option<Arc<dyn NativeDirectory>>,
    ) -> FsResult<String> {
        self.registry.mount_native_folder(handle).await
    }

    pub async fn unmount(&self, name: &str) -> FsResult<()> {
        self.registry.unmount(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusEndpoint, ContextId, LocalBus};
    use crate::mount::MountPointStore;
    use crate::native::{MemoryProvider, NativeDirectoryProvider};
    use crate::vfs::MemoryFs;
    use mntfs_types::{ChangeEvent, ChangeKind};
    use proptest::prelude::*;
    use rstest::rstest;
    use std::sync::Mutex;

    struct Fixture {
        router: PathRouter,
        provider: MemoryProvider,
        events: Arc<Mutex<Vec<ChangeEvent>>>,
    }

    impl Fixture {
        fn events(&self) -> Vec<(ChangeKind, String)> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| (e.kind, e.full_path.clone()))
                .collect()
        }

        fn clear(&self) {
            self.events.lock().unwrap().clear();
        }
    }

    async fn fixture() -> Fixture {
        let provider = MemoryProvider::new();
        provider.put_file("/home/u/proj/README", b"hello").unwrap();
        provider.create_dir_all("/home/u/proj/src").unwrap();

        let shared: Arc<dyn NativeDirectoryProvider> = Arc::new(provider.clone());
        let store = Arc::new(MountPointStore::in_memory(shared.clone()).unwrap());
        let bus = Arc::new(LocalBus::default());
        let endpoint = BusEndpoint::new(ContextId::next(), bus);
        let registry = Arc::new(MountRegistry::new(store, shared, endpoint.clone()));
        let watch = Arc::new(WatchService::new(endpoint));
        let router = PathRouter::new(registry, Arc::new(MemoryFs::new()), watch, Encoding::Utf8);

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let no_ignores: [&str; 0] = [];
        router
            .watch("/", no_ignores, Arc::new(move |ev: &ChangeEvent| {
                sink.lock().unwrap().push(ev.clone());
            }))
            .unwrap();

        Fixture {
            router,
            provider,
            events,
        }
    }

    async fn mount_proj(f: &Fixture) -> String {
        f.router
            .mount_native_folder(Some(f.provider.directory("/home/u/proj").unwrap()))
            .await
            .unwrap()
    }

    #[rstest]
    #[case("/mnt", Route::Native)]
    #[case("/mnt/proj/a", Route::Native)]
    #[case("/fs/local", Route::Virtual)]
    #[case("/mntx", Route::Virtual)]
    #[case("/", Route::Virtual)]
    fn routes_by_prefix(#[case] p: &str, #[case] expected: Route) {
        assert_eq!(Route::of(p), expected);
    }

    #[tokio::test]
    async fn mount_then_list_and_write() {
        let f = fixture().await;
        assert_eq!(mount_proj(&f).await, "/mnt/proj");
        assert_eq!(f.router.readdir("/mnt").await.unwrap(), vec!["proj"]);
        assert_eq!(f.router.readdir("/mnt/proj").await.unwrap(), vec!["README", "src"]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let no_ignores: [&str; 0] = [];
        f.router
            .watch("/mnt/proj", no_ignores, Arc::new(move |ev: &ChangeEvent| {
                sink.lock().unwrap().push(ev.clone());
            }))
            .unwrap();

        f.router.write_text("/mnt/proj/a.txt", "hi", None).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, ChangeKind::Created);
        assert_eq!(seen[0].parent_dir_path, "/mnt/proj/");
        assert_eq!(seen[0].entry_name, "a.txt");
        assert_eq!(seen[0].full_path, "/mnt/proj/a.txt");
        assert_eq!(f.router.read_file("/mnt/proj/a.txt", None).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn write_reports_created_then_changed() {
        let f = fixture().await;
        f.router.mkdir("/tmp").await.unwrap();
        f.clear();

        f.router.write_file("/tmp/x", b"1").await.unwrap();
        f.router.write_file("/tmp/x", b"2").await.unwrap();
        assert_eq!(
            f.events(),
            vec![
                (ChangeKind::Created, "/tmp/x".to_string()),
                (ChangeKind::Changed, "/tmp/x".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn read_file_honors_encoding() {
        let f = fixture().await;
        f.router.write_file("/blob", &[0xde, 0xad]).await.unwrap();
        assert_eq!(f.router.read_file("/blob", Some(Encoding::Hex)).await.unwrap(), "dead");
        assert_eq!(f.router.read_file_bytes("/blob").await.unwrap(), vec![0xde, 0xad]);
    }

    #[tokio::test]
    async fn relative_paths_are_rejected() {
        let f = fixture().await;
        let err = f.router.stat("fs/local").await.unwrap_err();
        assert!(err.is(ErrorCode::InvalidArgument));
        assert!(!f.router.exists("fs").await);
    }

    #[tokio::test]
    async fn mkdirs_from_nothing_partial_and_complete() {
        let f = fixture().await;
        f.router.mkdirs("/a/b/c").await.unwrap();
        assert_eq!(
            f.events(),
            vec![
                (ChangeKind::Created, "/a".to_string()),
                (ChangeKind::Created, "/a/b".to_string()),
                (ChangeKind::Created, "/a/b/c".to_string()),
            ]
        );

        f.clear();
        f.router.mkdirs("/a/b/c/d/").await.unwrap();
        assert_eq!(f.events(), vec![(ChangeKind::Created, "/a/b/c/d".to_string())]);

        f.clear();
        f.router.mkdirs("/a/b/c/d").await.unwrap();
        assert!(f.events().is_empty());
        assert!(f.router.stat("/a/b/c/d").await.unwrap().is_directory());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn mkdirs_creates_exactly_the_missing_prefixes(
            parts in prop::collection::vec("[a-c]{1,2}", 1..5),
            present in 0usize..5,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let f = fixture().await;
                let prefixes: Vec<String> = (1..=parts.len())
                    .map(|n| format!("/{}", parts[..n].join("/")))
                    .collect();
                let present = present.min(prefixes.len());
                for dir in &prefixes[..present] {
                    f.router.mkdir(dir).await.unwrap();
                }
                f.clear();

                f.router.mkdirs(&prefixes[prefixes.len() - 1]).await.unwrap();

                for dir in &prefixes {
                    assert!(f.router.stat(dir).await.unwrap().is_directory(), "{dir}");
                }
                let expected: Vec<_> = prefixes[present..]
                    .iter()
                    .map(|dir| (ChangeKind::Created, dir.clone()))
                    .collect();
                assert_eq!(f.events(), expected);
            });
        }
    }

    #[tokio::test]
    async fn mkdirs_inside_a_mount() {
        let f = fixture().await;
        mount_proj(&f).await;
        f.clear();

        f.router.mkdirs("/mnt/proj/src/deep/er").await.unwrap();
        assert_eq!(
            f.events(),
            vec![
                (ChangeKind::Created, "/mnt/proj/src/deep".to_string()),
                (ChangeKind::Created, "/mnt/proj/src/deep/er".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn mkdirs_through_a_file_is_enotdir() {
        let f = fixture().await;
        f.router.write_file("/f", b"").await.unwrap();
        let err = f.router.mkdirs("/f/sub").await.unwrap_err();
        assert!(err.is(ErrorCode::NotADirectory));
    }

    #[rstest]
    #[case("/mnt")]
    #[case("/mnt/")]
    #[tokio::test]
    async fn mount_root_is_protected(#[case] root: &str) {
        let f = fixture().await;
        mount_proj(&f).await;
        f.clear();

        assert!(f.router.unlink(root).await.unwrap_err().is(ErrorCode::NotPermitted));
        assert!(f
            .router
            .rename(root, "/elsewhere")
            .await
            .unwrap_err()
            .is(ErrorCode::NotPermitted));
        assert!(f
            .router
            .rename("/mnt/proj/README", root)
            .await
            .unwrap_err()
            .is(ErrorCode::NotPermitted));

        assert!(f.events().is_empty());
        assert_eq!(f.router.readdir("/mnt").await.unwrap(), vec!["proj"]);
        assert!(f.router.exists("/mnt/proj/README").await);
    }

    #[tokio::test]
    async fn rename_reports_both_paths() {
        let f = fixture().await;
        f.router.write_file("/old", b"x").await.unwrap();
        f.clear();

        f.router.rename("/old", "/new").await.unwrap();
        assert_eq!(
            f.events(),
            vec![
                (ChangeKind::Deleted, "/old".to_string()),
                (ChangeKind::Created, "/new".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn rename_across_backends_is_exdev() {
        let f = fixture().await;
        mount_proj(&f).await;
        let err = f.router.rename("/mnt/proj/README", "/README").await.unwrap_err();
        assert!(err.is(ErrorCode::CrossDevice));
        assert!(f.router.exists("/mnt/proj/README").await);
    }

    #[tokio::test]
    async fn unlink_reports_deleted() {
        let f = fixture().await;
        mount_proj(&f).await;
        f.clear();

        f.router.unlink("/mnt/proj/README").await.unwrap();
        assert_eq!(
            f.events(),
            vec![(ChangeKind::Deleted, "/mnt/proj/README".to_string())]
        );
        assert!(!f.router.exists("/mnt/proj/README").await);
    }

    #[tokio::test]
    async fn failed_mutation_reports_nothing() {
        let f = fixture().await;
        assert!(f.router.write_file("/missing/x", b"").await.is_err());
        assert!(f.router.unlink("/nope").await.is_err());
        assert!(f.events().is_empty());
    }

    #[tokio::test]
    async fn copy_outside_mounts_is_enosys() {
        let f = fixture().await;
        mount_proj(&f).await;
        f.router.write_file("/x", b"").await.unwrap();

        for (src, dst) in [("/x", "/y"), ("/x", "/mnt/proj/x"), ("/mnt/proj/README", "/y")] {
            let err = f.router.copy(src, dst).await.unwrap_err();
            assert!(err.is(ErrorCode::NotImplemented), "{src} -> {dst}");
        }
    }

    #[tokio::test]
    async fn copy_into_directory_reports_created() {
        let f = fixture().await;
        mount_proj(&f).await;
        f.clear();

        f.router.copy("/mnt/proj/README", "/mnt/proj/src").await.unwrap();
        assert_eq!(
            f.events(),
            vec![(ChangeKind::Created, "/mnt/proj/src/README".to_string())]
        );
        assert_eq!(f.router.read_file("/mnt/proj/src/README", None).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn ignored_paths_do_not_reach_the_watcher() {
        let f = fixture().await;
        f.router.unwatch_all();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        f.router
            .watch("/", ["*.tmp"], Arc::new(move |ev: &ChangeEvent| {
                sink.lock().unwrap().push(ev.full_path.clone());
            }))
            .unwrap();

        f.router.write_file("/a.tmp", b"").await.unwrap();
        f.router.write_file("/a.txt", b"").await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["/a.txt".to_string()]);
    }
}
