//! mntfs-kernel: the virtual filesystem core of mntfs.
//!
//! One path-addressed filesystem over two kinds of storage:
//!
//! - **Virtual**: an app-private namespace (`/fs/...` and everything else)
//!   held in memory or in a sandboxed host directory
//! - **Native mounts**: user-granted directories under `/mnt/<name>`,
//!   reached through capability handles that must be permitted before use
//!
//! Layers, leaf first:
//!
//! - **vfs**: the `FilesystemBackend` trait and the virtual backends
//! - **native**: capability handles (`NativeDirectory`) and `NativeBackend`
//! - **mount**: durable mount store and the `MountRegistry`
//! - **bus**: cross-context pub/sub (`ContextTransport`)
//! - **watch**: path-scoped watchers with ignore globs
//! - **router**: `PathRouter`, the single entry point
//! - **context**: `FsContext`, one open window/process
//! - **bootstrap**: global bindings, their guard, and app directories

pub mod bootstrap;
pub mod bus;
pub mod config;
pub mod context;
pub mod mount;
pub mod native;
pub mod router;
pub mod state;
pub mod vfs;
pub mod watch;

pub use bootstrap::{Boot, BindingGuard, Bootstrapper, GlobalBindings};
pub use bus::{BusEndpoint, ContextId, ContextMessage, ContextTransport, Envelope, LocalBus};
pub use config::{VfsConfig, VirtualBackendKind};
pub use context::{ContextDeps, FsContext};
pub use mount::{MountPointStore, MountRegistry};
pub use native::{
    LocalProvider, MemoryProvider, NativeBackend, NativeDirectory, NativeDirectoryProvider,
    NativeEntry, NativeFile, PermissionMode, PermissionPolicy, PermissionState,
};
pub use router::{PathRouter, Route};
pub use vfs::{DiskFs, FilesystemBackend, MemoryFs};
pub use watch::{WatchCallback, WatchId, WatchService};

pub use mntfs_types::{
    ChangeEvent, ChangeKind, Encoding, ErrorCode, FileKind, FsError, FsResult, Stat, path,
};
