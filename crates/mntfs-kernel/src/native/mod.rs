//! Capability handles for user-granted host directories.
//!
//! - [`provider`]: the handle and provider traits
//! - [`LocalProvider`]: real host directories
//! - [`MemoryProvider`]: an in-memory tree with scripted permission answers
//! - [`NativeBackend`]: filesystem operations over mounted handles

mod backend;
mod local;
mod memory;
pub mod provider;

pub use backend::NativeBackend;
pub use local::{LocalDirectory, LocalFile, LocalProvider, PermissionPolicy};
pub use memory::{MemoryDirectory, MemoryFile, MemoryProvider};
pub use provider::{
    FileMetadata, HandleRecord, NativeDirectory, NativeDirectoryProvider, NativeEntry,
    NativeFile, PermissionMode, PermissionState,
};
