//! Virtual filesystem backends.
//!
//! The virtual namespace is everything outside `/mnt`. It is served by one
//! of two engines:
//!
//! - **MemoryFs**: in-memory, ephemeral (tests, throwaway sessions)
//! - **DiskFs**: a sandboxed directory on the host
//!
//! Native mounts implement the same [`FilesystemBackend`] trait so the
//! router can treat both sides uniformly.

mod disk;
mod memory;
mod traits;

pub use disk::DiskFs;
pub use memory::MemoryFs;
pub use traits::FilesystemBackend;
