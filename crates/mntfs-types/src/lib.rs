//! mntfs-types: shared data types for mntfs.
//!
//! Everything here is plain data with no I/O:
//!
//! - **error**: the closed errno taxonomy (`ErrorCode`) and `FsError`
//! - **path**: POSIX path normalization and the `/mnt` namespace predicates
//! - **stat**: backend-agnostic `Stat`
//! - **event**: `ChangeEvent` as delivered to watchers and other contexts
//! - **encoding**: text encodings accepted by `read_file` / `write_text`

pub mod encoding;
pub mod error;
pub mod event;
pub mod path;
pub mod stat;

pub use encoding::Encoding;
pub use error::{ErrorCode, FsError, FsResult};
pub use event::{ChangeEvent, ChangeKind};
pub use stat::{FileKind, Stat};
