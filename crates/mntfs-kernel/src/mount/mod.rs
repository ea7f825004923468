//! Native mounts under `/mnt`.
//!
//! ```text
//! /mnt                 # lists mount names
//! ├── /mnt/proj/       # user-granted directory
//! └── /mnt/proj_0/     # another directory whose name was taken
//! ```
//!
//! The [`MountPointStore`] persists name → handle records; the
//! [`MountRegistry`] owns mounting, dedupe, and path resolution.

mod registry;
mod store;

pub use registry::{verify_permission, MountRegistry};
pub use store::{allocate_mount_name, Claim, MountMap, MountPointStore, MOUNT_POINTS_KEY};
