//! On-disk locations for mntfs state.

pub mod paths;
