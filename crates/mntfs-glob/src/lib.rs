//! mntfs-glob: glob matching for watcher ignore lists.
//!
//! Provides:
//! - **wildcard_match**: single-segment matching (`*`, `?`, `[a-z]`, `[!x]`, `\` escapes)
//! - **expand_braces**: `{a,b}` alternation, nested braces supported
//! - **PathGlob**: `/`-aware patterns where `**` spans any number of segments
//! - **IgnoreList**: an ordered list of `PathGlob`s, compiled once per watch
//!
//! Patterns without a `/` are matched against the final path component, so
//! `*.log` ignores `/mnt/proj/build/out.log`. Patterns containing a `/` must
//! match the whole path (leading `/` optional).

mod ignore;
mod pattern;
mod wildcard;

pub use ignore::IgnoreList;
pub use pattern::{PathGlob, expand_braces};
pub use wildcard::{contains_glob, wildcard_match};

use thiserror::Error;

/// Errors produced while compiling a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("empty glob pattern")]
    Empty,
    #[error("unbalanced brace in pattern: {0}")]
    UnbalancedBrace(String),
}
