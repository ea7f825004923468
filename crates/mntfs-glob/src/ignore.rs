//! Ordered ignore lists.

use crate::PatternError;
use crate::pattern::PathGlob;

/// An ordered list of compiled ignore globs.
///
/// A path is ignored when any glob in the list matches it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreList {
    globs: Vec<PathGlob>,
}

impl IgnoreList {
    /// Compile every pattern, failing on the first invalid one.
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let globs = patterns
            .into_iter()
            .map(|p| PathGlob::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { globs })
    }

    /// True if `path` matches any pattern.
    pub fn is_ignored(&self, path: &str) -> bool {
        self.globs.iter().any(|g| g.is_match(path))
    }

    pub fn is_empty(&self) -> bool {
        self.globs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.globs.len()
    }

    /// The source patterns, in registration order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.globs.iter().map(PathGlob::as_str)
    }
}
