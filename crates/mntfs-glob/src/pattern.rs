//! Path-aware glob patterns.

use crate::PatternError;
use crate::wildcard::wildcard_match;

/// Expand `{a,b}` alternations into every concrete pattern.
///
/// ```
/// use mntfs_glob::expand_braces;
/// assert_eq!(expand_braces("*.{js,ts}").unwrap(), vec!["*.js", "*.ts"]);
/// assert_eq!(expand_braces("plain").unwrap(), vec!["plain"]);
/// ```
pub fn expand_braces(pattern: &str) -> Result<Vec<String>, PatternError> {
    let chars: Vec<char> = pattern.chars().collect();

    let mut open = None;
    let mut depth = 0usize;
    let mut idx = 0;
    while idx < chars.len() {
        match chars[idx] {
            '\\' => idx += 1,
            '{' => {
                if depth == 0 {
                    open = Some(idx);
                }
                depth += 1;
            }
            '}' => {
                if depth == 0 {
                    return Err(PatternError::UnbalancedBrace(pattern.to_string()));
                }
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            _ => {}
        }
        idx += 1;
    }

    let start = match open {
        None => return Ok(vec![pattern.to_string()]),
        Some(_) if depth != 0 => {
            return Err(PatternError::UnbalancedBrace(pattern.to_string()));
        }
        Some(start) => start,
    };
    let end = idx;

    let prefix: String = chars[..start].iter().collect();
    let suffix: String = chars[end + 1..].iter().collect();

    let mut expanded = Vec::new();
    for alternative in split_alternatives(&chars[start + 1..end]) {
        expanded.extend(expand_braces(&format!("{prefix}{alternative}{suffix}"))?);
    }
    Ok(expanded)
}

/// Split brace contents on top-level commas.
fn split_alternatives(body: &[char]) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut escaped = false;

    for &c in body {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                current.push(c);
            }
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `**`: zero or more whole segments.
    AnyDepth,
    Wild(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Alternative {
    /// No `/` in the pattern: matches any single path component.
    Component(String),
    Anchored(Vec<Segment>),
}

/// A compiled glob that matches `/`-separated paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathGlob {
    source: String,
    alternatives: Vec<Alternative>,
}

impl PathGlob {
    /// Compile a pattern.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        if pattern.trim().is_empty() {
            return Err(PatternError::Empty);
        }

        let alternatives = expand_braces(pattern)?
            .into_iter()
            .map(|expanded| compile_alternative(&expanded))
            .collect();

        Ok(Self {
            source: pattern.to_string(),
            alternatives,
        })
    }

    /// The pattern text this glob was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True if `path` matches this glob.
    pub fn is_match(&self, path: &str) -> bool {
        let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.alternatives.iter().any(|alt| match alt {
            Alternative::Component(pattern) => {
                components.iter().any(|c| wildcard_match(pattern, c))
            }
            Alternative::Anchored(segments) => match_segments(segments, &components),
        })
    }
}

fn compile_alternative(pattern: &str) -> Alternative {
    if !pattern.contains('/') && pattern != "**" {
        return Alternative::Component(pattern.to_string());
    }

    let mut segments: Vec<Segment> = Vec::new();
    for part in pattern.trim_start_matches('/').split('/') {
        if part.is_empty() {
            continue;
        }
        let segment = if part == "**" {
            Segment::AnyDepth
        } else {
            Segment::Wild(part.to_string())
        };
        if segment == Segment::AnyDepth && segments.last() == Some(&Segment::AnyDepth) {
            continue;
        }
        segments.push(segment);
    }

    // `dir/` means everything beneath `dir`.
    if pattern.ends_with('/') && segments.last() != Some(&Segment::AnyDepth) {
        segments.push(Segment::AnyDepth);
    }

    Alternative::Anchored(segments)
}

fn match_segments(segments: &[Segment], components: &[&str]) -> bool {
    match segments.split_first() {
        None => components.is_empty(),
        Some((Segment::AnyDepth, rest)) => {
            (0..=components.len()).any(|skip| match_segments(rest, &components[skip..]))
        }
        Some((Segment::Wild(pattern), rest)) => match components.split_first() {
            Some((head, tail)) => wildcard_match(pattern, head) && match_segments(rest, tail),
            None => false,
        },
    }
}
