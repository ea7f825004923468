//! Single-segment wildcard matching.
//!
//! `*` and `?` never match `/`; callers split paths into segments first.

/// True if `s` contains a glob metacharacter.
///
/// ```
/// use mntfs_glob::contains_glob;
/// assert!(contains_glob("*.rs"));
/// assert!(contains_glob("{a,b}"));
/// assert!(!contains_glob("node_modules"));
/// ```
pub fn contains_glob(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

/// Match one path segment against a wildcard pattern.
///
/// Uses the classic two-pointer algorithm with a single backtrack point for
/// the most recent `*`, so matching is linear in practice and never recurses.
///
/// ```
/// use mntfs_glob::wildcard_match;
/// assert!(wildcard_match("*.rs", "main.rs"));
/// assert!(wildcard_match("file[0-9].txt", "file7.txt"));
/// assert!(!wildcard_match("*.rs", "main.go"));
/// ```
pub fn wildcard_match(pattern: &str, input: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = input.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < text.len() {
        if pi < pat.len() {
            match pat[pi] {
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' if text[ti] != '/' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '[' => match match_class(&pat[pi..], text[ti]) {
                    Some((true, consumed)) => {
                        pi += consumed;
                        ti += 1;
                        continue;
                    }
                    // Unclosed bracket is a literal '['.
                    None if text[ti] == '[' => {
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                    _ => {}
                },
                '\\' if pi + 1 < pat.len() => {
                    if pat[pi + 1] == text[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c if c == text[ti] => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                _ => {}
            }
        }

        // Mismatch: let the last star swallow one more character.
        match star {
            Some((star_pi, star_ti)) if text[star_ti] != '/' => {
                pi = star_pi + 1;
                ti = star_ti + 1;
                star = Some((star_pi, star_ti + 1));
            }
            _ => return false,
        }
    }

    while pi < pat.len() && pat[pi] == '*' {
        pi += 1;
    }
    pi == pat.len()
}

/// Evaluate a `[...]` class at the start of `pat` against `ch`.
///
/// Returns `(matched, chars_consumed)`, or `None` when the class is unclosed.
fn match_class(pat: &[char], ch: char) -> Option<(bool, usize)> {
    let mut idx = 1;
    let negate = matches!(pat.get(idx), Some(&'!') | Some(&'^'));
    if negate {
        idx += 1;
    }

    let body_start = idx;
    let mut matched = false;
    loop {
        let c = *pat.get(idx)?;
        if c == ']' && idx > body_start {
            idx += 1;
            break;
        }
        if let (Some(&'-'), Some(&end)) = (pat.get(idx + 1), pat.get(idx + 2))
            && end != ']'
        {
            if (c..=end).contains(&ch) {
                matched = true;
            }
            idx += 3;
            continue;
        }
        if c == ch {
            matched = true;
        }
        idx += 1;
    }

    Some((matched != negate, idx))
}
