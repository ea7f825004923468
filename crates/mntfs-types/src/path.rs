//! POSIX path helpers.
//!
//! Paths in mntfs are always `/`-separated strings. Normalization collapses
//! repeated separators, resolves `.` and `..`, and keeps a trailing slash if
//! the input had one.

/// The root of the native mount namespace.
pub const MOUNT_ROOT: &str = "/mnt";

/// Prefix shared by every path inside a mount.
pub const MOUNT_PREFIX: &str = "/mnt/";

/// Normalize a path.
///
/// ```
/// use mntfs_types::path::normalize;
/// assert_eq!(normalize("/mnt//proj/./a/../b.txt"), "/mnt/proj/b.txt");
/// assert_eq!(normalize("/mnt/"), "/mnt/");
/// assert_eq!(normalize("/.."), "/");
/// assert_eq!(normalize(""), ".");
/// ```
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let absolute = path.starts_with('/');
    let trailing = path.ends_with('/');

    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match stack.last() {
                Some(&last) if last != ".." => {
                    stack.pop();
                }
                _ if absolute => {}
                _ => stack.push(".."),
            },
            other => stack.push(other),
        }
    }

    let mut out = String::with_capacity(path.len());
    if absolute {
        out.push('/');
    }
    out.push_str(&stack.join("/"));
    if out.is_empty() {
        return ".".to_string();
    }
    if trailing && !stack.is_empty() {
        out.push('/');
    }
    out
}

/// Strip trailing slashes, keeping a bare `/`.
pub fn trim_trailing_slash(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

/// The directory portion of `path`.
///
/// ```
/// use mntfs_types::path::dirname;
/// assert_eq!(dirname("/mnt/proj/a.txt"), "/mnt/proj");
/// assert_eq!(dirname("/mnt"), "/");
/// assert_eq!(dirname("a.txt"), ".");
/// ```
pub fn dirname(path: &str) -> String {
    let path = trim_trailing_slash(path);
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
        None => ".".to_string(),
    }
}

/// The final component of `path`, ignoring trailing slashes.
///
/// ```
/// use mntfs_types::path::basename;
/// assert_eq!(basename("/mnt/proj/a.txt"), "a.txt");
/// assert_eq!(basename("/mnt/proj/"), "proj");
/// assert_eq!(basename("/"), "");
/// ```
pub fn basename(path: &str) -> &str {
    let path = trim_trailing_slash(path);
    if path == "/" {
        return "";
    }
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Join path parts and normalize the result.
pub fn join<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = parts
        .into_iter()
        .map(|p| p.as_ref().to_string())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    normalize(&joined)
}

/// Non-empty components of a normalized path.
///
/// ```
/// use mntfs_types::path::segments;
/// assert_eq!(segments("/mnt/proj/a/"), vec!["mnt", "proj", "a"]);
/// ```
pub fn segments(path: &str) -> Vec<String> {
    normalize(path)
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(str::to_string)
        .collect()
}

pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// True for `/mnt` and `/mnt/` (after normalization).
pub fn is_mount_root(path: &str) -> bool {
    let path = normalize(path);
    path == MOUNT_ROOT || path == MOUNT_PREFIX
}

/// True for `/mnt`, `/mnt/` and anything beneath them.
pub fn is_mount_path(path: &str) -> bool {
    let path = normalize(path);
    path == MOUNT_ROOT || path.starts_with(MOUNT_PREFIX)
}

/// True only for paths strictly inside a mount, e.g. `/mnt/proj` or deeper.
pub fn is_mount_sub_path(path: &str) -> bool {
    let path = normalize(path);
    path.len() > MOUNT_PREFIX.len() && path.starts_with(MOUNT_PREFIX)
}

/// Split a normalized mount path into `(mount_name, rest)`.
///
/// `rest` holds the components below the mount root.
///
/// ```
/// use mntfs_types::path::split_mount_path;
/// let (name, rest) = split_mount_path("/mnt/proj/src/lib.rs").unwrap();
/// assert_eq!(name, "proj");
/// assert_eq!(rest, vec!["src", "lib.rs"]);
/// assert!(split_mount_path("/fs/local").is_none());
/// ```
pub fn split_mount_path(path: &str) -> Option<(String, Vec<String>)> {
    if !is_mount_sub_path(path) {
        return None;
    }
    let mut parts = segments(path).into_iter();
    match (parts.next().as_deref(), parts.next()) {
        (Some("mnt"), Some(name)) => Some((name, parts.collect())),
        _ => None,
    }
}

/// The `/mnt/<name>` path for a mount name.
pub fn mount_path(name: &str) -> String {
    format!("{MOUNT_PREFIX}{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("/", "/")]
    #[case("//", "/")]
    #[case("/mnt", "/mnt")]
    #[case("/mnt/", "/mnt/")]
    #[case("/mnt/proj/../other", "/mnt/other")]
    #[case("/a/./b//c/", "/a/b/c/")]
    #[case("a/../..", "..")]
    #[case("./a", "a")]
    #[case(".", ".")]
    #[case("/../../x", "/x")]
    fn normalize_cases(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input), expected);
    }

    #[rstest]
    #[case("/mnt", true, true, false)]
    #[case("/mnt/", true, true, false)]
    #[case("/mnt/proj", false, true, true)]
    #[case("/mnt/proj/a.txt", false, true, true)]
    #[case("/mntx", false, false, false)]
    #[case("/fs/local", false, false, false)]
    #[case("/mnt//", true, true, false)]
    #[case("/mnt/proj/..", true, true, false)]
    #[case("/fs/../mnt/proj", false, true, true)]
    fn mount_predicates(
        #[case] path: &str,
        #[case] root: bool,
        #[case] mount: bool,
        #[case] sub: bool,
    ) {
        assert_eq!(is_mount_root(path), root);
        assert_eq!(is_mount_path(path), mount);
        assert_eq!(is_mount_sub_path(path), sub);
    }

    #[test]
    fn join_normalizes() {
        assert_eq!(join(["/mnt", "proj", "a.txt"]), "/mnt/proj/a.txt");
        assert_eq!(join(["/mnt/", "/proj/"]), "/mnt/proj/");
        assert_eq!(join(["", "x"]), "x");
    }

    #[test]
    fn mount_path_round_trips() {
        let path = mount_path("proj_0");
        assert_eq!(path, "/mnt/proj_0");
        let (name, rest) = split_mount_path(&path).unwrap();
        assert_eq!(name, "proj_0");
        assert!(rest.is_empty());
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(path in "[/a-z.]{0,24}") {
            let once = normalize(&path);
            prop_assert_eq!(normalize(&once), once.clone());
        }

        #[test]
        fn normalized_absolute_has_no_dots(path in "/[/a-z.]{0,24}") {
            let norm = normalize(&path);
            prop_assert!(norm.starts_with('/'));
            prop_assert!(!norm.contains("//"));
            for c in segments(&norm) {
                prop_assert!(c != "." && c != "..");
            }
        }

        #[test]
        fn any_named_child_of_mnt_is_sub_path(name in "[A-Za-z0-9 _-]{1,16}", rest in "(/[a-z]{1,4}){0,3}") {
            let path = format!("/mnt/{name}{rest}");
            prop_assert!(is_mount_sub_path(&path));
            prop_assert!(is_mount_path(&path));
            prop_assert!(!is_mount_root(&path));
        }

        #[test]
        fn paths_outside_mnt_are_virtual(path in "/(fs|tmp|home)(/[a-z]{1,6}){0,4}") {
            prop_assert!(!is_mount_path(&path));
            prop_assert!(!is_mount_sub_path(&path));
        }

        #[test]
        fn dirname_and_basename_rebuild(parts in proptest::collection::vec("[a-z]{1,6}", 1..5)) {
            let path = format!("/{}", parts.join("/"));
            let rebuilt = join([dirname(&path).as_str(), basename(&path)]);
            prop_assert_eq!(rebuilt, path);
        }
    }
}
