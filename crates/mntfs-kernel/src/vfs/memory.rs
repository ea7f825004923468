//! In-memory filesystem.
//!
//! Used for ephemeral sessions and tests. All data is lost when dropped.

use std::collections::BTreeMap;
use std::time::SystemTime;

use async_trait::async_trait;
use mntfs_types::{path, FsError, FsResult, Stat};
use tokio::sync::RwLock;

use super::traits::FilesystemBackend;

#[derive(Debug, Clone)]
enum Entry {
    File {
        data: Vec<u8>,
        modified: SystemTime,
        created: SystemTime,
    },
    Directory {
        modified: SystemTime,
        created: SystemTime,
    },
}

impl Entry {
    fn directory() -> Self {
        let now = SystemTime::now();
        Entry::Directory {
            modified: now,
            created: now,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory { .. })
    }
}

/// In-memory filesystem keyed by normalized absolute path.
///
/// Thread-safe via internal `RwLock`. The root `/` always exists.
#[derive(Debug)]
pub struct MemoryFs {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("/".to_string(), Entry::directory());
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Canonical key: absolute, normalized, no trailing slash.
    fn key(path: &str) -> String {
        let normalized = path::normalize(&format!("/{path}"));
        path::trim_trailing_slash(&normalized).to_string()
    }

    fn children<'a>(
        entries: &'a BTreeMap<String, Entry>,
        dir: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Entry)> + 'a {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{dir}/")
        };
        entries
            .range(prefix.clone()..)
            .take_while(move |(k, _)| k.starts_with(&prefix))
            .filter(move |(k, _)| k.as_str() != dir)
    }

    fn require_parent_dir(entries: &BTreeMap<String, Entry>, key: &str) -> FsResult<()> {
        let parent = path::dirname(key);
        match entries.get(&parent) {
            Some(e) if e.is_dir() => Ok(()),
            Some(_) => Err(FsError::not_a_directory("parent is not a directory").at(key)),
            None => Err(FsError::not_found("parent directory does not exist").at(key)),
        }
    }
}

#[async_trait]
impl FilesystemBackend for MemoryFs {
    fn name(&self) -> &str {
        "memory"
    }

    async fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        let key = Self::key(path);
        let entries = self.entries.read().await;

        match entries.get(&key) {
            Some(e) if e.is_dir() => {}
            Some(_) => return Err(FsError::not_a_directory("not a directory").at(path)),
            None => return Err(FsError::not_found("no such directory").at(path)),
        }

        let names = Self::children(&entries, &key)
            .filter(|(k, _)| path::dirname(k) == key)
            .map(|(k, _)| path::basename(k).to_string())
            .collect();
        Ok(names)
    }

    async fn stat(&self, path: &str) -> FsResult<Stat> {
        let key = Self::key(path);
        let entries = self.entries.read().await;

        match entries.get(&key) {
            Some(Entry::File {
                data,
                modified,
                created,
            }) => Ok(Stat::file(&key, data.len() as u64).with_times(
                Some(*modified),
                Some(*created),
                Some(*modified),
            )),
            Some(Entry::Directory { modified, created }) => Ok(Stat::directory(&key)
                .with_times(Some(*modified), Some(*created), Some(*modified))),
            None => Err(FsError::not_found("no such file or directory").at(path)),
        }
    }

    async fn read(&self, path: &str) -> FsResult<Vec<u8>> {
        let key = Self::key(path);
        let entries = self.entries.read().await;

        match entries.get(&key) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Directory { .. }) => {
                Err(FsError::is_a_directory("is a directory").at(path))
            }
            None => Err(FsError::not_found("no such file").at(path)),
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let key = Self::key(path);
        let mut entries = self.entries.write().await;

        Self::require_parent_dir(&entries, &key)?;

        let now = SystemTime::now();
        let created = match entries.get(&key) {
            Some(Entry::Directory { .. }) => {
                return Err(FsError::is_a_directory("is a directory").at(path));
            }
            Some(Entry::File { created, .. }) => *created,
            None => now,
        };

        entries.insert(
            key,
            Entry::File {
                data: data.to_vec(),
                modified: now,
                created,
            },
        );
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> FsResult<()> {
        let key = Self::key(path);
        let mut entries = self.entries.write().await;

        if entries.contains_key(&key) {
            return Err(FsError::already_exists("file already exists").at(path));
        }
        Self::require_parent_dir(&entries, &key)?;

        entries.insert(key, Entry::directory());
        Ok(())
    }

    async fn unlink(&self, path: &str) -> FsResult<()> {
        let key = Self::key(path);
        if key == "/" {
            return Err(FsError::not_permitted("cannot remove root directory").at(path));
        }

        let mut entries = self.entries.write().await;

        match entries.get(&key) {
            None => return Err(FsError::not_found("no such file or directory").at(path)),
            Some(e) if e.is_dir() && Self::children(&entries, &key).next().is_some() => {
                return Err(FsError::not_empty("directory not empty").at(path));
            }
            Some(_) => {}
        }

        entries.remove(&key);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let from_key = Self::key(from);
        let to_key = Self::key(to);

        if from_key == "/" {
            return Err(FsError::not_permitted("cannot rename root directory").at(from));
        }
        if from_key == to_key {
            return Ok(());
        }
        if to_key.starts_with(&format!("{from_key}/")) {
            return Err(FsError::invalid("cannot move a directory into itself").at(to));
        }

        let mut entries = self.entries.write().await;

        let entry = entries
            .get(&from_key)
            .cloned()
            .ok_or_else(|| FsError::not_found("no such file or directory").at(from))?;
        Self::require_parent_dir(&entries, &to_key)?;

        match (&entry, entries.get(&to_key)) {
            (Entry::File { .. }, Some(Entry::Directory { .. })) => {
                return Err(FsError::is_a_directory("destination is a directory").at(to));
            }
            (Entry::Directory { .. }, Some(Entry::File { .. })) => {
                return Err(FsError::not_a_directory("destination is not a directory").at(to));
            }
            (Entry::Directory { .. }, Some(Entry::Directory { .. }))
                if Self::children(&entries, &to_key).next().is_some() =>
            {
                return Err(FsError::not_empty("destination directory not empty").at(to));
            }
            _ => {}
        }

        let moved: Vec<(String, Entry)> = Self::children(&entries, &from_key)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (old, child) in moved {
            entries.remove(&old);
            let relative = &old[from_key.len()..];
            entries.insert(format!("{to_key}{relative}"), child);
        }

        entries.remove(&from_key);
        entries.insert(to_key, entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mntfs_types::ErrorCode;

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = MemoryFs::new();
        fs.write("/test.txt", b"hello world").await.unwrap();
        assert_eq!(fs.read("/test.txt").await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let fs = MemoryFs::new();
        let err = fs.read("/nonexistent.txt").await.unwrap_err();
        assert!(err.is(ErrorCode::NotFound));
        assert_eq!(err.path(), Some("/nonexistent.txt"));
    }

    #[tokio::test]
    async fn test_write_needs_parent() {
        let fs = MemoryFs::new();
        let err = fs.write("/a/b/c.txt", b"x").await.unwrap_err();
        assert!(err.is(ErrorCode::NotFound));

        fs.write("/file", b"x").await.unwrap();
        let err = fs.write("/file/child", b"x").await.unwrap_err();
        assert!(err.is(ErrorCode::NotADirectory));
    }

    #[tokio::test]
    async fn test_write_over_directory_fails() {
        let fs = MemoryFs::new();
        fs.mkdir("/dir").await.unwrap();
        let err = fs.write("/dir", b"x").await.unwrap_err();
        assert!(err.is(ErrorCode::IsADirectory));
    }

    #[tokio::test]
    async fn test_mkdir_semantics() {
        let fs = MemoryFs::new();
        fs.mkdir("/a").await.unwrap();
        assert!(fs.mkdir("/a").await.unwrap_err().is(ErrorCode::AlreadyExists));
        assert!(fs.mkdir("/x/y").await.unwrap_err().is(ErrorCode::NotFound));
        assert!(fs.stat("/a/").await.unwrap().is_directory());
    }

    #[tokio::test]
    async fn test_readdir_lists_direct_children_sorted() {
        let fs = MemoryFs::new();
        fs.write("/b.txt", b"b").await.unwrap();
        fs.write("/a.txt", b"a").await.unwrap();
        fs.mkdir("/sub").await.unwrap();
        fs.write("/sub/deep.txt", b"d").await.unwrap();

        assert_eq!(fs.readdir("/").await.unwrap(), vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(fs.readdir("/sub").await.unwrap(), vec!["deep.txt"]);
        assert!(fs.readdir("/a.txt").await.unwrap_err().is(ErrorCode::NotADirectory));
    }

    #[tokio::test]
    async fn test_sibling_prefix_is_not_a_child() {
        let fs = MemoryFs::new();
        fs.mkdir("/ab").await.unwrap();
        fs.mkdir("/abc").await.unwrap();
        fs.unlink("/ab").await.unwrap();
        assert_eq!(fs.readdir("/").await.unwrap(), vec!["abc"]);
    }

    #[tokio::test]
    async fn test_unlink() {
        let fs = MemoryFs::new();
        fs.mkdir("/dir").await.unwrap();
        fs.write("/dir/file.txt", b"data").await.unwrap();

        let err = fs.unlink("/dir").await.unwrap_err();
        assert!(err.is(ErrorCode::NotEmpty));

        fs.unlink("/dir/file.txt").await.unwrap();
        fs.unlink("/dir").await.unwrap();
        assert!(!fs.exists("/dir").await);
        assert!(fs.unlink("/").await.unwrap_err().is(ErrorCode::NotPermitted));
    }

    #[tokio::test]
    async fn test_stat_sizes() {
        let fs = MemoryFs::new();
        fs.write("/f", b"12345").await.unwrap();
        let st = fs.stat("/f").await.unwrap();
        assert!(st.is_file());
        assert_eq!(st.size, 5);
        assert_eq!(st.name, "f");
        assert!(st.mtime.is_some());
    }

    #[tokio::test]
    async fn test_rename_file() {
        let fs = MemoryFs::new();
        fs.write("/old.txt", b"content").await.unwrap();
        fs.rename("/old.txt", "/new.txt").await.unwrap();
        assert_eq!(fs.read("/new.txt").await.unwrap(), b"content");
        assert!(!fs.exists("/old.txt").await);
    }

    #[tokio::test]
    async fn test_rename_directory_moves_subtree() {
        let fs = MemoryFs::new();
        fs.mkdir("/dir").await.unwrap();
        fs.mkdir("/dir/sub").await.unwrap();
        fs.write("/dir/a.txt", b"a").await.unwrap();
        fs.write("/dir/sub/c.txt", b"c").await.unwrap();

        fs.rename("/dir", "/renamed").await.unwrap();

        assert!(fs.exists("/renamed/a.txt").await);
        assert_eq!(fs.read("/renamed/sub/c.txt").await.unwrap(), b"c");
        assert!(!fs.exists("/dir").await);
        assert!(!fs.exists("/dir/a.txt").await);
    }

    #[tokio::test]
    async fn test_rename_errors() {
        let fs = MemoryFs::new();
        assert!(fs
            .rename("/missing", "/dest")
            .await
            .unwrap_err()
            .is(ErrorCode::NotFound));

        fs.mkdir("/d").await.unwrap();
        fs.write("/f", b"x").await.unwrap();
        assert!(fs.rename("/f", "/d").await.unwrap_err().is(ErrorCode::IsADirectory));
        assert!(fs.rename("/d", "/f").await.unwrap_err().is(ErrorCode::NotADirectory));
        assert!(fs
            .rename("/d", "/d/inner")
            .await
            .unwrap_err()
            .is(ErrorCode::InvalidArgument));
    }
}
