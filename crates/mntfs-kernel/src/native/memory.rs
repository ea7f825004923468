//! In-memory native directory tree.
//!
//! Stands in for a host directory picker in ephemeral sessions and tests:
//! a shared tree of directories and files, handles that point into it, and
//! scripted permission answers.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use async_trait::async_trait;
use mntfs_types::{path, FileKind, FsError, FsResult};

use super::provider::{
    validate_entry_name, FileMetadata, HandleRecord, NativeDirectory, NativeDirectoryProvider,
    NativeFile, PermissionMode, PermissionState,
};

const PROVIDER_ID: &str = "memory";

#[derive(Debug, Clone)]
enum Node {
    Directory,
    File { data: Vec<u8>, modified: SystemTime },
}

#[derive(Debug)]
struct Permissions {
    read: PermissionState,
    read_write: PermissionState,
    /// What a prompt answers when a request is made.
    answer: PermissionState,
}

impl Permissions {
    fn slot(&mut self, mode: PermissionMode) -> &mut PermissionState {
        match mode {
            PermissionMode::Read => &mut self.read,
            PermissionMode::ReadWrite => &mut self.read_write,
        }
    }
}

#[derive(Debug)]
struct Tree {
    nodes: Mutex<BTreeMap<String, Node>>,
    permissions: Mutex<Permissions>,
    picks: Mutex<VecDeque<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn child_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Provider over an in-memory tree.
///
/// Clones share the same tree, so handles restored by one context see
/// writes made through another.
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    tree: Arc<Tree>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    /// Empty tree with every permission granted.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Directory);
        Self {
            tree: Arc::new(Tree {
                nodes: Mutex::new(nodes),
                permissions: Mutex::new(Permissions {
                    read: PermissionState::Granted,
                    read_write: PermissionState::Granted,
                    answer: PermissionState::Granted,
                }),
                picks: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Create a directory and all its parents.
    pub fn create_dir_all(&self, dir: &str) -> FsResult<()> {
        let mut nodes = lock(&self.tree.nodes);
        let mut current = String::from("/");
        for segment in path::segments(dir) {
            current = child_path(&current, &segment);
            match nodes.get(&current) {
                Some(Node::File { .. }) => {
                    return Err(FsError::not_a_directory("not a directory").at(current));
                }
                Some(Node::Directory) => {}
                None => {
                    nodes.insert(current.clone(), Node::Directory);
                }
            }
        }
        Ok(())
    }

    /// Create or replace a file, creating parent directories.
    pub fn put_file(&self, file: &str, data: &[u8]) -> FsResult<()> {
        let file = path::normalize(file);
        self.create_dir_all(&path::dirname(&file))?;
        let mut nodes = lock(&self.tree.nodes);
        if let Some(Node::Directory) = nodes.get(&file) {
            return Err(FsError::is_a_directory("is a directory").at(file));
        }
        nodes.insert(
            file,
            Node::File {
                data: data.to_vec(),
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    /// A handle to an existing directory, as if the user had granted it.
    pub fn directory(&self, dir: &str) -> FsResult<Arc<dyn NativeDirectory>> {
        let normalized = path::normalize(dir);
        let locator = path::trim_trailing_slash(&normalized).to_string();
        match lock(&self.tree.nodes).get(&locator) {
            Some(Node::Directory) => {}
            Some(Node::File { .. }) => {
                return Err(FsError::not_a_directory("not a directory").at(locator));
            }
            None => return Err(FsError::not_found("no such directory").at(locator)),
        }
        Ok(Arc::new(MemoryDirectory {
            tree: self.tree.clone(),
            name: path::basename(&locator).to_string(),
            locator,
        }))
    }

    /// Queue a directory for the next `pick_directory` call.
    pub fn queue_pick(&self, dir: &str) {
        lock(&self.tree.picks).push_back(path::normalize(dir));
    }

    /// Set the current permission state for both modes.
    pub fn set_permission(&self, state: PermissionState) {
        let mut perms = lock(&self.tree.permissions);
        perms.read = state;
        perms.read_write = state;
    }

    pub fn set_mode_permission(&self, mode: PermissionMode, state: PermissionState) {
        *lock(&self.tree.permissions).slot(mode) = state;
    }

    /// What the simulated prompt answers on `request_permission`.
    pub fn answer_requests_with(&self, answer: PermissionState) {
        lock(&self.tree.permissions).answer = answer;
    }

    /// Remove a directory tree behind the handles' back.
    pub fn remove_tree(&self, dir: &str) {
        let dir = path::normalize(dir);
        let prefix = format!("{}/", path::trim_trailing_slash(&dir));
        lock(&self.tree.nodes).retain(|k, _| k != &dir && !k.starts_with(&prefix));
    }
}

#[async_trait]
impl NativeDirectoryProvider for MemoryProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn pick_directory(&self) -> FsResult<Arc<dyn NativeDirectory>> {
        let next = lock(&self.tree.picks).pop_front();
        match next {
            Some(dir) => self.directory(&dir),
            None => Err(FsError::canceled("directory picker was dismissed")),
        }
    }

    async fn open(&self, locator: &str) -> FsResult<Arc<dyn NativeDirectory>> {
        self.directory(locator)
    }

    async fn restore(&self, record: &HandleRecord) -> FsResult<Arc<dyn NativeDirectory>> {
        if record.provider != PROVIDER_ID {
            return Err(FsError::invalid(format!(
                "handle belongs to provider {}",
                record.provider
            )));
        }
        self.directory(&record.locator)
    }
}

#[derive(Debug)]
pub struct MemoryDirectory {
    tree: Arc<Tree>,
    locator: String,
    name: String,
}

impl MemoryDirectory {
    fn ensure_present(&self, nodes: &BTreeMap<String, Node>) -> FsResult<()> {
        match nodes.get(&self.locator) {
            Some(Node::Directory) => Ok(()),
            _ => Err(FsError::not_found("directory no longer exists").at(&self.locator)),
        }
    }
}

#[async_trait]
impl NativeDirectory for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn record(&self) -> HandleRecord {
        HandleRecord {
            provider: PROVIDER_ID.to_string(),
            locator: self.locator.clone(),
        }
    }

    async fn get_directory_handle(
        &self,
        name: &str,
        create: bool,
    ) -> FsResult<Arc<dyn NativeDirectory>> {
        validate_entry_name(name)?;
        let locator = child_path(&self.locator, name);
        let mut nodes = lock(&self.tree.nodes);
        self.ensure_present(&nodes)?;

        match nodes.get(&locator) {
            Some(Node::Directory) => {}
            Some(Node::File { .. }) => {
                return Err(FsError::not_a_directory("entry is a file").at(locator));
            }
            None if create => {
                nodes.insert(locator.clone(), Node::Directory);
            }
            None => return Err(FsError::not_found("no such directory").at(locator)),
        }

        Ok(Arc::new(MemoryDirectory {
            tree: self.tree.clone(),
            name: name.to_string(),
            locator,
        }))
    }

    async fn get_file_handle(&self, name: &str, create: bool) -> FsResult<Arc<dyn NativeFile>> {
        validate_entry_name(name)?;
        let locator = child_path(&self.locator, name);
        let mut nodes = lock(&self.tree.nodes);
        self.ensure_present(&nodes)?;

        match nodes.get(&locator) {
            Some(Node::File { .. }) => {}
            Some(Node::Directory) => {
                return Err(FsError::is_a_directory("entry is a directory").at(locator));
            }
            None if create => {
                nodes.insert(
                    locator.clone(),
                    Node::File {
                        data: Vec::new(),
                        modified: SystemTime::now(),
                    },
                );
            }
            None => return Err(FsError::not_found("no such file").at(locator)),
        }

        Ok(Arc::new(MemoryFile {
            tree: self.tree.clone(),
            name: name.to_string(),
            locator,
        }))
    }

    async fn entries(&self) -> FsResult<Vec<(String, FileKind)>> {
        let nodes = lock(&self.tree.nodes);
        self.ensure_present(&nodes)?;

        let prefix = child_path(&self.locator, "");
        let entries = nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| !k[prefix.len()..].contains('/') && k.len() > prefix.len())
            .map(|(k, node)| {
                let kind = match node {
                    Node::Directory => FileKind::Directory,
                    Node::File { .. } => FileKind::File,
                };
                (k[prefix.len()..].to_string(), kind)
            })
            .collect();
        Ok(entries)
    }

    async fn remove_entry(&self, name: &str, recursive: bool) -> FsResult<()> {
        validate_entry_name(name)?;
        let locator = child_path(&self.locator, name);
        let prefix = format!("{locator}/");
        let mut nodes = lock(&self.tree.nodes);

        match nodes.get(&locator) {
            None => return Err(FsError::not_found("no such entry").at(locator)),
            Some(Node::Directory) => {
                let has_children = nodes
                    .range(prefix.clone()..)
                    .next()
                    .is_some_and(|(k, _)| k.starts_with(&prefix));
                if has_children && !recursive {
                    return Err(FsError::not_empty("directory not empty").at(locator));
                }
                nodes.retain(|k, _| !k.starts_with(&prefix));
            }
            Some(Node::File { .. }) => {}
        }
        nodes.remove(&locator);
        Ok(())
    }

    async fn query_permission(&self, mode: PermissionMode) -> PermissionState {
        *lock(&self.tree.permissions).slot(mode)
    }

    async fn request_permission(&self, mode: PermissionMode) -> PermissionState {
        let mut perms = lock(&self.tree.permissions);
        let current = *perms.slot(mode);
        if current == PermissionState::Granted {
            return current;
        }
        let answer = perms.answer;
        *perms.slot(mode) = answer;
        answer
    }
}

#[derive(Debug)]
pub struct MemoryFile {
    tree: Arc<Tree>,
    locator: String,
    name: String,
}

#[async_trait]
impl NativeFile for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self) -> FsResult<Vec<u8>> {
        match lock(&self.tree.nodes).get(&self.locator) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            _ => Err(FsError::not_found("file no longer exists").at(&self.locator)),
        }
    }

    async fn metadata(&self) -> FsResult<FileMetadata> {
        match lock(&self.tree.nodes).get(&self.locator) {
            Some(Node::File { data, modified }) => Ok(FileMetadata {
                size: data.len() as u64,
                modified: Some(*modified),
            }),
            _ => Err(FsError::not_found("file no longer exists").at(&self.locator)),
        }
    }

    async fn write_all(&self, data: &[u8]) -> FsResult<()> {
        let mut nodes = lock(&self.tree.nodes);
        match nodes.get_mut(&self.locator) {
            Some(Node::File {
                data: contents,
                modified,
            }) => {
                *contents = data.to_vec();
                *modified = SystemTime::now();
                Ok(())
            }
            _ => Err(FsError::not_found("file no longer exists").at(&self.locator)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mntfs_types::ErrorCode;

    fn seeded() -> MemoryProvider {
        let provider = MemoryProvider::new();
        provider.put_file("/home/u/proj/src/main.rs", b"fn main() {}").unwrap();
        provider.put_file("/home/u/proj/README", b"hi").unwrap();
        provider
    }

    #[tokio::test]
    async fn entries_list_direct_children() {
        let provider = seeded();
        let proj = provider.directory("/home/u/proj").unwrap();
        assert_eq!(proj.name(), "proj");
        assert_eq!(
            proj.entries().await.unwrap(),
            vec![
                ("README".to_string(), FileKind::File),
                ("src".to_string(), FileKind::Directory),
            ]
        );
    }

    #[tokio::test]
    async fn handles_walk_and_create() {
        let provider = seeded();
        let proj = provider.directory("/home/u/proj").unwrap();

        let src = proj.get_directory_handle("src", false).await.unwrap();
        let main = src.get_file_handle("main.rs", false).await.unwrap();
        assert_eq!(main.read().await.unwrap(), b"fn main() {}");

        let err = proj.get_directory_handle("README", false).await.unwrap_err();
        assert!(err.is(ErrorCode::NotADirectory));
        let err = proj.get_file_handle("src", false).await.unwrap_err();
        assert!(err.is(ErrorCode::IsADirectory));

        let new_file = proj.get_file_handle("new.txt", true).await.unwrap();
        new_file.write_all(b"data").await.unwrap();
        assert_eq!(new_file.metadata().await.unwrap().size, 4);
    }

    #[tokio::test]
    async fn child_resolves_either_kind() {
        let provider = seeded();
        let proj = provider.directory("/home/u/proj").unwrap();
        assert_eq!(proj.child("src").await.unwrap().kind(), FileKind::Directory);
        assert_eq!(proj.child("README").await.unwrap().kind(), FileKind::File);
        assert!(proj.child("nope").await.unwrap_err().is(ErrorCode::NotFound));
    }

    #[tokio::test]
    async fn same_entry_and_resolve() {
        let provider = seeded();
        let proj = provider.directory("/home/u/proj").unwrap();
        let again = provider.directory("/home/u/proj/").unwrap();
        let src = provider.directory("/home/u/proj/src").unwrap();

        assert!(proj.is_same_entry(again.as_ref()).await);
        assert!(!proj.is_same_entry(src.as_ref()).await);
        assert_eq!(proj.resolve(src.as_ref()).await, Some(vec!["src".to_string()]));
        assert_eq!(src.resolve(proj.as_ref()).await, None);
    }

    #[tokio::test]
    async fn remove_entry_respects_recursive() {
        let provider = seeded();
        let proj = provider.directory("/home/u/proj").unwrap();

        let err = proj.remove_entry("src", false).await.unwrap_err();
        assert!(err.is(ErrorCode::NotEmpty));
        proj.remove_entry("src", true).await.unwrap();
        proj.remove_entry("README", false).await.unwrap();
        assert!(proj.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn permission_requests_follow_the_script() {
        let provider = seeded();
        let proj = provider.directory("/home/u/proj").unwrap();

        provider.set_permission(PermissionState::Prompt);
        provider.answer_requests_with(PermissionState::Denied);
        assert_eq!(
            proj.request_permission(PermissionMode::Read).await,
            PermissionState::Denied
        );

        provider.set_permission(PermissionState::Prompt);
        provider.answer_requests_with(PermissionState::Granted);
        assert_eq!(
            proj.request_permission(PermissionMode::Read).await,
            PermissionState::Granted
        );
        assert_eq!(
            proj.query_permission(PermissionMode::Read).await,
            PermissionState::Granted
        );
    }

    #[tokio::test]
    async fn pick_and_restore() {
        let provider = seeded();
        assert!(provider
            .pick_directory()
            .await
            .unwrap_err()
            .is(ErrorCode::Canceled));

        provider.queue_pick("/home/u/proj");
        let picked = provider.pick_directory().await.unwrap();
        let restored = provider.restore(&picked.record()).await.unwrap();
        assert!(picked.is_same_entry(restored.as_ref()).await);

        provider.remove_tree("/home/u/proj");
        assert!(provider
            .restore(&picked.record())
            .await
            .unwrap_err()
            .is(ErrorCode::NotFound));
        assert!(picked.entries().await.unwrap_err().is(ErrorCode::NotFound));
    }
}
