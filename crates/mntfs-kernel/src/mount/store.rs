//! Durable mount-point persistence.
//!
//! One SQLite key/value table holds a single record under
//! [`MOUNT_POINTS_KEY`]: a JSON object mapping mount names to handle
//! records. Every context opens its own connection to the same file, so the
//! map survives restarts and is shared between contexts.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use mntfs_types::{FsError, FsResult};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Transaction, TransactionBehavior};

use crate::native::{HandleRecord, NativeDirectory, NativeDirectoryProvider};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Key of the mount map record.
pub const MOUNT_POINTS_KEY: &str = "mount_points";

/// Suffixes tried after the bare name before giving up.
const MAX_NAME_SUFFIX: usize = 1_000_000;

type RecordMap = BTreeMap<String, HandleRecord>;

/// Live mount map: name → directory handle.
pub type MountMap = BTreeMap<String, Arc<dyn NativeDirectory>>;

/// Result of [`MountPointStore::claim_mount_point`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The handle was already stored under this name.
    Existing(String),
    /// A new mount was written under this name.
    Created(String),
}

impl Claim {
    pub fn name(&self) -> &str {
        match self {
            Claim::Existing(name) | Claim::Created(name) => name,
        }
    }
}

fn store_error(err: rusqlite::Error) -> FsError {
    FsError::io(format!("mount store: {err}"))
}

fn codec_error(err: serde_json::Error) -> FsError {
    FsError::io(format!("mount store record: {err}"))
}

/// Pick `base`, or `base_0`, `base_1`, … whichever is free first.
pub fn allocate_mount_name(base: &str, taken: impl Fn(&str) -> bool) -> FsResult<String> {
    if base.is_empty() {
        return Err(FsError::invalid("directory has no name to mount under"));
    }
    if !taken(base) {
        return Ok(base.to_string());
    }
    (0..MAX_NAME_SUFFIX)
        .map(|i| format!("{base}_{i}"))
        .find(|candidate| !taken(candidate))
        .ok_or_else(|| FsError::already_exists(format!("no free mount name for {base}")))
}

/// Mount map persisted in SQLite, with an in-memory snapshot of live handles.
///
/// Refreshes and local writes are serialized, so a refresh never installs a
/// map read before a write that has already been reported to the caller.
pub struct MountPointStore {
    conn: Mutex<Connection>,
    provider: Arc<dyn NativeDirectoryProvider>,
    snapshot: RwLock<MountMap>,
    writes: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for MountPointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountPointStore")
            .field("provider", &self.provider.id())
            .field("mounts", &self.mount_names())
            .finish_non_exhaustive()
    }
}

impl MountPointStore {
    /// Open or create a store at `path`.
    ///
    /// Creates parent directories and the schema if needed.
    pub fn open(path: impl AsRef<Path>, provider: Arc<dyn NativeDirectoryProvider>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating store directory: {}", parent.display()))?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("opening mount store: {}", path.display()))?;

        Self::with_connection(conn, provider)
    }

    /// A private in-memory store (single context, nothing persisted).
    pub fn in_memory(provider: Arc<dyn NativeDirectoryProvider>) -> Result<Self> {
        let conn = Connection::open_in_memory().context("creating in-memory mount store")?;
        Self::with_connection(conn, provider)
    }

    fn with_connection(conn: Connection, provider: Arc<dyn NativeDirectoryProvider>) -> Result<Self> {
        // Other contexts may hold the write lock briefly.
        conn.busy_timeout(Duration::from_secs(5))
            .context("setting store busy timeout")?;
        conn.execute_batch(SCHEMA_SQL)
            .context("initializing mount store schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
            provider,
            snapshot: RwLock::new(MountMap::new()),
            writes: tokio::sync::Mutex::new(()),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_records(conn: &Connection) -> FsResult<RecordMap> {
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![MOUNT_POINTS_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_error)?;
        match value {
            Some(json) => serde_json::from_str(&json).map_err(codec_error),
            None => Ok(RecordMap::new()),
        }
    }

    fn write_records(tx: &Transaction<'_>, records: &RecordMap) -> FsResult<()> {
        let json = serde_json::to_string(records).map_err(codec_error)?;
        tx.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![MOUNT_POINTS_KEY, json],
        )
        .map_err(store_error)?;
        Ok(())
    }

    /// Run `f` on the durable map inside one IMMEDIATE transaction and write
    /// back whatever it leaves there.
    fn update_records<T>(&self, f: impl FnOnce(&mut RecordMap) -> FsResult<T>) -> FsResult<T> {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(store_error)?;
        let mut records = Self::read_records(&tx)?;
        let out = f(&mut records)?;
        Self::write_records(&tx, &records)?;
        tx.commit().map_err(store_error)?;
        Ok(out)
    }

    /// Reload the mount map from durable storage.
    ///
    /// Records the provider can no longer restore are skipped with a warning
    /// and stay in storage.
    pub async fn refresh_mount_points(&self) -> FsResult<()> {
        let _writes = self.writes.lock().await;
        let records = Self::read_records(&self.conn())?;

        let mut mounts = MountMap::new();
        for (name, record) in records {
            match self.provider.restore(&record).await {
                Ok(handle) => {
                    mounts.insert(name, handle);
                }
                Err(err) => {
                    tracing::warn!(mount = %name, locator = %record.locator, error = %err, "Skipping unrestorable mount");
                }
            }
        }

        tracing::debug!(count = mounts.len(), "Refreshed mount points");
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = mounts;
        Ok(())
    }

    /// The last-loaded snapshot. No I/O.
    pub fn mount_points(&self) -> MountMap {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn mount_names(&self) -> Vec<String> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn NativeDirectory>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Merge one entry into the durable map (read-merge-write).
    pub async fn add_mount_point(
        &self,
        name: &str,
        handle: Arc<dyn NativeDirectory>,
    ) -> FsResult<()> {
        let _writes = self.writes.lock().await;
        let record = handle.record();
        self.update_records(|records| {
            records.insert(name.to_string(), record);
            Ok(())
        })?;
        self.snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), handle);
        Ok(())
    }

    /// Store `handle` under a fresh name unless the durable map already
    /// holds the same record.
    ///
    /// The lookup and the insert share one IMMEDIATE transaction, so two
    /// contexts racing to mount the same directory end up with one name.
    pub async fn claim_mount_point(&self, handle: Arc<dyn NativeDirectory>) -> FsResult<Claim> {
        let _writes = self.writes.lock().await;
        let record = handle.record();
        let local: Vec<String> = self.mount_names();

        let claim = self.update_records(|records| {
            if let Some((name, _)) = records.iter().find(|(_, r)| **r == record) {
                return Ok(Claim::Existing(name.clone()));
            }
            let name = allocate_mount_name(handle.name(), |candidate| {
                records.contains_key(candidate) || local.iter().any(|n| n == candidate)
            })?;
            records.insert(name.clone(), record.clone());
            Ok(Claim::Created(name))
        })?;

        self.snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(claim.name().to_string(), handle);
        Ok(claim)
    }

    /// Delete a mount. Returns false if no such name was stored.
    pub async fn remove_mount_point(&self, name: &str) -> FsResult<bool> {
        let _writes = self.writes.lock().await;
        let removed = self.update_records(|records| Ok(records.remove(name).is_some()))?;
        let cached = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        Ok(removed || cached)
    }
}
