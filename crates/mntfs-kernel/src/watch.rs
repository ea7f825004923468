//! Path-scoped change watchers.
//!
//! A registration receives every event at or below its path unless the
//! event's path matches one of its ignore globs. Events produced in this
//! context are also republished on the bus; events that arrive from the bus
//! are delivered locally only, so nothing echoes back and forth.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use mntfs_glob::IgnoreList;
use mntfs_types::{path, ChangeEvent, ChangeKind, FsError, FsResult};

use crate::bus::{BusEndpoint, ContextMessage};

/// Called once per delivered event.
pub type WatchCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Handle for a single registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

struct Registration {
    id: WatchId,
    path: String,
    ignore: IgnoreList,
    callback: WatchCallback,
}

impl Registration {
    fn wants(&self, event: &ChangeEvent) -> bool {
        let in_scope = self.path == "/"
            || event.full_path == self.path
            || event.full_path.starts_with(&format!("{}/", self.path));
        in_scope && !self.ignore.is_ignored(&event.full_path)
    }
}

pub struct WatchService {
    registrations: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
    bus: BusEndpoint,
}

impl fmt::Debug for WatchService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchService")
            .field("watched", &self.watched_paths())
            .finish_non_exhaustive()
    }
}

fn watch_key(p: &str) -> String {
    path::trim_trailing_slash(&path::normalize(p)).to_string()
}

impl WatchService {
    pub fn new(bus: BusEndpoint) -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            bus,
        }
    }

    /// Register interest in `p` and everything below it.
    ///
    /// Fails `EINVAL` if an ignore glob does not compile.
    pub fn watch<I, S>(&self, p: &str, ignore: I, callback: WatchCallback) -> FsResult<WatchId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ignore = IgnoreList::new(ignore)
            .map_err(|e| FsError::invalid(format!("bad ignore glob: {e}")).at(p))?;
        let id = WatchId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let key = watch_key(p);
        tracing::debug!(path = %key, ignores = ignore.len(), "Watch registered");

        self.registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration {
                id,
                path: key,
                ignore,
                callback,
            });
        Ok(id)
    }

    /// Remove every registration for exactly `p`. Returns how many went.
    pub fn unwatch(&self, p: &str) -> usize {
        let key = watch_key(p);
        let mut regs = self
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = regs.len();
        regs.retain(|r| r.path != key);
        before - regs.len()
    }

    /// Remove one registration.
    pub fn unwatch_id(&self, id: WatchId) -> bool {
        let mut regs = self
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = regs.len();
        regs.retain(|r| r.id != id);
        before != regs.len()
    }

    pub fn unwatch_all(&self) {
        self.registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn watched_paths(&self) -> Vec<String> {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.path.clone())
            .collect()
    }

    pub fn report_create_event(&self, p: &str) {
        self.report(ChangeEvent::new(ChangeKind::Created, p));
    }

    pub fn report_change_event(&self, p: &str) {
        self.report(ChangeEvent::new(ChangeKind::Changed, p));
    }

    pub fn report_unlink_event(&self, p: &str) {
        self.report(ChangeEvent::new(ChangeKind::Deleted, p));
    }

    /// Deliver locally, then republish to other contexts.
    pub fn report(&self, event: ChangeEvent) {
        self.deliver(&event);
        self.bus.publish(ContextMessage::Watch(event));
    }

    /// An event from another context: deliver locally, never republish.
    pub fn process_remote(&self, event: &ChangeEvent) {
        self.deliver(event);
    }

    /// Returns how many callbacks ran.
    fn deliver(&self, event: &ChangeEvent) -> usize {
        // Collect first so callbacks may (un)register without deadlocking.
        let callbacks: Vec<WatchCallback> = self
            .registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.wants(event))
            .map(|r| r.callback.clone())
            .collect();

        tracing::trace!(path = %event.full_path, kind = ?event.kind, listeners = callbacks.len(), "Change event");
        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }
}
