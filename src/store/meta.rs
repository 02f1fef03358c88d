// src/store/meta.rs

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::dag::thunk::{TaskId, Value};
use crate::errors::{Result, SchedulerError};

struct Entry {
    value: Value,
    /// `Some` for exported (cluster-visible) results, `None` for local
    /// publications, which are not refcount-tracked.
    refcount: Option<i64>,
}

/// Node-local metadata store: one result slot per task id.
///
/// All operations are linearizable per key: a single lock guards the
/// slot map, and every publication and refcount move happens under it.
/// Publication is first-wins: if two producers compute the same task,
/// only the first `set_result`/`export_result` takes effect and later
/// producers observe `has_result` and skip.
pub struct MetaStore {
    slots: Mutex<FxHashMap<TaskId, Entry>>,
}

impl MetaStore {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn has_result(&self, task: TaskId) -> bool {
        self.slots.lock().contains_key(&task)
    }

    pub fn get_result(&self, task: TaskId) -> Result<Value> {
        self.slots
            .lock()
            .get(&task)
            .map(|e| e.value.clone())
            .ok_or_else(|| {
                SchedulerError::MetaMissing {
                    task: task.short(),
                }
                .into()
            })
    }

    /// Local-only publication. Returns whether this call was the first
    /// publication for the task.
    pub fn set_result(&self, task: TaskId, value: Value) -> bool {
        let mut slots = self.slots.lock();
        if slots.contains_key(&task) {
            debug!(task = %task.short(), "result already published; skipping");
            return false;
        }
        slots.insert(
            task,
            Entry {
                value,
                refcount: None,
            },
        );
        true
    }

    /// Cluster-visible publication with an initial refcount. First
    /// publication wins, as with [`MetaStore::set_result`].
    pub fn export_result(&self, task: TaskId, value: Value, refcount: i64) -> bool {
        let mut slots = self.slots.lock();
        if slots.contains_key(&task) {
            debug!(task = %task.short(), "result already published; skipping export");
            return false;
        }
        slots.insert(
            task,
            Entry {
                value,
                refcount: Some(refcount),
            },
        );
        true
    }

    /// Decrement an exported result's refcount and return the new count.
    ///
    /// Local (untracked) publications return −1: the caller must not
    /// reclaim anything on their behalf.
    pub fn decr_resultrefcount(&self, task: TaskId) -> Result<i64> {
        let mut slots = self.slots.lock();
        let entry = slots.get_mut(&task).ok_or_else(|| SchedulerError::MetaMissing {
            task: task.short(),
        })?;
        match entry.refcount.as_mut() {
            Some(rc) => {
                *rc -= 1;
                if *rc < 0 {
                    warn!(task = %task.short(), refcount = *rc, "refcount decremented below zero");
                }
                Ok(*rc)
            }
            None => Ok(-1),
        }
    }

    /// Clear per-run state. Results whose value is a persist-flagged chunk
    /// survive a plain reset; `dropdb` preserves nothing.
    pub fn reset(&self, dropdb: bool) {
        let mut slots = self.slots.lock();
        if dropdb {
            slots.clear();
        } else {
            slots.retain(|_, e| matches!(&e.value, Value::Chunk(c) if c.persist()));
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl Default for MetaStore {
    fn default() -> Self {
        Self::new()
    }
}
