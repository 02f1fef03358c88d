// src/store/pool.rs

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::dag::thunk::Value;
use crate::errors::SchedulerError;

/// Handle to a materialized value held in the pool.
///
/// The handle is what travels inside [`Value::Chunk`] and across the
/// metadata store; the pool remains the source of truth for where the
/// payload currently lives (in-process or on disk).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    handle: u64,
    persist: bool,
    cache: bool,
    /// Name of the executor that produced the payload.
    owner: String,
}

impl Chunk {
    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn persist(&self) -> bool {
        self.persist
    }

    pub fn cache(&self) -> bool {
        self.cache
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

enum Slot {
    Mem(Value),
    Disk(PathBuf),
}

/// Content pool for chunk payloads.
///
/// In-process payloads live in a map behind a single lock; disk-backed
/// payloads are JSON files in a pool-owned temp directory, removed when
/// their handle is deleted or the pool is dropped.
pub struct ChunkPool {
    slots: Mutex<FxHashMap<u64, Slot>>,
    next_handle: AtomicU64,
    spill_dir: TempDir,
}

impl ChunkPool {
    pub fn new() -> Result<Self> {
        let spill_dir = TempDir::new().context("creating chunk pool spill directory")?;
        Ok(Self {
            slots: Mutex::new(FxHashMap::default()),
            next_handle: AtomicU64::new(1),
            spill_dir,
        })
    }

    /// Box a value into a fresh in-process chunk.
    pub fn tochunk(&self, value: Value, persist: bool, cache: bool, owner: &str) -> Chunk {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().insert(handle, Slot::Mem(value));
        debug!(handle, owner = %owner, persist, "boxed value into chunk");
        Chunk {
            handle,
            persist,
            cache,
            owner: owner.to_string(),
        }
    }

    /// Materialize a chunk's payload.
    ///
    /// Disk-backed payloads are read back from their spill file; when the
    /// chunk is flagged `cache`, the materialized value is promoted back
    /// into the in-process map.
    pub fn collect(&self, chunk: &Chunk) -> Result<Value> {
        let path = {
            let slots = self.slots.lock();
            match slots.get(&chunk.handle) {
                Some(Slot::Mem(value)) => return Ok(value.clone()),
                Some(Slot::Disk(path)) => path.clone(),
                None => {
                    return Err(SchedulerError::PoolMissing {
                        handle: chunk.handle,
                    }
                    .into())
                }
            }
        };

        let contents = fs::read(&path)
            .with_context(|| format!("reading spilled chunk {} at {:?}", chunk.handle, path))?;
        let value: Value = serde_json::from_slice(&contents)
            .with_context(|| format!("decoding spilled chunk {}", chunk.handle))?;

        if chunk.cache {
            self.slots
                .lock()
                .insert(chunk.handle, Slot::Mem(value.clone()));
        }
        Ok(value)
    }

    /// Migrate an in-process payload to disk-backed storage. Already
    /// disk-backed chunks are returned unchanged.
    pub fn chunktodisk(&self, chunk: &Chunk) -> Result<Chunk> {
        let value = {
            let slots = self.slots.lock();
            match slots.get(&chunk.handle) {
                Some(Slot::Mem(value)) => value.clone(),
                Some(Slot::Disk(_)) => return Ok(chunk.clone()),
                None => {
                    return Err(SchedulerError::PoolMissing {
                        handle: chunk.handle,
                    }
                    .into())
                }
            }
        };

        let path = self
            .spill_dir
            .path()
            .join(format!("chunk-{}.json", chunk.handle));
        let encoded = serde_json::to_vec(&value)
            .with_context(|| format!("encoding chunk {} for spill", chunk.handle))?;
        fs::write(&path, encoded)
            .with_context(|| format!("writing spill file for chunk {} at {:?}", chunk.handle, path))?;

        self.slots.lock().insert(chunk.handle, Slot::Disk(path));
        debug!(handle = chunk.handle, "migrated chunk to disk");
        Ok(chunk.clone())
    }

    /// Reclaim a handle. Deleting a handle twice is a refcounting bug and
    /// surfaces as [`SchedulerError::PoolMissing`].
    pub fn pooldelete(&self, chunk: &Chunk) -> Result<()> {
        let slot = self.slots.lock().remove(&chunk.handle);
        match slot {
            Some(Slot::Mem(_)) => Ok(()),
            Some(Slot::Disk(path)) => {
                if let Err(err) = fs::remove_file(&path) {
                    warn!(handle = chunk.handle, error = %err, "failed to remove spill file");
                }
                Ok(())
            }
            None => Err(SchedulerError::PoolMissing {
                handle: chunk.handle,
            }
            .into()),
        }
    }

    /// True while the payload lives in the in-process map.
    pub fn is_in_process(&self, chunk: &Chunk) -> bool {
        matches!(self.slots.lock().get(&chunk.handle), Some(Slot::Mem(_)))
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Drop every slot and spill file. Used by a `dropdb` reset.
    pub fn clear(&self) {
        let mut slots = self.slots.lock();
        for (handle, slot) in slots.drain() {
            if let Slot::Disk(path) = slot {
                if let Err(err) = fs::remove_file(&path) {
                    warn!(handle, error = %err, "failed to remove spill file");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_through_memory_and_disk() {
        let pool = ChunkPool::new().unwrap();
        let chunk = pool.tochunk(Value::FloatVec(vec![1.0, 2.0]), false, false, "node1-executor1");
        assert!(pool.is_in_process(&chunk));
        assert_eq!(pool.collect(&chunk).unwrap(), Value::FloatVec(vec![1.0, 2.0]));

        let chunk = pool.chunktodisk(&chunk).unwrap();
        assert!(!pool.is_in_process(&chunk));
        assert_eq!(pool.collect(&chunk).unwrap(), Value::FloatVec(vec![1.0, 2.0]));
    }

    #[test]
    fn cached_chunk_promotes_back_after_spill() {
        let pool = ChunkPool::new().unwrap();
        let chunk = pool.tochunk(Value::Int(5), false, true, "node1-executor1");
        pool.chunktodisk(&chunk).unwrap();
        assert!(!pool.is_in_process(&chunk));

        pool.collect(&chunk).unwrap();
        assert!(pool.is_in_process(&chunk));
    }

    #[test]
    fn delete_reclaims_exactly_once() {
        let pool = ChunkPool::new().unwrap();
        let chunk = pool.tochunk(Value::Unit, false, false, "node1-executor1");
        pool.pooldelete(&chunk).unwrap();
        assert!(pool.pooldelete(&chunk).is_err());
        assert!(pool.collect(&chunk).is_err());
    }

    #[test]
    fn chunktodisk_is_idempotent() {
        let pool = ChunkPool::new().unwrap();
        let chunk = pool.tochunk(Value::Int(1), false, false, "node1-executor1");
        let a = pool.chunktodisk(&chunk).unwrap();
        let b = pool.chunktodisk(&a).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.collect(&b).unwrap(), Value::Int(1));
    }
}
