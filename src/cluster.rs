// src/cluster.rs

//! Cluster registry: named shareable deques and pinger channels.
//!
//! Each scheduler publishes its shareable ring and a pinger under its
//! name (`create`); peers look each other up by name (`attach`) and get
//! a read handle that does not own the peer's state. Pings are advisory
//! wake events over a small bounded channel; a full channel simply
//! drops the ping, which costs latency, never correctness.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::mpsc;
use tracing::debug;

use crate::dag::thunk::TaskId;
use crate::engine::queue::ShareRing;
use crate::errors::SchedulerError;

/// Opaque wake event.
#[derive(Debug, Clone, Copy)]
pub struct Ping;

const PINGER_CAPACITY: usize = 4;

/// Read handle to a peer's shareable deque.
#[derive(Clone, Debug)]
pub struct PeerHandle {
    name: String,
    ring: Arc<ShareRing>,
}

impl PeerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Steal the peer's oldest offering not in `taken`; see
    /// [`ShareRing::steal`].
    pub fn steal(&self, taken: &FxHashSet<TaskId>) -> Option<TaskId> {
        self.ring.steal(taken)
    }

    pub fn shared_len(&self) -> usize {
        self.ring.len()
    }
}

struct PeerEntry {
    ring: Arc<ShareRing>,
    pinger: mpsc::Sender<Ping>,
}

/// Registry of every scheduler instance participating in a cluster.
pub struct Cluster {
    peers: Mutex<FxHashMap<String, PeerEntry>>,
}

impl Cluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            peers: Mutex::new(FxHashMap::default()),
        })
    }

    /// Publish a fresh shareable ring and pinger under `name`.
    ///
    /// Returns the ring (shared with future attachers) and the receiving
    /// end of the pinger for the owner's idle loop.
    pub fn create(
        &self,
        name: &str,
        share_limit: usize,
    ) -> Result<(Arc<ShareRing>, mpsc::Receiver<Ping>)> {
        let mut peers = self.peers.lock();
        if peers.contains_key(name) {
            return Err(anyhow!("cluster already has an instance named '{name}'"));
        }
        let ring = Arc::new(ShareRing::new(share_limit));
        let (tx, rx) = mpsc::channel(PINGER_CAPACITY);
        peers.insert(
            name.to_string(),
            PeerEntry {
                ring: ring.clone(),
                pinger: tx,
            },
        );
        debug!(name = %name, share_limit, "registered cluster instance");
        Ok((ring, rx))
    }

    /// Attach to the deque published under `name`.
    pub fn attach(&self, name: &str) -> Result<PeerHandle> {
        let peers = self.peers.lock();
        let entry = peers.get(name).ok_or_else(|| SchedulerError::PeerUnavailable {
            name: name.to_string(),
        })?;
        Ok(PeerHandle {
            name: name.to_string(),
            ring: entry.ring.clone(),
        })
    }

    /// Handles for every instance except `name`, ordered by name so each
    /// executor sees a stable rotation.
    pub fn peers_except(&self, name: &str) -> Vec<PeerHandle> {
        let peers = self.peers.lock();
        let mut handles: Vec<PeerHandle> = peers
            .iter()
            .filter(|(n, _)| n.as_str() != name)
            .map(|(n, e)| PeerHandle {
                name: n.clone(),
                ring: e.ring.clone(),
            })
            .collect();
        handles.sort_by(|a, b| a.name.cmp(&b.name));
        handles
    }

    /// Advisory wake of every peer except the sender.
    pub fn ping_peers(&self, from: &str) {
        let peers = self.peers.lock();
        for (name, entry) in peers.iter() {
            if name == from {
                continue;
            }
            // A full pinger means the peer has wakeups pending already.
            let _ = entry.pinger.try_send(Ping);
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.peers.lock().keys().cloned().collect();
        names.sort();
        names
    }
}
