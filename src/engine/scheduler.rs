// src/engine/scheduler.rs

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rustc_hash::FxHashSet;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cluster::{Cluster, PeerHandle};
use crate::config::model::{ExecutorConfig, Role};
use crate::dag::graph::{InputSlot, NodeIdx, RunGraph};
use crate::dag::thunk::{Executable, TaskId, Value};
use crate::engine::queue::{PushOutcome, ReservedQueue, ShareRing};
use crate::errors::SchedulerError;
use crate::store::meta::MetaStore;
use crate::store::pool::ChunkPool;

/// Per-instance scheduler state machine.
///
/// Holds the dual task queues (private reserved queue, shareable ring),
/// the per-run sets (`stolen`, `expanded`), and handles to the node-local
/// stores and the cluster registry. Brokers and executors share this type
/// and differ only in their role tag: a broker seeds work into its ring
/// and never runs the execution loop.
///
/// All methods are single-threaded with respect to one instance; the only
/// state other instances touch is the shareable ring, always under its
/// own lock.
pub struct Scheduler {
    config: ExecutorConfig,
    cluster: Arc<Cluster>,
    meta: Arc<MetaStore>,
    pool: Arc<ChunkPool>,

    /// This instance's shareable ring, registered in the cluster.
    shared: Arc<ShareRing>,
    reserved: ReservedQueue,
    /// Tasks acquired from shareable rings (peers' or our own). Grow-only
    /// within a run; drives the export decision in `exec`.
    stolen: FxHashSet<TaskId>,
    /// Tasks whose inputs have already been enqueued.
    expanded: FxHashSet<TaskId>,
    /// Cumulative count of successful shares this run.
    nshared: u64,

    graph: Option<Arc<RunGraph>>,
    peers: Vec<PeerHandle>,
    steal_cursor: usize,
    reset_task: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Register a new instance in the cluster and return it together with
    /// the receiving end of its pinger.
    pub fn new(
        config: ExecutorConfig,
        cluster: Arc<Cluster>,
        meta: Arc<MetaStore>,
        pool: Arc<ChunkPool>,
    ) -> Result<(Self, tokio::sync::mpsc::Receiver<crate::cluster::Ping>)> {
        let (shared, ping_rx) = cluster.create(&config.name, config.share_limit)?;
        let scheduler = Self {
            config,
            cluster,
            meta,
            pool,
            shared,
            reserved: ReservedQueue::new(),
            stolen: FxHashSet::default(),
            expanded: FxHashSet::default(),
            nshared: 0,
            graph: None,
            peers: Vec::new(),
            steal_cursor: 0,
            reset_task: None,
        };
        Ok((scheduler, ping_rx))
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn nshared(&self) -> u64 {
        self.nshared
    }

    pub fn root_task(&self) -> Option<TaskId> {
        self.graph.as_ref().map(|g| g.root_id())
    }

    pub fn reserved_len(&self) -> usize {
        self.reserved.len()
    }

    pub fn reserved_contains(&self, task: TaskId) -> bool {
        self.reserved.contains(task)
    }

    pub fn shared_len(&self) -> usize {
        self.shared.len()
    }

    pub fn shared_contains(&self, task: TaskId) -> bool {
        self.shared.contains(task)
    }

    pub fn is_expanded(&self, task: TaskId) -> bool {
        self.expanded.contains(&task)
    }

    pub fn was_stolen(&self, task: TaskId) -> bool {
        self.stolen.contains(&task)
    }

    /// True while the shareable ring has room for more offerings.
    /// Advisory; re-evaluated at every decision point.
    pub fn should_share(&self) -> bool {
        self.shared.len() < self.config.help_threshold
    }

    /// Begin a run: join any in-flight async reset, adopt the indexed
    /// graph, and attach to every peer currently registered.
    pub async fn init(&mut self, graph: Arc<RunGraph>) -> Result<()> {
        if let Some(handle) = self.reset_task.take() {
            handle.await.context("joining in-flight async reset")?;
        }
        self.peers = self.cluster.peers_except(&self.config.name);
        info!(
            executor = %self.config.name,
            role = ?self.config.role,
            tasks = graph.len(),
            peers = self.peers.len(),
            "initialized run"
        );
        self.graph = Some(graph);
        Ok(())
    }

    /// Clear per-run state. A plain reset leaves the metadata store's
    /// contents alone; `dropdb` additionally drops every stored result
    /// and every pooled chunk.
    pub fn reset(&mut self, dropdb: bool) {
        self.reserved.clear();
        self.shared.clear();
        self.stolen.clear();
        self.expanded.clear();
        self.nshared = 0;
        self.graph = None;
        self.peers.clear();
        self.steal_cursor = 0;
        if dropdb {
            self.meta.reset(true);
            self.pool.clear();
        }
    }

    /// Schedule the per-run state for clearing on a background task, so
    /// teardown overlaps with the driver reporting results. The next
    /// `init` joins it.
    pub fn async_reset(&mut self) {
        let reserved = std::mem::take(&mut self.reserved);
        let stolen = std::mem::take(&mut self.stolen);
        let expanded = std::mem::take(&mut self.expanded);
        let graph = self.graph.take();
        let peers = std::mem::take(&mut self.peers);
        self.shared.clear();
        self.nshared = 0;
        self.steal_cursor = 0;
        self.reset_task = Some(tokio::spawn(async move {
            drop((reserved, stolen, expanded, graph, peers));
        }));
    }

    fn run_graph(&self) -> Result<&Arc<RunGraph>> {
        self.graph
            .as_ref()
            .ok_or_else(|| anyhow!("no active run (init was not called)"))
    }

    /// Insert work into the scheduler, expanding one DAG level per unit
    /// of `depth`.
    ///
    /// Returns `true` when the task's result already exists (nothing was
    /// enqueued). Placement of recursive children: an input unique to a
    /// reserved parent stays local unless this expansion has already
    /// reserved a child for itself *and* the shareable ring wants more
    /// offerings; inputs with multiple consumers are always offered to
    /// peers, since their result will likely be wanted elsewhere.
    pub fn keep(&mut self, task: TaskId, depth: i32, isreserved: bool) -> Result<bool> {
        if self.meta.has_result(task) {
            debug!(
                executor = %self.config.name,
                task = %task.short(),
                "result cached; skipping keep"
            );
            return Ok(true);
        }
        self.enqueue(task, isreserved);

        let depth = depth - 1;
        let graph = self.run_graph()?.clone();
        let idx = graph
            .index_of(task)
            .ok_or_else(|| anyhow!("task {} is not part of the active run", task.short()))?;

        if depth >= 0 && graph.node(idx).is_func() && !self.expanded.contains(&task) {
            let mut reservedforself = false;
            for slot in graph.inputs(idx).iter() {
                // Literal and chunk inputs are not work; skip them.
                let InputSlot::Node(child) = slot else { continue };
                let child_id = graph.id_of(*child);
                let unique_consumer = graph.dependents(*child).len() < 2;
                let isthisreserved = if isreserved && unique_consumer {
                    !reservedforself || !self.should_share()
                } else {
                    false
                };
                self.keep(child_id, depth, isthisreserved)?;
                reservedforself |= isthisreserved;
            }
            self.expanded.insert(task);
        }
        Ok(false)
    }

    fn enqueue(&mut self, task: TaskId, isreserved: bool) {
        if isreserved {
            self.reserved.enqueue(task);
            return;
        }
        match self.shared.push(task) {
            PushOutcome::Pushed => {
                self.nshared += 1;
                if self.config.debug {
                    debug!(
                        executor = %self.config.name,
                        task = %task.short(),
                        shared_len = self.shared.len(),
                        "offered task to peers"
                    );
                }
                if self.config.role == Role::Executor {
                    self.cluster.ping_peers(&self.config.name);
                }
            }
            PushOutcome::Duplicate => {}
            PushOutcome::Full => {
                // The ring is at capacity; work must never be dropped, so
                // the task stays local instead.
                self.reserved.enqueue(task);
            }
        }
    }

    /// Pick the next reserved task, scanning tail to head (LIFO):
    /// first any task whose inputs still need enqueueing, then the first
    /// runnable task, then the tail regardless of runnability, which
    /// forces progress while upstream work is pending elsewhere. `None`
    /// when the queue is empty.
    pub fn reserve(&self) -> Option<TaskId> {
        let mut first_runnable = None;
        for task in self.reserved.iter_rev() {
            if !self.expanded.contains(&task) {
                return Some(task);
            }
            if first_runnable.is_none() && self.runnable(task) {
                first_runnable = Some(task);
            }
        }
        first_runnable.or_else(|| self.reserved.tail())
    }

    /// A task is runnable when its result is cached, it has no inputs to
    /// wait for, or every thunk input has a stored result.
    pub fn runnable(&self, task: TaskId) -> bool {
        if self.meta.has_result(task) {
            return true;
        }
        let Some(graph) = self.graph.as_ref() else {
            return false;
        };
        let Some(idx) = graph.index_of(task) else {
            return false;
        };
        if !graph.node(idx).is_func() {
            return true;
        }
        graph.inputs(idx).iter().all(|slot| match slot {
            InputSlot::Node(child) => self.meta.has_result(graph.id_of(*child)),
            InputSlot::Chunk(_) | InputSlot::Literal(_) => true,
        })
    }

    /// Steal from one peer's ring; records the task in `stolen`.
    pub fn steal_from(&mut self, peer: &PeerHandle) -> Option<TaskId> {
        let task = peer.steal(&self.stolen)?;
        self.stolen.insert(task);
        debug!(
            executor = %self.config.name,
            peer = %peer.name(),
            task = %task.short(),
            "stole task"
        );
        Some(task)
    }

    /// Steal from the own ring first (work this instance offered but
    /// nobody claimed), then walk peers round-robin from a rotating
    /// cursor.
    pub fn steal_any(&mut self) -> Option<TaskId> {
        if let Some(task) = self.shared.steal(&self.stolen) {
            self.stolen.insert(task);
            debug!(
                executor = %self.config.name,
                task = %task.short(),
                "reclaimed own shared task"
            );
            return Some(task);
        }
        if self.peers.is_empty() {
            return None;
        }
        let n = self.peers.len();
        for i in 0..n {
            let peer = self.peers[(self.steal_cursor + i) % n].clone();
            if let Some(task) = self.steal_from(&peer) {
                self.steal_cursor = (self.steal_cursor + i + 1) % n;
                return Some(task);
            }
        }
        None
    }

    /// Execute a runnable task and publish its result.
    ///
    /// Idempotent: a task whose result is already stored returns `true`
    /// without re-running. Stolen tasks publish cluster-visible (chunk
    /// payloads migrate to disk, the result is exported with an initial
    /// refcount of the task's dependent count); unstolen tasks publish
    /// locally. Only the winning publication reclaims consumed input
    /// chunks, so a racing duplicate producer cannot over-decrement.
    pub fn exec(&mut self, task: TaskId) -> Result<bool> {
        if self.meta.has_result(task) {
            return Ok(true);
        }
        let graph = self.run_graph()?.clone();
        let idx = graph
            .index_of(task)
            .ok_or_else(|| anyhow!("task {} is not part of the active run", task.short()))?;
        let thunk = graph.node(idx).clone();

        let value = match thunk.exec() {
            Executable::Func { label, f, .. } => {
                let args = match self.collect_args(&graph, idx, thunk.meta()) {
                    Ok(args) => args,
                    // A duplicate producer on another executor can finish
                    // this task and reclaim its inputs while we were
                    // gathering them; its publication stands, ours stops.
                    Err(_) if self.meta.has_result(task) => return Ok(true),
                    Err(err) => return Err(err),
                };
                f(args).map_err(|source| SchedulerError::UserThunkFailure {
                    label: label.clone(),
                    source,
                })?
            }
            Executable::Nullary { label, f } => {
                f().map_err(|source| SchedulerError::UserThunkFailure {
                    label: label.clone(),
                    source,
                })?
            }
            Executable::Chunk(c) => Value::Chunk(c.clone()),
            Executable::Literal(v) => v.clone(),
        };

        let mut boxed = None;
        let value = if thunk.boxes_result() {
            let cache = thunk.persist() || thunk.cache();
            let chunk = self
                .pool
                .tochunk(value, thunk.persist(), cache, &self.config.name);
            boxed = Some(chunk.clone());
            Value::Chunk(chunk)
        } else {
            value
        };

        let first_publication = if self.stolen.contains(&task) {
            let value = match value {
                Value::Chunk(c) if self.pool.is_in_process(&c) => {
                    Value::Chunk(self.pool.chunktodisk(&c)?)
                }
                other => other,
            };
            self.meta
                .export_result(task, value, graph.dependents(idx).len() as i64)
        } else {
            self.meta.set_result(task, value)
        };

        if first_publication {
            self.cleanup_inputs(&graph, idx)?;
        } else if let Some(chunk) = boxed {
            // A duplicate producer won the publication; our box would leak.
            let _ = self.pool.pooldelete(&chunk);
        }

        debug!(
            executor = %self.config.name,
            task = %task.short(),
            label = %thunk.label(),
            exported = self.stolen.contains(&task),
            "executed task"
        );
        Ok(true)
    }

    fn collect_args(&self, graph: &RunGraph, idx: NodeIdx, meta_flag: bool) -> Result<Vec<Value>> {
        let slots = graph.inputs(idx);
        let mut args = Vec::with_capacity(slots.len());
        for slot in slots.iter() {
            let value = match slot {
                InputSlot::Node(child) => self.meta.get_result(graph.id_of(*child))?,
                InputSlot::Chunk(c) => Value::Chunk(c.clone()),
                InputSlot::Literal(v) => v.clone(),
            };
            // Chunk arguments materialize unless the thunk asked for the
            // handles themselves.
            let value = match value {
                Value::Chunk(c) if !meta_flag => self.pool.collect(&c)?,
                other => other,
            };
            args.push(value);
        }
        Ok(args)
    }

    /// Reclaim input chunks this execution consumed. Inputs with a single
    /// dependent are deleted immediately (their refcount is over without
    /// asking the store); inputs with several dependents decrement the
    /// stored refcount and delete on the transition to zero.
    ///
    /// Only collected inputs are reclaimed: a `meta` thunk receives the
    /// chunk handles themselves, and deleting their payloads would hand
    /// the caller dangling handles.
    fn cleanup_inputs(&self, graph: &RunGraph, idx: NodeIdx) -> Result<()> {
        if !graph.node(idx).is_func() || graph.node(idx).meta() {
            return Ok(());
        }
        let mut seen: FxHashSet<NodeIdx> = FxHashSet::default();
        for slot in graph.inputs(idx).iter() {
            let InputSlot::Node(child) = slot else { continue };
            if !seen.insert(*child) {
                continue;
            }
            let child_id = graph.id_of(*child);
            let Value::Chunk(chunk) = self.meta.get_result(child_id)? else {
                continue;
            };
            if chunk.persist() {
                continue;
            }
            if graph.dependents(*child).len() > 1 {
                let refcount = self.meta.decr_resultrefcount(child_id)?;
                if refcount == 0 {
                    self.pool.pooldelete(&chunk)?;
                }
            } else {
                self.pool.pooldelete(&chunk)?;
            }
        }
        Ok(())
    }

    /// Finish with a task. Completed tasks leave the reserved queue;
    /// incomplete ones stay in place (the core never suspends).
    pub fn release(&mut self, task: TaskId, complete: bool) {
        if complete {
            self.reserved.dequeue(task);
        }
    }
}
