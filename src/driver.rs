// src/driver.rs

//! Run driver: owns the cluster-wide services and the scheduler
//! instances, submits root thunks, and collects final results.
//!
//! The driver is deliberately thin. Per run it indexes the DAG, inits
//! every scheduler, seeds the root into the broker's shareable ring, and
//! spawns the executor loops; the scheduling itself is entirely the
//! engine's business. A run completes when the root's result appears in
//! the metadata store, or aborts when any executor loop fails.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cluster::Cluster;
use crate::config::model::{ClusterConfig, Role};
use crate::config::validate::validate_config;
use crate::dag::graph::RunGraph;
use crate::dag::thunk::{TaskId, Thunk, Value};
use crate::engine::runtime::{ExecutorLoop, LoopOptions};
use crate::engine::scheduler::Scheduler;
use crate::store::meta::MetaStore;
use crate::store::pool::ChunkPool;

const ROOT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A running cluster: one broker scheduler plus one executor loop per
/// executor-role config entry, all over shared node-local stores.
pub struct ClusterRuntime {
    cluster: Arc<Cluster>,
    meta: Arc<MetaStore>,
    pool: Arc<ChunkPool>,
    broker: Scheduler,
    loops: Vec<Option<ExecutorLoop>>,
    shutdown_tx: watch::Sender<bool>,
}

impl ClusterRuntime {
    pub fn new(config: ClusterConfig) -> Result<Self> {
        validate_config(&config)?;

        let cluster = Cluster::new();
        let meta = Arc::new(MetaStore::new());
        let pool = Arc::new(ChunkPool::new()?);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let options = LoopOptions {
            poll_interval: Duration::from_millis(config.cluster.poll_interval_ms),
        };

        let mut broker = None;
        let mut loops = Vec::new();
        for exec_cfg in config.executors.iter().cloned() {
            let role = exec_cfg.role;
            let (sched, ping_rx) =
                Scheduler::new(exec_cfg, cluster.clone(), meta.clone(), pool.clone())?;
            match role {
                Role::Broker => {
                    // The broker drives dispatching and runs no loop; its
                    // pinger is unused.
                    broker = Some(sched);
                }
                Role::Executor => {
                    loops.push(Some(ExecutorLoop::new(
                        sched,
                        ping_rx,
                        shutdown_rx.clone(),
                        options.clone(),
                    )));
                }
            }
        }

        let broker = broker.ok_or_else(|| anyhow!("cluster config has no broker entry"))?;
        info!(
            broker = %broker.name(),
            executors = loops.len(),
            "cluster runtime ready"
        );

        Ok(Self {
            cluster,
            meta,
            pool,
            broker,
            loops,
            shutdown_tx,
        })
    }

    pub fn meta(&self) -> &Arc<MetaStore> {
        &self.meta
    }

    pub fn pool(&self) -> &Arc<ChunkPool> {
        &self.pool
    }

    pub fn executor_names(&self) -> Vec<String> {
        self.cluster.names()
    }

    /// Execute the DAG rooted at `root` and return its final value.
    pub async fn submit(&mut self, root: &Arc<Thunk>) -> Result<Value> {
        let graph = Arc::new(RunGraph::build(root).context("indexing submitted DAG")?);
        let root_id = graph.root_id();
        info!(root = %root_id.short(), tasks = graph.len(), "submitting run");

        self.broker.init(graph.clone()).await?;
        for slot in self.loops.iter_mut() {
            let executor = slot
                .as_mut()
                .ok_or_else(|| anyhow!("executor loop missing; a previous run aborted"))?;
            executor.scheduler_mut().init(graph.clone()).await?;
        }

        // Seed the broker's ring; a cached root result short-circuits the
        // whole run.
        let already_done = self.broker.keep(root_id, 1, false)?;
        let value = if already_done {
            self.meta.get_result(root_id)?
        } else {
            self.run_to_completion(root_id).await?
        };

        // Overlap per-run teardown with the caller consuming the result.
        self.broker.async_reset();
        for slot in self.loops.iter_mut().flatten() {
            slot.scheduler_mut().async_reset();
        }

        let value = match value {
            Value::Chunk(c) if !root.get_result() => self
                .pool
                .collect(&c)
                .context("materializing the root result")?,
            other => other,
        };
        Ok(value)
    }

    async fn run_to_completion(&mut self, root_id: TaskId) -> Result<Value> {
        self.shutdown_tx
            .send(false)
            .context("resetting shutdown signal")?;

        let mut handles: Vec<JoinHandle<Result<ExecutorLoop>>> = Vec::new();
        for slot in self.loops.iter_mut() {
            let executor = slot
                .take()
                .ok_or_else(|| anyhow!("executor loop missing; a previous run aborted"))?;
            handles.push(tokio::spawn(executor.run()));
        }
        self.cluster.ping_peers(self.broker.name());

        let run_result = self.wait_for_root(root_id, &handles).await;

        // Stop the loops and recover them for the next run, surfacing the
        // first executor failure if any.
        let _ = self.shutdown_tx.send(true);
        let mut first_error = None;
        for (i, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(executor)) => self.loops[i] = Some(executor),
                Ok(Err(err)) => {
                    warn!(error = %err, "executor loop aborted");
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    first_error.get_or_insert(anyhow!("executor loop panicked: {join_err}"));
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        run_result?;

        self.meta.get_result(root_id)
    }

    async fn wait_for_root(
        &self,
        root_id: TaskId,
        handles: &[JoinHandle<Result<ExecutorLoop>>],
    ) -> Result<()> {
        loop {
            if self.meta.has_result(root_id) {
                return Ok(());
            }
            if handles.iter().any(|h| h.is_finished()) {
                return Err(anyhow!(
                    "an executor loop exited before the root result appeared"
                ));
            }
            tokio::time::sleep(ROOT_POLL_INTERVAL).await;
        }
    }

    /// Synchronously clear per-run scheduler state; `dropdb` also drops
    /// every stored result and pooled chunk.
    pub fn reset(&mut self, dropdb: bool) {
        self.broker.reset(dropdb);
        for slot in self.loops.iter_mut().flatten() {
            slot.scheduler_mut().reset(false);
        }
    }
}
