// src/engine/runtime.rs

use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::cluster::Ping;
use crate::dag::thunk::TaskId;
use crate::engine::scheduler::Scheduler;

/// Options that influence the executor loop.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// How long an idle executor sleeps when no ping arrives. Pings are
    /// advisory and may be lost; this bounds the latency of rediscovering
    /// work without them.
    pub poll_interval: Duration,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2),
        }
    }
}

/// The cooperative loop driving one executor's scheduler.
///
/// Per iteration: pick a task via `reserve`; fall back to stealing; run
/// `keep`/`exec`/`release` on the pick. When the pick cannot progress
/// (its inputs are still pending on peers) the loop tries one steal so
/// upstream work parked in a shareable ring is not starved, then waits
/// for a ping or the poll interval.
///
/// The loop owns its scheduler and hands it back on shutdown so the
/// driver can reuse it for the next run.
pub struct ExecutorLoop {
    sched: Scheduler,
    ping_rx: mpsc::Receiver<Ping>,
    shutdown_rx: watch::Receiver<bool>,
    options: LoopOptions,
}

impl ExecutorLoop {
    pub fn new(
        sched: Scheduler,
        ping_rx: mpsc::Receiver<Ping>,
        shutdown_rx: watch::Receiver<bool>,
        options: LoopOptions,
    ) -> Self {
        Self {
            sched,
            ping_rx,
            shutdown_rx,
            options,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.sched
    }

    /// Drive the scheduler until shutdown is signalled. Returns the loop
    /// itself so the driver can reuse it (and its pinger) for later runs.
    pub async fn run(mut self) -> Result<Self> {
        info!(executor = %self.sched.name(), "executor loop started");

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            let picked = self.sched.reserve().or_else(|| self.sched.steal_any());
            match picked {
                Some(task) => {
                    if !self.step(task)? {
                        // The pick is blocked on upstream results; pull in
                        // shared work instead of spinning on it.
                        match self.sched.steal_any() {
                            Some(stolen) => {
                                self.step(stolen)?;
                            }
                            None => self.idle_wait().await,
                        }
                    }
                }
                None => self.idle_wait().await,
            }
        }

        info!(
            executor = %self.sched.name(),
            nshared = self.sched.nshared(),
            "executor loop stopped"
        );
        Ok(self)
    }

    /// Advance one task. Returns whether any progress was made
    /// (expansion, execution, or discovering the task already done).
    fn step(&mut self, task: TaskId) -> Result<bool> {
        let newly_expanded = !self.sched.is_expanded(task);

        if self.sched.keep(task, 1, true)? {
            // Already done elsewhere; just drop our claim.
            self.sched.release(task, true);
            return Ok(true);
        }

        if self.sched.runnable(task) {
            self.sched.exec(task)?;
            self.sched.release(task, true);
            return Ok(true);
        }

        if newly_expanded {
            debug!(
                executor = %self.sched.name(),
                task = %task.short(),
                "expanded task; inputs pending"
            );
        }
        Ok(newly_expanded)
    }

    async fn idle_wait(&mut self) {
        tokio::select! {
            ping = self.ping_rx.recv() => {
                if ping.is_some() {
                    debug!(executor = %self.sched.name(), "woken by ping");
                }
            }
            _ = self.shutdown_rx.changed() => {}
            _ = tokio::time::sleep(self.options.poll_interval) => {}
        }
    }
}
