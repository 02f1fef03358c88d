// src/engine/mod.rs

//! The per-executor scheduling engine.
//!
//! This module ties together:
//! - the dual task queues: the private reserved queue and the bounded
//!   shareable ring peers steal from (`queue`)
//! - the scheduler state machine: DAG expansion, reservation, stealing,
//!   execution with result placement, and refcount cleanup (`scheduler`)
//! - the cooperative executor loop driving one scheduler (`runtime`)

pub mod queue;
pub mod runtime;
pub mod scheduler;

pub use queue::{PushOutcome, ReservedQueue, ShareRing};
pub use runtime::{ExecutorLoop, LoopOptions};
pub use scheduler::Scheduler;
