// src/lib.rs

//! stealdag: a work-stealing scheduler for DAGs of data-parallel thunks.
//!
//! A cluster is one broker plus a set of executors sharing node-local
//! stores (metadata results, chunk pool). Each executor runs a
//! cooperative loop over its private reserved queue and a bounded
//! shareable deque peers steal from; DAG expansion keeps a producer's
//! sole consumer local for locality and offers multi-consumer inputs to
//! peers for balance.
//!
//! ```no_run
//! use std::sync::Arc;
//! use stealdag::{run_dag, ClusterConfig, Input, ThunkBuilder, Value};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let a = ThunkBuilder::literal(Value::Int(40)).build();
//! let root = ThunkBuilder::func(
//!     "add",
//!     Arc::new(|args: Vec<Value>| {
//!         Ok(Value::Int(args[0].expect_int()? + args[1].expect_int()?))
//!     }),
//!     vec![Input::Thunk(a), Input::Literal(Value::Int(2))],
//! )
//! .get_result(true)
//! .build();
//!
//! let result = run_dag(ClusterConfig::local("node1-", 2), &root).await?;
//! assert_eq!(result, Value::Int(42));
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod config;
pub mod dag;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod store;

use std::sync::Arc;

use anyhow::Result;

pub use crate::cluster::{Cluster, PeerHandle, Ping};
pub use crate::config::{ClusterConfig, ExecutorConfig, Role};
pub use crate::dag::{
    Executable, Input, NullaryFn, RunGraph, TaskId, Thunk, ThunkBuilder, ThunkFn, Value,
};
pub use crate::driver::ClusterRuntime;
pub use crate::engine::Scheduler;
pub use crate::errors::SchedulerError;
pub use crate::store::{Chunk, ChunkPool, MetaStore};

/// Build a cluster runtime from `config`, execute the DAG rooted at
/// `root` once, and return the final value.
///
/// Embedding applications that run several DAGs against the same cluster
/// should hold a [`ClusterRuntime`] and call
/// [`ClusterRuntime::submit`] directly.
pub async fn run_dag(config: ClusterConfig, root: &Arc<Thunk>) -> Result<Value> {
    let mut runtime = ClusterRuntime::new(config)?;
    runtime.submit(root).await
}
