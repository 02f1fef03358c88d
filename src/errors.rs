// src/errors.rs

//! Crate-wide error types.
//!
//! Most of the crate propagates `anyhow::Result`; the scheduler core
//! additionally distinguishes a small set of structured failure kinds so
//! the driver can tell a user-thunk failure from store corruption.
//!
//! Two conditions are deliberately *not* errors:
//! - "already done": `keep`/`exec` return `true` and short-circuit;
//! - "no task": `reserve`/`steal` return `None`.

use thiserror::Error;

pub use anyhow::{Error, Result};

/// Failure kinds surfaced by the scheduler core. All of them abort the
/// current run except [`SchedulerError::PeerUnavailable`], which callers
/// degrade to "no task" for that peer.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The user-supplied thunk function returned an error.
    #[error("thunk '{label}' failed")]
    UserThunkFailure {
        label: String,
        #[source]
        source: anyhow::Error,
    },

    /// A chunk handle was dereferenced but its slot is gone from the pool.
    #[error("chunk {handle} missing from pool")]
    PoolMissing { handle: u64 },

    /// A task's result was expected in the metadata store but is absent.
    #[error("no result recorded for task {task}")]
    MetaMissing { task: String },

    /// A named peer deque could not be attached.
    #[error("peer '{name}' is not registered in the cluster")]
    PeerUnavailable { name: String },
}
