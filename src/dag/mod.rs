// src/dag/mod.rs

//! DAG representation.
//!
//! - [`thunk`] defines the value domain, the immutable DAG nodes and the
//!   structural fingerprint that yields stable task ids.
//! - [`graph`] indexes a submitted DAG into a dense arena with forward
//!   (`inputs`) and reverse (`dependents`) adjacency, computed once per run.

pub mod graph;
pub mod thunk;

pub use graph::{InputSlot, NodeIdx, RunGraph};
pub use thunk::{Executable, Input, NullaryFn, TaskId, Thunk, ThunkBuilder, ThunkFn, Value};
