// src/store/mod.rs

//! Node-local storage services shared by every scheduler on the node.
//!
//! - [`meta`] is the metadata store: per-task result slots and refcounts.
//! - [`pool`] is the chunk pool: handles to materialized values held
//!   in-process or spilled to disk.
//!
//! Neither knows about queues or peers; the scheduler core is their only
//! scheduling-aware consumer.

pub mod meta;
pub mod pool;

pub use meta::MetaStore;
pub use pool::{Chunk, ChunkPool};
