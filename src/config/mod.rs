// src/config/mod.rs

//! Configuration loading and validation for stealdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a cluster config file from disk (`loader.rs`).
//! - Validate basic invariants like name uniqueness and roles (`validate.rs`).
//!
//! The scheduler core only ever sees [`ExecutorConfig`] structs; how they
//! were produced (TOML file, hand-built in tests, embedding application)
//! is this module's concern alone.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ClusterConfig, ClusterSection, ExecutorConfig, Role};
pub use validate::validate_config;
