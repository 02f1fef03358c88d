// src/config/loader.rs

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::model::ClusterConfig;
use crate::config::validate::validate_config;

/// Load a cluster configuration from a given path and return the raw
/// [`ClusterConfig`].
///
/// This only performs TOML deserialization; it does **not** perform
/// semantic validation (roles, uniqueness, etc.). Use [`load_and_validate`]
/// for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ClusterConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading cluster config at {:?}", path))?;

    let config: ClusterConfig = toml::from_str(&contents)
        .with_context(|| format!("parsing TOML cluster config from {:?}", path))?;

    Ok(config)
}

/// Load a cluster configuration from path and run validation.
///
/// This is the recommended entry point for embedding applications:
/// - reads TOML,
/// - applies defaults (handled by `serde` + `Default` impls),
/// - checks role/name invariants.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ClusterConfig> {
    let config = load_from_path(&path)?;
    validate_config(&config)?;
    Ok(config)
}
