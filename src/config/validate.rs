// src/config/validate.rs

use std::collections::HashSet;

use anyhow::{anyhow, Result};

use crate::config::model::{ClusterConfig, Role};

/// Run semantic validation against a loaded cluster configuration.
///
/// This checks:
/// - there is at least one executor-role entry
/// - there is exactly one broker
/// - instance names are unique and non-empty
/// - `share_limit >= 1` and `help_threshold >= 1` for every entry
/// - `poll_interval_ms >= 1`
pub fn validate_config(cfg: &ClusterConfig) -> Result<()> {
    ensure_roles(cfg)?;
    ensure_unique_names(cfg)?;
    ensure_limits(cfg)?;
    Ok(())
}

fn ensure_roles(cfg: &ClusterConfig) -> Result<()> {
    let executors = cfg
        .executors
        .iter()
        .filter(|e| e.role == Role::Executor)
        .count();
    let brokers = cfg.executors.len() - executors;

    if executors == 0 {
        return Err(anyhow!(
            "cluster config must contain at least one executor-role [[executor]] entry"
        ));
    }
    if brokers != 1 {
        return Err(anyhow!(
            "cluster config must contain exactly one broker entry (got {brokers})"
        ));
    }
    Ok(())
}

fn ensure_unique_names(cfg: &ClusterConfig) -> Result<()> {
    let mut seen = HashSet::new();
    for exec in cfg.executors.iter() {
        if exec.name.trim().is_empty() {
            return Err(anyhow!("executor names must be non-empty"));
        }
        if !seen.insert(exec.name.as_str()) {
            return Err(anyhow!("duplicate executor name '{}'", exec.name));
        }
    }
    Ok(())
}

fn ensure_limits(cfg: &ClusterConfig) -> Result<()> {
    for exec in cfg.executors.iter() {
        if exec.share_limit == 0 {
            return Err(anyhow!(
                "executor '{}': share_limit must be >= 1 (got 0)",
                exec.name
            ));
        }
        if exec.help_threshold == 0 {
            return Err(anyhow!(
                "executor '{}': help_threshold must be >= 1 (got 0)",
                exec.name
            ));
        }
    }
    if cfg.cluster.poll_interval_ms == 0 {
        return Err(anyhow!("[cluster].poll_interval_ms must be >= 1 (got 0)"));
    }
    Ok(())
}
