// src/config/model.rs

use serde::Deserialize;

/// Top-level cluster configuration as read from a TOML file.
///
/// ```toml
/// [cluster]
/// poll_interval_ms = 2
///
/// [[executor]]
/// name = "node1-broker"
/// role = "broker"
///
/// [[executor]]
/// name = "node1-executor1"
/// share_limit = 1024
/// help_threshold = 16
/// ```
///
/// All sections are optional and have reasonable defaults, except that a
/// usable cluster needs at least one broker and one executor entry (see
/// `validate.rs`).
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Global behaviour from `[cluster]`.
    #[serde(default)]
    pub cluster: ClusterSection,

    /// All scheduler instances from `[[executor]]`, brokers included.
    #[serde(default, rename = "executor")]
    pub executors: Vec<ExecutorConfig>,
}

/// `[cluster]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSection {
    /// Fallback wake interval for idle executor loops, in milliseconds.
    ///
    /// Pings are advisory and may be lost; this bounds how long an idle
    /// executor sleeps before re-checking its queues anyway.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    2
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Which side of the scheduling protocol an instance plays.
///
/// Both roles share the same scheduler state type; a broker seeds work
/// into its shareable deque for executors to steal and does not run an
/// execution loop of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Executor,
    Broker,
}

impl Default for Role {
    fn default() -> Self {
        Role::Executor
    }
}

/// Per-instance configuration consumed by the scheduler core.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Unique name; also the key under which the shareable deque and the
    /// pinger are published in the cluster registry.
    pub name: String,

    /// `"executor"` (default) or `"broker"`.
    #[serde(default)]
    pub role: Role,

    /// Capacity of the shareable deque.
    #[serde(default = "default_share_limit")]
    pub share_limit: usize,

    /// Soft upper bound on shareable-deque occupancy; `should_share()` is
    /// true while the deque holds fewer entries than this.
    #[serde(default = "default_help_threshold")]
    pub help_threshold: usize,

    /// Extra per-step state logging at debug level.
    #[serde(default)]
    pub debug: bool,
}

fn default_share_limit() -> usize {
    1024
}

fn default_help_threshold() -> usize {
    16
}

impl ExecutorConfig {
    /// Convenience constructor for hand-built configs (tests, embedding).
    pub fn named(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
            share_limit: default_share_limit(),
            help_threshold: default_help_threshold(),
            debug: false,
        }
    }
}

impl ClusterConfig {
    /// A local cluster: one broker plus `n` executors named
    /// `"<prefix>executor<i>"` for `i` in `1..=n`.
    pub fn local(prefix: &str, n: usize) -> Self {
        Self::with_executor_ids(prefix, &(1..=n).collect::<Vec<_>>())
    }

    /// A local cluster with an explicit executor id set, e.g. `[2, 4, 6]`.
    pub fn with_executor_ids(prefix: &str, ids: &[usize]) -> Self {
        let mut executors = vec![ExecutorConfig::named(
            format!("{prefix}broker"),
            Role::Broker,
        )];
        for id in ids {
            executors.push(ExecutorConfig::named(
                format!("{prefix}executor{id}"),
                Role::Executor,
            ));
        }
        Self {
            cluster: ClusterSection::default(),
            executors,
        }
    }
}
