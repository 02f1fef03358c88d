// src/logging.rs

//! Logging setup for `stealdag` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. the explicit level passed by the caller (if any)
//! 2. `STEALDAG_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`

use anyhow::Result;
use tracing_subscriber::fmt;

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup; library consumers embedding stealdag in a
/// larger application will usually install their own subscriber instead.
pub fn init_logging(level: Option<tracing::Level>) -> Result<()> {
    let level = match level {
        Some(lvl) => lvl,
        None => std::env::var("STEALDAG_LOG")
            .ok()
            .and_then(|s| parse_level_str(&s))
            .unwrap_or(tracing::Level::INFO),
    };

    // `init()` panics if a subscriber is already installed; we only call
    // this once from the embedding process.
    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    Ok(())
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
