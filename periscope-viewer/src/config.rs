//! Viewer configuration.

use std::path::Path;

use periscope_core::SessionConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ViewerConfig {
    /// Session settings passed straight to the streaming core.
    pub session: SessionConfig,
    /// Consumer-side polling.
    pub consumer: ConsumerConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Consumer-side polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// How often the damage region is drained, in milliseconds.
    pub poll_interval_ms: u64,
    /// Emit a log line for every drained update (noisy).
    pub log_updates: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (overridden by `RUST_LOG`).
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 16,
            log_updates: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ViewerConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
