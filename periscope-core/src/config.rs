//! Per-session configuration.
//!
//! A `SessionConfig` is handed to the supervisor once and is immutable
//! for the lifetime of each connection attempt.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ── AlphaPolicy ──────────────────────────────────────────────────

/// How the alpha byte of freshly-allocated pixel storage is filled.
///
/// Received pixels are stored verbatim; the policy only governs what a
/// consumer sees in regions the server has not yet painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlphaPolicy {
    /// Fill fresh storage with fully-opaque black (`0xFF000000`).
    #[default]
    Opaque,
    /// Fill fresh storage with fully-transparent black (`0x00000000`).
    Transparent,
}

impl AlphaPolicy {
    /// The pixel value fresh storage is filled with.
    pub const fn fill_value(self) -> u32 {
        match self {
            AlphaPolicy::Opaque => 0xFF00_0000,
            AlphaPolicy::Transparent => 0x0000_0000,
        }
    }
}

// ── SessionConfig ────────────────────────────────────────────────

/// Configuration for one streaming session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port (display 0 is conventionally 5900).
    pub port: u16,

    /// Password used for challenge-response authentication.
    /// `None` restricts negotiation to unauthenticated sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Allow other clients to stay connected to the same display.
    pub shared: bool,

    /// Accept lossy compression from the server.
    pub lossy: bool,

    /// Image quality hint advertised when `lossy` is set (0–9).
    pub quality: u8,

    /// Compression-level hint advertised to the server (0–9).
    pub compress_level: u8,

    /// TCP connect deadline in milliseconds.
    pub connect_timeout_ms: u64,

    /// Pause between reconnect attempts in milliseconds.
    pub retry_cooldown_ms: u64,

    /// Outbound queue depth (bytes) above which pointer events are
    /// dropped instead of buffered.
    pub send_queue_limit: usize,

    /// Alpha fill for fresh framebuffer storage.
    pub alpha: AlphaPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5900,
            password: None,
            shared: true,
            lossy: false,
            quality: 8,
            compress_level: 1,
            connect_timeout_ms: 5000,
            retry_cooldown_ms: 1000,
            send_queue_limit: 2048,
            alpha: AlphaPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Create a config for `host:port` with defaults for everything else.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Set the authentication password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Enable lossy compression with the given quality level.
    pub fn with_lossy(mut self, quality: u8) -> Self {
        self.lossy = true;
        self.quality = quality.min(9);
        self
    }

    /// Set the compression-level hint.
    pub fn with_compress_level(mut self, level: u8) -> Self {
        self.compress_level = level.min(9);
        self
    }

    /// Set the reconnect cooldown.
    pub fn with_retry_cooldown(mut self, cooldown: Duration) -> Self {
        self.retry_cooldown_ms = cooldown.as_millis() as u64;
        self
    }

    /// TCP connect deadline.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Pause between reconnect attempts.
    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_millis(self.retry_cooldown_ms)
    }
}

// ── Tests ────────────────────────────────────────────────────────
