//! # periscope-core
//!
//! Core library for the periscope remote-framebuffer streaming client.
//!
//! This crate contains:
//! - **Supervisor**: `Supervisor` — background session lifecycle with
//!   unconditional fixed-cooldown retry, and the consumer-facing
//!   `DisplayClient` handle
//! - **Session**: `SessionPhase` state machine and the handshake →
//!   negotiation → steady-state receive loop
//! - **Framebuffer**: `FramebufferStore` — shared pixel grid plus a
//!   damage-rectangle union drained by `take_damage`
//! - **Transport**: bounded TCP connect and the writer task behind
//!   `WriterHandle`
//! - **Wire**: RFB message builders and parsers
//! - **Auth**: security-type selection and DES challenge-response
//! - **Input**: backpressure-gated pointer-event relay
//! - **Error**: `ClientError` — typed, `thiserror`-based error hierarchy
//!
//! ## Usage
//!
//! ```no_run
//! use periscope_core::{SessionConfig, Supervisor};
//!
//! # async fn example() {
//! let config = SessionConfig::new("192.168.1.20", 5900).with_password("hunter2");
//! let supervisor = Supervisor::new(config);
//! let client = supervisor.client();
//! tokio::spawn(async move { supervisor.run().await });
//!
//! // Render loop, at its own cadence:
//! if let Some(update) = client.take_damage() {
//!     let px = update.view.pixels();
//!     // upload update.bounds from px into the presentation surface
//!     # let _px = px;
//! }
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod framebuffer;
pub mod input;
pub mod session;
pub mod supervisor;
pub mod transport;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use config::{AlphaPolicy, SessionConfig};
pub use error::ClientError;
pub use framebuffer::{DamageRect, FramebufferStore, FrameView};
pub use session::{
    ProtocolVersion, RfbSessionRunner, SessionPhase, SessionRunner, SessionShared,
};
pub use supervisor::{DisplayClient, FrameUpdate, Supervisor, SupervisorPhase};
pub use transport::WriterHandle;
pub use wire::{ButtonMask, FenceFlags, PixelFormat};
