//! Session supervisor: owns the background execution context and the
//! retry policy, and publishes per-session shared state to consumers.
//!
//! The retry policy is deliberately simple: unconditional, unlimited,
//! with a fixed cooldown. The consumer has no other way to learn that
//! connectivity was restored, so the supervisor never gives up.
//!
//! ```text
//!  Idle ──► Connecting ──► Running ──► Idle ──► (cooldown) ──► …
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::framebuffer::{lock, DamageRect, FrameView};
use crate::session::{RfbSessionRunner, SessionRunner, SessionShared};
use crate::wire::ButtonMask;

/// The slot through which the consumer reaches the current session.
type SessionSlot = Arc<Mutex<Option<Arc<SessionShared>>>>;

// ── SupervisorPhase ──────────────────────────────────────────────

/// Where the supervisor loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupervisorPhase {
    /// No attempt in flight (startup, cooldown, or stopped).
    #[default]
    Idle,

    /// A session attempt is connecting or negotiating.
    Connecting,

    /// A session is in steady state, streaming updates.
    Running,
}

impl std::fmt::Display for SupervisorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Running => write!(f, "Running"),
        }
    }
}

// ── FrameUpdate ──────────────────────────────────────────────────

/// One drained batch of changes: the damage bounds plus a view of the
/// whole frame.
///
/// The consumer uploads the `bounds` sub-rectangle of `view` into its
/// presentation surface, then lets the update go; the view must not be
/// retained past the next drain.
#[derive(Debug, Clone)]
pub struct FrameUpdate {
    /// Bounding box of everything changed since the previous drain.
    pub bounds: DamageRect,
    /// Read-only view of the full frame.
    pub view: FrameView,
}

// ── DisplayClient ────────────────────────────────────────────────

/// The consumer-side handle: poll for updates, push pointer events.
///
/// Cheap to clone; never blocks on the network. While no session is in
/// steady state the client simply observes an empty damage region —
/// connectivity problems are not surfaced as errors here.
#[derive(Clone)]
pub struct DisplayClient {
    slot: SessionSlot,
}

impl DisplayClient {
    fn shared(&self) -> Option<Arc<SessionShared>> {
        lock(&self.slot).clone()
    }

    /// Atomically extract the accumulated damage and a frame view.
    ///
    /// `None` means nothing new this cycle — skip the upload.
    pub fn take_damage(&self) -> Option<FrameUpdate> {
        let shared = self.shared()?;
        let (bounds, view) = shared.store().take_damage();
        if bounds.is_empty() {
            return None;
        }
        Some(FrameUpdate { bounds, view })
    }

    /// Forward a pointer sample. Coordinates are bounded to the
    /// current frame geometry by the caller. Returns whether the
    /// event was enqueued; drops are normal under backpressure or
    /// while disconnected.
    pub fn push_pointer(&self, x: u16, y: u16, buttons: ButtonMask) -> bool {
        match self.shared() {
            Some(shared) => shared.push_pointer(x, y, buttons),
            None => false,
        }
    }

    /// Whether a session is currently streaming.
    pub fn is_streaming(&self) -> bool {
        self.shared().is_some_and(|shared| shared.is_steady())
    }
}

// ── Supervisor ───────────────────────────────────────────────────

/// Owns the connect → stream → teardown loop and retries it forever.
pub struct Supervisor<R: SessionRunner = RfbSessionRunner> {
    config: SessionConfig,
    runner: R,
    slot: SessionSlot,
    running: Arc<AtomicBool>,
}

impl Supervisor<RfbSessionRunner> {
    /// Supervisor with the production session runner.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_runner(config, RfbSessionRunner)
    }
}

impl<R: SessionRunner> Supervisor<R> {
    /// Supervisor with a custom runner (tests, alternative transports).
    pub fn with_runner(config: SessionConfig, runner: R) -> Self {
        Self {
            config,
            runner,
            slot: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A consumer handle. Valid across reconnects for the lifetime of
    /// the supervisor.
    pub fn client(&self) -> DisplayClient {
        DisplayClient {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Current loop phase, derived from the published session state.
    pub fn phase(&self) -> SupervisorPhase {
        if !self.running.load(Ordering::SeqCst) {
            return SupervisorPhase::Idle;
        }
        match lock(&self.slot).as_deref() {
            Some(shared) if shared.is_steady() => SupervisorPhase::Running,
            Some(_) => SupervisorPhase::Connecting,
            None => SupervisorPhase::Idle,
        }
    }

    /// A cloneable handle that can stop the loop from another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Signal the loop to stop at the next iteration boundary.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Run the supervise loop: publish fresh session state, run one
    /// session to completion, tear down, cool off, repeat. Sessions
    /// are only torn down at iteration boundaries or on I/O error —
    /// there is no mid-operation cancellation.
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);

        while self.running.load(Ordering::SeqCst) {
            let shared = Arc::new(SessionShared::new(&self.config));
            *lock(&self.slot) = Some(Arc::clone(&shared));

            info!(host = %self.config.host, port = self.config.port, "connecting");
            match self.runner.run(&self.config, shared).await {
                Ok(()) => info!("session closed"),
                Err(e) => warn!(error = %e, "session ended"),
            }
            *lock(&self.slot) = None;

            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(self.config.retry_cooldown()).await;
        }

        *lock(&self.slot) = None;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use tokio::time::Instant;

    use crate::error::ClientError;

    /// Fails every attempt immediately, recording call timestamps.
    struct FailingRunner {
        calls: Arc<AtomicUsize>,
        stamps: Arc<Mutex<Vec<Instant>>>,
    }

    #[async_trait]
    impl SessionRunner for FailingRunner {
        async fn run(
            &self,
            _config: &SessionConfig,
            _shared: Arc<SessionShared>,
        ) -> Result<(), ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            lock(&self.stamps).push(Instant::now());
            Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )))
        }
    }

    /// Reaches steady state, then holds the session open until
    /// released.
    struct SteadyRunner {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl SessionRunner for SteadyRunner {
        async fn run(
            &self,
            _config: &SessionConfig,
            shared: Arc<SessionShared>,
        ) -> Result<(), ClientError> {
            shared.store().resize(64, 48);
            shared.set_steady();
            self.release.notified().await;
            Ok(())
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(60), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn retries_indefinitely_with_cooldown() {
        let cooldown = Duration::from_secs(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let stamps = Arc::new(Mutex::new(Vec::new()));

        let supervisor = Arc::new(Supervisor::with_runner(
            SessionConfig::default().with_retry_cooldown(cooldown),
            FailingRunner {
                calls: Arc::clone(&calls),
                stamps: Arc::clone(&stamps),
            },
        ));
        let task = tokio::spawn({
            let supervisor = Arc::clone(&supervisor);
            async move { supervisor.run().await }
        });

        let counter = Arc::clone(&calls);
        wait_until(move || counter.load(Ordering::SeqCst) >= 4).await;

        let stamps = lock(&stamps).clone();
        assert!(stamps.len() >= 4);
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= cooldown);
        }

        supervisor.stop();
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn phase_follows_the_session_lifecycle() {
        let release = Arc::new(Notify::new());
        let supervisor = Arc::new(Supervisor::with_runner(
            SessionConfig::default().with_retry_cooldown(Duration::from_secs(5)),
            SteadyRunner {
                release: Arc::clone(&release),
            },
        ));
        assert_eq!(supervisor.phase(), SupervisorPhase::Idle);

        let task = tokio::spawn({
            let supervisor = Arc::clone(&supervisor);
            async move { supervisor.run().await }
        });

        let probe = Arc::clone(&supervisor);
        wait_until(move || probe.phase() == SupervisorPhase::Running).await;
        assert!(supervisor.client().is_streaming());

        // End the session; the cooldown keeps the loop idle for a while.
        release.notify_one();
        let probe = Arc::clone(&supervisor);
        wait_until(move || probe.phase() == SupervisorPhase::Idle).await;
        assert!(!supervisor.client().is_streaming());

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn client_drains_damage_through_the_slot() {
        let release = Arc::new(Notify::new());
        let supervisor = Arc::new(Supervisor::with_runner(
            SessionConfig::default(),
            SteadyRunner {
                release: Arc::clone(&release),
            },
        ));
        let client = supervisor.client();
        let task = tokio::spawn({
            let supervisor = Arc::clone(&supervisor);
            async move { supervisor.run().await }
        });

        let probe = client.clone();
        wait_until(move || probe.is_streaming()).await;

        // The resize marked the whole frame damaged.
        let update = client.take_damage().expect("damage after resize");
        assert_eq!(update.bounds, DamageRect::from_rect(0, 0, 64, 48));
        assert_eq!(update.view.width(), 64);

        // Idempotent drain.
        assert!(client.take_damage().is_none());

        supervisor.stop();
        release.notify_one();
        task.abort();
    }

    #[tokio::test]
    async fn client_without_session_sees_nothing() {
        let supervisor = Supervisor::new(SessionConfig::default());
        let client = supervisor.client();

        assert!(client.take_damage().is_none());
        assert!(!client.push_pointer(10, 10, ButtonMask::LEFT));
        assert!(!client.is_streaming());
        assert_eq!(supervisor.phase(), SupervisorPhase::Idle);
    }

    #[test]
    fn phase_display() {
        assert_eq!(SupervisorPhase::Idle.to_string(), "Idle");
        assert_eq!(SupervisorPhase::Connecting.to_string(), "Connecting");
        assert_eq!(SupervisorPhase::Running.to_string(), "Running");
    }
}
