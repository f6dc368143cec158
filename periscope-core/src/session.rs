//! Protocol state machine: handshake, security negotiation, and the
//! steady-state receive loop.
//!
//! One session spans a single connection. Every protocol or transport
//! error is terminal to the session — there is no partial recovery —
//! and surfaces to the supervisor, which owns the retry policy.
//!
//! ```text
//!  Handshaking ──► Authenticating ──► NegotiatingFormat ──► SteadyState
//!       │                 │                    │                  │
//!       └─────────────────┴────────────────────┴──────────────────┴──► Closed
//! ```

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace};

use crate::config::SessionConfig;
use crate::error::ClientError;
use crate::framebuffer::FramebufferStore;
use crate::input;
use crate::transport::{self, WriterHandle};
use crate::wire::{
    self, ButtonMask, FenceFlags, PixelFormat, RectHeader, ServerInitHeader, ServerMessage,
    ENCODING_COMPRESS_LEVEL_0, ENCODING_CONTINUOUS_UPDATES, ENCODING_COPY_RECT,
    ENCODING_DESKTOP_SIZE, ENCODING_EXTENDED_DESKTOP_SIZE, ENCODING_FENCE, ENCODING_LAST_RECT,
    ENCODING_QUALITY_LEVEL_0, ENCODING_RAW, MAX_FENCE_PAYLOAD, SECURITY_NONE, SECURITY_VNC_AUTH,
};

/// Largest raw rectangle payload the client will buffer (a 4K full
/// frame is ~33 MB).
const MAX_RECT_BYTES: usize = 64 * 1024 * 1024;

/// Largest server-supplied string (names, refusal reasons).
const MAX_STRING_LEN: usize = 4096;

/// Largest cut-text payload read before the message is rejected.
const MAX_CUT_TEXT_LEN: usize = 16 * 1024 * 1024;

// ── SessionPhase ─────────────────────────────────────────────────

/// The current phase of one protocol session, with validated
/// transitions that return `Result` instead of panicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Exchanging version banners and security types.
    #[default]
    Handshaking,

    /// Running the selected authentication scheme.
    Authenticating,

    /// Exchanging init messages, pixel format, and encodings.
    NegotiatingFormat,

    /// Pixel updates and input events are flowing.
    SteadyState,

    /// The session is over; the supervisor decides what happens next.
    Closed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handshaking => write!(f, "Handshaking"),
            Self::Authenticating => write!(f, "Authenticating"),
            Self::NegotiatingFormat => write!(f, "NegotiatingFormat"),
            Self::SteadyState => write!(f, "SteadyState"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl SessionPhase {
    /// Transition to `Authenticating`. Valid from: `Handshaking`.
    pub fn begin_authenticating(&mut self) -> Result<(), ClientError> {
        match self {
            Self::Handshaking => {
                *self = Self::Authenticating;
                Ok(())
            }
            _ => Err(ClientError::Protocol(
                "cannot authenticate: not in Handshaking state",
            )),
        }
    }

    /// Transition to `NegotiatingFormat`. Valid from: `Authenticating`.
    pub fn begin_negotiating(&mut self) -> Result<(), ClientError> {
        match self {
            Self::Authenticating => {
                *self = Self::NegotiatingFormat;
                Ok(())
            }
            _ => Err(ClientError::Protocol(
                "cannot negotiate: not in Authenticating state",
            )),
        }
    }

    /// Transition to `SteadyState`. Valid from: `NegotiatingFormat`.
    pub fn enter_steady_state(&mut self) -> Result<(), ClientError> {
        match self {
            Self::NegotiatingFormat => {
                *self = Self::SteadyState;
                Ok(())
            }
            _ => Err(ClientError::Protocol(
                "cannot enter steady state: not in NegotiatingFormat state",
            )),
        }
    }

    /// Force the terminal state, from anywhere.
    pub fn close(&mut self) {
        *self = Self::Closed;
    }

    /// Whether pixel updates and input events are flowing.
    pub fn is_steady(&self) -> bool {
        matches!(self, Self::SteadyState)
    }
}

// ── ProtocolVersion ──────────────────────────────────────────────

/// Protocol versions this client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V3_3,
    V3_7,
    V3_8,
}

impl ProtocolVersion {
    /// Parse the server's 12-byte version banner and pick the version
    /// the client will answer with (the server's, capped at 3.8).
    pub fn from_banner(banner: &[u8; 12]) -> Result<Self, ClientError> {
        if &banner[..4] != b"RFB " || banner[7] != b'.' || banner[11] != b'\n' {
            return Err(ClientError::Protocol("invalid protocol banner"));
        }
        let digits = |range: std::ops::Range<usize>| -> Result<u32, ClientError> {
            banner[range]
                .iter()
                .try_fold(0u32, |acc, b| match b {
                    b'0'..=b'9' => Ok(acc * 10 + (b - b'0') as u32),
                    _ => Err(ClientError::Protocol("invalid protocol banner")),
                })
        };
        let major = digits(4..7)?;
        let minor = digits(8..11)?;
        Ok(match (major, minor) {
            (3, 0..=3) => Self::V3_3,
            (3, 4..=7) => Self::V3_7,
            _ => Self::V3_8,
        })
    }

    /// The banner the client sends back.
    pub fn banner(self) -> &'static [u8; 12] {
        match self {
            Self::V3_3 => wire::VERSION_3_3,
            Self::V3_7 => wire::VERSION_3_7,
            Self::V3_8 => wire::VERSION_3_8,
        }
    }
}

// ── SessionShared ────────────────────────────────────────────────

/// Per-session state shared between the background receive loop and
/// the consumer context.
///
/// The supervisor creates one of these per connection attempt and
/// publishes it into the slot the `DisplayClient` reads.
pub struct SessionShared {
    store: FramebufferStore,
    writer: OnceLock<WriterHandle>,
    steady: AtomicBool,
    send_queue_limit: usize,
}

impl SessionShared {
    /// Fresh shared state for one connection attempt.
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            store: FramebufferStore::new(config.alpha),
            writer: OnceLock::new(),
            steady: AtomicBool::new(false),
            send_queue_limit: config.send_queue_limit,
        }
    }

    /// The framebuffer store for this session.
    pub fn store(&self) -> &FramebufferStore {
        &self.store
    }

    /// The writer handle, available once the session reaches steady
    /// state.
    pub fn writer(&self) -> Option<&WriterHandle> {
        self.writer.get()
    }

    /// Publish the writer handle. Happens exactly once per session,
    /// at the hand-off from negotiation to steady state.
    pub fn publish_writer(&self, handle: WriterHandle) -> Result<(), ClientError> {
        self.writer
            .set(handle)
            .map_err(|_| ClientError::Protocol("writer handle already published"))
    }

    /// Whether the session has reached steady state.
    pub fn is_steady(&self) -> bool {
        self.steady.load(Ordering::SeqCst)
    }

    pub(crate) fn set_steady(&self) {
        self.steady.store(true, Ordering::SeqCst);
    }

    /// Forward a pointer sample toward the server, subject to the
    /// outbound backpressure gate. Returns whether the event was
    /// enqueued; a dropped event is not an error.
    pub fn push_pointer(&self, x: u16, y: u16, buttons: ButtonMask) -> bool {
        match self.writer() {
            Some(writer) => input::forward_pointer(writer, self.send_queue_limit, x, y, buttons),
            None => false,
        }
    }
}

// ── SessionRunner ────────────────────────────────────────────────

/// The unit of work the supervisor retries: one connect → stream →
/// teardown cycle.
#[async_trait]
pub trait SessionRunner: Send + Sync {
    /// Run one full session against `shared`. Any `Err` (and any
    /// `Ok`, should the server close cleanly) returns control to the
    /// supervisor.
    async fn run(
        &self,
        config: &SessionConfig,
        shared: Arc<SessionShared>,
    ) -> Result<(), ClientError>;
}

/// The production runner: TCP connect followed by the full protocol
/// session.
pub struct RfbSessionRunner;

#[async_trait]
impl SessionRunner for RfbSessionRunner {
    async fn run(
        &self,
        config: &SessionConfig,
        shared: Arc<SessionShared>,
    ) -> Result<(), ClientError> {
        let stream =
            transport::connect(&config.host, config.port, config.connect_timeout()).await?;
        run_session(stream, config, &shared).await
    }
}

// ── Session driver ───────────────────────────────────────────────

/// The encodings advertised to the server, in preference order.
pub fn encoding_preferences(config: &SessionConfig) -> Vec<i32> {
    let mut encodings = vec![
        ENCODING_RAW,
        ENCODING_COPY_RECT,
        ENCODING_LAST_RECT,
        ENCODING_DESKTOP_SIZE,
        ENCODING_EXTENDED_DESKTOP_SIZE,
        ENCODING_CONTINUOUS_UPDATES,
        ENCODING_FENCE,
        ENCODING_COMPRESS_LEVEL_0 + config.compress_level.min(9) as i32,
    ];
    if config.lossy {
        encodings.push(ENCODING_QUALITY_LEVEL_0 + config.quality.min(9) as i32);
    }
    encodings
}

/// Drive a full protocol session over an established byte stream:
/// handshake, security, format negotiation, then the steady-state
/// receive loop. Returns when the stream fails or the server violates
/// the protocol — never on its own initiative.
///
/// Generic over the stream so sessions can run over any transport
/// (tests drive it with an in-memory duplex).
pub async fn run_session<S>(
    mut stream: S,
    config: &SessionConfig,
    shared: &SessionShared,
) -> Result<(), ClientError>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut phase = SessionPhase::Handshaking;

    // ── Version handshake ────────────────────────────────────────
    let mut banner = [0u8; 12];
    stream.read_exact(&mut banner).await?;
    let version = ProtocolVersion::from_banner(&banner)?;
    stream.write_all(version.banner()).await?;
    debug!(?version, "version agreed");

    // ── Security negotiation ─────────────────────────────────────
    let security = negotiate_security(&mut stream, config, version).await?;
    phase.begin_authenticating()?;
    authenticate(&mut stream, config, version, security).await?;
    phase.begin_negotiating()?;

    // ── ClientInit / ServerInit ──────────────────────────────────
    stream.write_all(&wire::client_init(config.shared)).await?;

    let mut init_raw = [0u8; ServerInitHeader::SIZE];
    stream.read_exact(&mut init_raw).await?;
    let init = ServerInitHeader::parse(&init_raw)?;
    if init.name_len as usize > MAX_STRING_LEN {
        return Err(ClientError::Protocol("server name too long"));
    }
    let mut name_raw = vec![0u8; init.name_len as usize];
    stream.read_exact(&mut name_raw).await?;
    let name = String::from_utf8_lossy(&name_raw).into_owned();
    info!(
        width = init.width,
        height = init.height,
        name = %name,
        "session established"
    );

    shared.store().resize(init.width as u32, init.height as u32);

    // ── Format and encoding negotiation ──────────────────────────
    stream
        .write_all(&wire::set_pixel_format(&PixelFormat::packed_rgbx()))
        .await?;
    stream
        .write_all(&wire::set_encodings(&encoding_preferences(config)))
        .await?;
    stream
        .write_all(&wire::framebuffer_update_request(
            false, 0, 0, init.width, init.height,
        ))
        .await?;

    // ── Hand-off to steady state ─────────────────────────────────
    // The write half moves into the writer task; from here on every
    // outbound message (update requests, fence acks, pointer events)
    // goes through the shared handle.
    let (mut reader, write_half) = tokio::io::split(stream);
    let writer = transport::spawn_writer(write_half);
    shared.publish_writer(writer.clone())?;
    phase.enter_steady_state()?;
    shared.set_steady();

    let mut width = init.width;
    let mut height = init.height;
    let mut continuous = false;

    loop {
        let mut tag = [0u8; 1];
        reader.read_exact(&mut tag).await?;

        match ServerMessage::from_byte(tag[0]) {
            Some(ServerMessage::FramebufferUpdate) => {
                handle_framebuffer_update(
                    &mut reader,
                    shared,
                    &writer,
                    &mut width,
                    &mut height,
                    continuous,
                )
                .await?;
            }
            Some(ServerMessage::EndOfContinuousUpdates) => {
                // The server advertising this message is the signal
                // that continuous updates are available; opt in.
                continuous = true;
                writer.send(wire::enable_continuous_updates(true, 0, 0, width, height))?;
                debug!("continuous updates enabled");
            }
            Some(ServerMessage::ServerFence) => {
                handle_fence(&mut reader, &writer).await?;
            }
            Some(ServerMessage::Bell) => {}
            Some(ServerMessage::ServerCutText) => {
                discard_cut_text(&mut reader).await?;
            }
            Some(ServerMessage::SetColourMapEntries) => {
                discard_colour_map(&mut reader).await?;
            }
            None => {
                return Err(ClientError::ProtocolMsg(format!(
                    "unknown server message type {}",
                    tag[0]
                )));
            }
        }
    }
}

// ── Handshake helpers ────────────────────────────────────────────

async fn negotiate_security<S>(
    stream: &mut S,
    config: &SessionConfig,
    version: ProtocolVersion,
) -> Result<u8, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let has_password = config.password.is_some();

    if version == ProtocolVersion::V3_3 {
        // The server dictates a single scheme.
        let mut raw = [0u8; 4];
        stream.read_exact(&mut raw).await?;
        let scheme = u32::from_be_bytes(raw);
        return match scheme {
            0 => {
                let reason = read_string(stream).await?;
                Err(ClientError::ProtocolMsg(format!(
                    "server refused session: {reason}"
                )))
            }
            s if s == SECURITY_NONE as u32 || s == SECURITY_VNC_AUTH as u32 => Ok(s as u8),
            s => Err(ClientError::UnsupportedSecurity(s as u8)),
        };
    }

    // 3.7+: the server offers a list and the client picks.
    let mut count = [0u8; 1];
    stream.read_exact(&mut count).await?;
    if count[0] == 0 {
        let reason = read_string(stream).await?;
        return Err(ClientError::ProtocolMsg(format!(
            "server refused session: {reason}"
        )));
    }
    let mut offered = vec![0u8; count[0] as usize];
    stream.read_exact(&mut offered).await?;

    let chosen = crate::auth::select_security(&offered, has_password)
        .ok_or(ClientError::UnsupportedSecurity(offered[0]))?;
    stream.write_all(&[chosen]).await?;
    Ok(chosen)
}

async fn authenticate<S>(
    stream: &mut S,
    config: &SessionConfig,
    version: ProtocolVersion,
    security: u8,
) -> Result<(), ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match security {
        SECURITY_VNC_AUTH => {
            let mut challenge = [0u8; 16];
            stream.read_exact(&mut challenge).await?;
            let password = config.password.as_deref().unwrap_or("");
            let response = crate::auth::vnc_auth_response(&challenge, password);
            stream.write_all(&response).await?;
            read_security_result(stream, version).await
        }
        SECURITY_NONE => {
            // 3.8 sends a security result even for unauthenticated
            // sessions; older versions go straight to init.
            if version == ProtocolVersion::V3_8 {
                read_security_result(stream, version).await
            } else {
                Ok(())
            }
        }
        other => Err(ClientError::UnsupportedSecurity(other)),
    }
}

async fn read_security_result<S>(
    stream: &mut S,
    version: ProtocolVersion,
) -> Result<(), ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut raw = [0u8; 4];
    stream.read_exact(&mut raw).await?;
    let result = wire::parse_security_result(&raw)?;
    if result == 0 {
        return Ok(());
    }
    // 3.8 follows a failure with a reason string.
    let reason = if version == ProtocolVersion::V3_8 {
        Some(read_string(stream).await?)
    } else {
        None
    };
    crate::auth::check_security_result(result, reason)
}

/// Read a length-prefixed string (refusal reasons, names).
async fn read_string<R>(reader: &mut R) -> Result<String, ClientError>
where
    R: AsyncRead + Unpin,
{
    let mut len_raw = [0u8; 4];
    reader.read_exact(&mut len_raw).await?;
    let len = u32::from_be_bytes(len_raw) as usize;
    if len > MAX_STRING_LEN {
        return Err(ClientError::Protocol("server string too long"));
    }
    let mut raw = vec![0u8; len];
    reader.read_exact(&mut raw).await?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

// ── Steady-state message handlers ────────────────────────────────

async fn handle_framebuffer_update<R>(
    reader: &mut R,
    shared: &SessionShared,
    writer: &WriterHandle,
    width: &mut u16,
    height: &mut u16,
    continuous: bool,
) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; 3];
    reader.read_exact(&mut head).await?;
    let rect_count = u16::from_be_bytes([head[1], head[2]]);

    for _ in 0..rect_count {
        let mut raw = [0u8; RectHeader::SIZE];
        reader.read_exact(&mut raw).await?;
        let rect = RectHeader::parse(&raw)?;

        match rect.encoding {
            ENCODING_RAW => {
                let len = rect.width as usize * rect.height as usize * 4;
                if len > MAX_RECT_BYTES {
                    return Err(ClientError::Protocol("raw rectangle too large"));
                }
                let mut data = vec![0u8; len];
                reader.read_exact(&mut data).await?;

                let mut pixels = vec![0u32; len / 4];
                for (dst, chunk) in pixels.iter_mut().zip(data.chunks_exact(4)) {
                    *dst = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }
                shared.store().commit(
                    rect.x as u32,
                    rect.y as u32,
                    rect.width as u32,
                    rect.height as u32,
                    &pixels,
                );
            }
            ENCODING_COPY_RECT => {
                let mut src = [0u8; 4];
                reader.read_exact(&mut src).await?;
                let src_x = u16::from_be_bytes([src[0], src[1]]);
                let src_y = u16::from_be_bytes([src[2], src[3]]);
                shared.store().copy_rect(
                    src_x as u32,
                    src_y as u32,
                    rect.x as u32,
                    rect.y as u32,
                    rect.width as u32,
                    rect.height as u32,
                );
            }
            ENCODING_LAST_RECT => break,
            ENCODING_DESKTOP_SIZE => {
                apply_geometry(shared, writer, width, height, rect, continuous)?;
            }
            ENCODING_EXTENDED_DESKTOP_SIZE => {
                let mut screens_head = [0u8; 4];
                reader.read_exact(&mut screens_head).await?;
                let mut screens = vec![0u8; screens_head[0] as usize * 16];
                reader.read_exact(&mut screens).await?;
                apply_geometry(shared, writer, width, height, rect, continuous)?;
            }
            other => {
                return Err(ClientError::ProtocolMsg(format!(
                    "unsupported encoding {other}"
                )));
            }
        }
    }

    // End of one update cycle: unless the server pushes updates on
    // its own, ask for the next one right away to keep the pipe full.
    if !continuous {
        writer.send(wire::framebuffer_update_request(true, 0, 0, *width, *height))?;
    }
    Ok(())
}

fn apply_geometry(
    shared: &SessionShared,
    writer: &WriterHandle,
    width: &mut u16,
    height: &mut u16,
    rect: RectHeader,
    continuous: bool,
) -> Result<(), ClientError> {
    *width = rect.width;
    *height = rect.height;
    shared.store().resize(rect.width as u32, rect.height as u32);
    trace!(width = rect.width, height = rect.height, "geometry changed");

    if continuous {
        writer.send(wire::enable_continuous_updates(
            true,
            0,
            0,
            rect.width,
            rect.height,
        ))?;
    }
    Ok(())
}

/// Echo a fence carrying the request flag straight back; the server
/// uses the round-trip to pace large transfers.
async fn handle_fence<R>(reader: &mut R, writer: &WriterHandle) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; 8];
    reader.read_exact(&mut head).await?;
    let flags = FenceFlags::from_bits_retain(u32::from_be_bytes([
        head[3], head[4], head[5], head[6],
    ]));
    let len = head[7] as usize;
    if len > MAX_FENCE_PAYLOAD {
        return Err(ClientError::Protocol("fence payload too long"));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    if flags.contains(FenceFlags::REQUEST) {
        writer.send(wire::client_fence(
            flags.difference(FenceFlags::REQUEST),
            &payload,
        ))?;
    }
    Ok(())
}

async fn discard_cut_text<R>(reader: &mut R) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; 7];
    reader.read_exact(&mut head).await?;
    let len = u32::from_be_bytes([head[3], head[4], head[5], head[6]]) as usize;
    if len > MAX_CUT_TEXT_LEN {
        return Err(ClientError::Protocol("cut text too long"));
    }
    let mut text = vec![0u8; len];
    reader.read_exact(&mut text).await?;
    Ok(())
}

async fn discard_colour_map<R>(reader: &mut R) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; 5];
    reader.read_exact(&mut head).await?;
    let count = u16::from_be_bytes([head[3], head[4]]) as usize;
    let mut entries = vec![0u8; count * 6];
    reader.read_exact(&mut entries).await?;
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    #[test]
    fn phase_happy_path() {
        let mut phase = SessionPhase::default();
        assert_eq!(phase, SessionPhase::Handshaking);

        phase.begin_authenticating().unwrap();
        phase.begin_negotiating().unwrap();
        phase.enter_steady_state().unwrap();
        assert!(phase.is_steady());

        phase.close();
        assert_eq!(phase, SessionPhase::Closed);
    }

    #[test]
    fn phase_rejects_skipped_transitions() {
        let mut phase = SessionPhase::Handshaking;
        assert!(phase.begin_negotiating().is_err());
        assert!(phase.enter_steady_state().is_err());

        let mut phase = SessionPhase::SteadyState;
        assert!(phase.begin_authenticating().is_err());
    }

    #[test]
    fn phase_close_from_anywhere() {
        for mut phase in [
            SessionPhase::Handshaking,
            SessionPhase::Authenticating,
            SessionPhase::NegotiatingFormat,
            SessionPhase::SteadyState,
        ] {
            phase.close();
            assert_eq!(phase, SessionPhase::Closed);
        }
    }

    #[test]
    fn version_from_banner() {
        assert_eq!(
            ProtocolVersion::from_banner(b"RFB 003.008\n").unwrap(),
            ProtocolVersion::V3_8
        );
        assert_eq!(
            ProtocolVersion::from_banner(b"RFB 003.007\n").unwrap(),
            ProtocolVersion::V3_7
        );
        assert_eq!(
            ProtocolVersion::from_banner(b"RFB 003.003\n").unwrap(),
            ProtocolVersion::V3_3
        );
        // Newer servers are answered at the highest version we speak.
        assert_eq!(
            ProtocolVersion::from_banner(b"RFB 003.889\n").unwrap(),
            ProtocolVersion::V3_8
        );
        assert_eq!(
            ProtocolVersion::from_banner(b"RFB 004.000\n").unwrap(),
            ProtocolVersion::V3_8
        );
        assert!(ProtocolVersion::from_banner(b"HTTP/1.1 200").is_err());
    }

    #[test]
    fn encoding_preferences_reflect_config() {
        let cfg = SessionConfig::default();
        let encodings = encoding_preferences(&cfg);
        assert_eq!(encodings[0], ENCODING_RAW);
        assert!(encodings.contains(&ENCODING_COPY_RECT));
        assert!(encodings.contains(&ENCODING_FENCE));
        assert!(encodings.contains(&ENCODING_CONTINUOUS_UPDATES));
        assert!(encodings.contains(&(ENCODING_COMPRESS_LEVEL_0 + 1)));
        assert!(!encodings.iter().any(|e| (ENCODING_QUALITY_LEVEL_0..=-23).contains(e)));

        let lossy = SessionConfig::default().with_lossy(8);
        let encodings = encoding_preferences(&lossy);
        assert!(encodings.contains(&(ENCODING_QUALITY_LEVEL_0 + 8)));
    }

    #[test]
    fn writer_publishes_once() {
        let shared = SessionShared::new(&SessionConfig::default());
        assert!(shared.writer().is_none());
        assert!(!shared.is_steady());

        let (handle, _rx) = WriterHandle::channel();
        shared.publish_writer(handle.clone()).unwrap();
        assert!(shared.writer().is_some());

        let err = shared.publish_writer(handle).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn pointer_without_session_writer_is_dropped() {
        let shared = SessionShared::new(&SessionConfig::default());
        assert!(!shared.push_pointer(10, 10, ButtonMask::LEFT));
    }

    #[tokio::test]
    async fn malformed_banner_is_a_protocol_error() {
        let stream = tokio_test::io::Builder::new().read(b"HTTP/1.1 200").build();
        let config = SessionConfig::default();
        let shared = SessionShared::new(&config);

        let err = run_session(stream, &config, &shared).await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert!(!shared.is_steady());
    }

    #[tokio::test]
    async fn unsupported_security_offer_terminates_the_session() {
        let stream = tokio_test::io::Builder::new()
            .read(b"RFB 003.008\n")
            .write(b"RFB 003.008\n")
            .read(&[1, 19])
            .build();
        let config = SessionConfig::default();
        let shared = SessionShared::new(&config);

        let err = run_session(stream, &config, &shared).await.unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedSecurity(19)));
    }
}
