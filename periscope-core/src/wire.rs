//! RFB wire-format builders and parsers.
//!
//! Client → server messages are built into [`Bytes`] buffers ready for
//! the writer task; server → client framing is parsed from fixed-size
//! headers read off the stream. All multi-byte fields are big-endian,
//! per RFC 6143. Fence and continuous-updates messages follow the
//! community extensions to the base protocol.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ClientError;

// ── Protocol constants ───────────────────────────────────────────

/// Version banner this client answers with on a 3.8 server.
pub const VERSION_3_8: &[u8; 12] = b"RFB 003.008\n";
/// Banner for 3.7 servers.
pub const VERSION_3_7: &[u8; 12] = b"RFB 003.007\n";
/// Banner for 3.3 servers.
pub const VERSION_3_3: &[u8; 12] = b"RFB 003.003\n";

/// Security type: no authentication.
pub const SECURITY_NONE: u8 = 1;
/// Security type: DES challenge-response authentication.
pub const SECURITY_VNC_AUTH: u8 = 2;

// Client → server message types.
pub const MSG_SET_PIXEL_FORMAT: u8 = 0;
pub const MSG_SET_ENCODINGS: u8 = 2;
pub const MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;
pub const MSG_POINTER_EVENT: u8 = 5;
pub const MSG_ENABLE_CONTINUOUS_UPDATES: u8 = 150;
pub const MSG_CLIENT_FENCE: u8 = 248;

// Rectangle encodings and pseudo-encodings.
pub const ENCODING_RAW: i32 = 0;
pub const ENCODING_COPY_RECT: i32 = 1;
pub const ENCODING_LAST_RECT: i32 = -224;
pub const ENCODING_DESKTOP_SIZE: i32 = -223;
pub const ENCODING_EXTENDED_DESKTOP_SIZE: i32 = -308;
pub const ENCODING_FENCE: i32 = -312;
pub const ENCODING_CONTINUOUS_UPDATES: i32 = -313;
/// Compression level 0; levels 1–9 are consecutive.
pub const ENCODING_COMPRESS_LEVEL_0: i32 = -256;
/// JPEG quality level 0; levels 1–9 are consecutive.
pub const ENCODING_QUALITY_LEVEL_0: i32 = -32;

/// Upper bound on a fence payload, per the extension.
pub const MAX_FENCE_PAYLOAD: usize = 64;

// ── ServerMessage ────────────────────────────────────────────────

/// Server → client message types this client dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMessage {
    FramebufferUpdate,
    SetColourMapEntries,
    Bell,
    ServerCutText,
    EndOfContinuousUpdates,
    ServerFence,
}

impl ServerMessage {
    /// Map the leading message byte to a known type.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::FramebufferUpdate),
            1 => Some(Self::SetColourMapEntries),
            2 => Some(Self::Bell),
            3 => Some(Self::ServerCutText),
            150 => Some(Self::EndOfContinuousUpdates),
            248 => Some(Self::ServerFence),
            _ => None,
        }
    }
}

// ── Flags ────────────────────────────────────────────────────────

bitflags::bitflags! {
    /// Flow-control fence flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FenceFlags: u32 {
        const BLOCK_BEFORE = 1;
        const BLOCK_AFTER = 2;
        const SYNC_NEXT = 4;
        const REQUEST = 0x8000_0000;
    }
}

bitflags::bitflags! {
    /// Pointer button state, one bit per button.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ButtonMask: u8 {
        const LEFT = 1;
        const MIDDLE = 2;
        const RIGHT = 4;
        const SCROLL_UP = 8;
        const SCROLL_DOWN = 16;
    }
}

// ── PixelFormat ──────────────────────────────────────────────────

/// The 16-byte pixel-format structure exchanged during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: bool,
    pub true_colour: bool,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// Encoded size on the wire.
    pub const SIZE: usize = 16;

    /// The format this client always negotiates: 32 bpp, depth 24,
    /// little-endian true colour with red in the low byte. Raw
    /// rectangles then decode directly into packed `u32` samples.
    pub const fn packed_rgbx() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian: false,
            true_colour: true,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 0,
            green_shift: 8,
            blue_shift: 16,
        }
    }

    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel as usize / 8
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.bits_per_pixel;
        buf[1] = self.depth;
        buf[2] = self.big_endian as u8;
        buf[3] = self.true_colour as u8;
        buf[4..6].copy_from_slice(&self.red_max.to_be_bytes());
        buf[6..8].copy_from_slice(&self.green_max.to_be_bytes());
        buf[8..10].copy_from_slice(&self.blue_max.to_be_bytes());
        buf[10] = self.red_shift;
        buf[11] = self.green_shift;
        buf[12] = self.blue_shift;
        // buf[13..16] is padding
        buf
    }

    /// Deserialize from wire bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ClientError> {
        if data.len() < Self::SIZE {
            return Err(ClientError::Protocol("pixel format too short"));
        }
        Ok(Self {
            bits_per_pixel: data[0],
            depth: data[1],
            big_endian: data[2] != 0,
            true_colour: data[3] != 0,
            red_max: u16::from_be_bytes([data[4], data[5]]),
            green_max: u16::from_be_bytes([data[6], data[7]]),
            blue_max: u16::from_be_bytes([data[8], data[9]]),
            red_shift: data[10],
            green_shift: data[11],
            blue_shift: data[12],
        })
    }
}

// ── Client → server builders ─────────────────────────────────────

/// Build a SetPixelFormat message (20 bytes).
pub fn set_pixel_format(format: &PixelFormat) -> Bytes {
    let mut buf = BytesMut::with_capacity(20);
    buf.put_u8(MSG_SET_PIXEL_FORMAT);
    buf.put_bytes(0, 3);
    buf.put_slice(&format.to_bytes());
    buf.freeze()
}

/// Build a SetEncodings message listing `encodings` in preference order.
pub fn set_encodings(encodings: &[i32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + encodings.len() * 4);
    buf.put_u8(MSG_SET_ENCODINGS);
    buf.put_u8(0);
    buf.put_u16(encodings.len() as u16);
    for enc in encodings {
        buf.put_i32(*enc);
    }
    buf.freeze()
}

/// Build a FramebufferUpdateRequest (10 bytes).
pub fn framebuffer_update_request(incremental: bool, x: u16, y: u16, width: u16, height: u16) -> Bytes {
    let mut buf = BytesMut::with_capacity(10);
    buf.put_u8(MSG_FRAMEBUFFER_UPDATE_REQUEST);
    buf.put_u8(incremental as u8);
    buf.put_u16(x);
    buf.put_u16(y);
    buf.put_u16(width);
    buf.put_u16(height);
    buf.freeze()
}

/// Build a PointerEvent (6 bytes).
pub fn pointer_event(buttons: ButtonMask, x: u16, y: u16) -> Bytes {
    let mut buf = BytesMut::with_capacity(6);
    buf.put_u8(MSG_POINTER_EVENT);
    buf.put_u8(buttons.bits());
    buf.put_u16(x);
    buf.put_u16(y);
    buf.freeze()
}

/// Build an EnableContinuousUpdates message (10 bytes).
pub fn enable_continuous_updates(enable: bool, x: u16, y: u16, width: u16, height: u16) -> Bytes {
    let mut buf = BytesMut::with_capacity(10);
    buf.put_u8(MSG_ENABLE_CONTINUOUS_UPDATES);
    buf.put_u8(enable as u8);
    buf.put_u16(x);
    buf.put_u16(y);
    buf.put_u16(width);
    buf.put_u16(height);
    buf.freeze()
}

/// Build a client fence message echoing `payload` with the given flags.
pub fn client_fence(flags: FenceFlags, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(9 + payload.len());
    buf.put_u8(MSG_CLIENT_FENCE);
    buf.put_bytes(0, 3);
    buf.put_u32(flags.bits());
    buf.put_u8(payload.len() as u8);
    buf.put_slice(payload);
    buf.freeze()
}

/// Build the one-byte ClientInit message.
pub fn client_init(shared: bool) -> Bytes {
    Bytes::from(vec![shared as u8])
}

// ── Server → client parsers ──────────────────────────────────────

/// The fixed-size prefix of a ServerInit message, before the name.
#[derive(Debug, Clone, Copy)]
pub struct ServerInitHeader {
    pub width: u16,
    pub height: u16,
    pub format: PixelFormat,
    pub name_len: u32,
}

impl ServerInitHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 24;

    /// Deserialize from wire bytes.
    pub fn parse(data: &[u8]) -> Result<Self, ClientError> {
        if data.len() < Self::SIZE {
            return Err(ClientError::Protocol("server init too short"));
        }
        let mut buf = &data[..];
        let width = buf.get_u16();
        let height = buf.get_u16();
        let format = PixelFormat::from_bytes(&data[4..20])?;
        buf.advance(PixelFormat::SIZE);
        let name_len = buf.get_u32();
        Ok(Self {
            width,
            height,
            format,
            name_len,
        })
    }
}

/// A rectangle header within a FramebufferUpdate message.
#[derive(Debug, Clone, Copy)]
pub struct RectHeader {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub encoding: i32,
}

impl RectHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 12;

    /// Deserialize from wire bytes.
    pub fn parse(data: &[u8]) -> Result<Self, ClientError> {
        if data.len() < Self::SIZE {
            return Err(ClientError::Protocol("rectangle header too short"));
        }
        let mut buf = &data[..];
        Ok(Self {
            x: buf.get_u16(),
            y: buf.get_u16(),
            width: buf.get_u16(),
            height: buf.get_u16(),
            encoding: buf.get_i32(),
        })
    }
}

/// Parse the 4-byte security result; zero means success.
pub fn parse_security_result(data: &[u8]) -> Result<u32, ClientError> {
    if data.len() < 4 {
        return Err(ClientError::Protocol("security result too short"));
    }
    Ok(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_pixel_format_layout() {
        let msg = set_pixel_format(&PixelFormat::packed_rgbx());
        assert_eq!(msg.len(), 20);
        assert_eq!(msg[0], MSG_SET_PIXEL_FORMAT);
        assert_eq!(&msg[4..20], &PixelFormat::packed_rgbx().to_bytes());
    }

    #[test]
    fn pixel_format_roundtrip() {
        let pf = PixelFormat::packed_rgbx();
        let decoded = PixelFormat::from_bytes(&pf.to_bytes()).unwrap();
        assert_eq!(decoded, pf);
        assert_eq!(decoded.bytes_per_pixel(), 4);
    }

    #[test]
    fn pixel_format_too_short() {
        assert!(PixelFormat::from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn set_encodings_layout() {
        let msg = set_encodings(&[ENCODING_RAW, ENCODING_COPY_RECT, ENCODING_FENCE]);
        assert_eq!(msg.len(), 4 + 3 * 4);
        assert_eq!(msg[0], MSG_SET_ENCODINGS);
        assert_eq!(u16::from_be_bytes([msg[2], msg[3]]), 3);
        let last = i32::from_be_bytes([msg[12], msg[13], msg[14], msg[15]]);
        assert_eq!(last, -312);
    }

    #[test]
    fn update_request_layout() {
        let msg = framebuffer_update_request(true, 100, 200, 300, 400);
        assert_eq!(msg.len(), 10);
        assert_eq!(msg[1], 1);
        assert_eq!(u16::from_be_bytes([msg[2], msg[3]]), 100);
        assert_eq!(u16::from_be_bytes([msg[4], msg[5]]), 200);
        assert_eq!(u16::from_be_bytes([msg[6], msg[7]]), 300);
        assert_eq!(u16::from_be_bytes([msg[8], msg[9]]), 400);

        let full = framebuffer_update_request(false, 0, 0, 10, 10);
        assert_eq!(full[1], 0);
    }

    #[test]
    fn pointer_event_layout() {
        let msg = pointer_event(ButtonMask::LEFT | ButtonMask::RIGHT, 500, 300);
        assert_eq!(msg.len(), 6);
        assert_eq!(msg[0], MSG_POINTER_EVENT);
        assert_eq!(msg[1], 5);
        assert_eq!(u16::from_be_bytes([msg[2], msg[3]]), 500);
        assert_eq!(u16::from_be_bytes([msg[4], msg[5]]), 300);
    }

    #[test]
    fn continuous_updates_layout() {
        let msg = enable_continuous_updates(true, 0, 0, 800, 600);
        assert_eq!(msg.len(), 10);
        assert_eq!(msg[0], MSG_ENABLE_CONTINUOUS_UPDATES);
        assert_eq!(msg[1], 1);
        assert_eq!(u16::from_be_bytes([msg[6], msg[7]]), 800);
    }

    #[test]
    fn fence_echo_layout() {
        let flags = FenceFlags::SYNC_NEXT;
        let msg = client_fence(flags, b"abcd");
        assert_eq!(msg.len(), 13);
        assert_eq!(msg[0], MSG_CLIENT_FENCE);
        assert_eq!(u32::from_be_bytes([msg[4], msg[5], msg[6], msg[7]]), 4);
        assert_eq!(msg[8], 4);
        assert_eq!(&msg[9..], b"abcd");
    }

    #[test]
    fn fence_request_flag_removed() {
        let flags = FenceFlags::REQUEST | FenceFlags::BLOCK_BEFORE;
        let echoed = flags.difference(FenceFlags::REQUEST);
        assert_eq!(echoed, FenceFlags::BLOCK_BEFORE);
    }

    #[test]
    fn server_init_parse() {
        let mut data = Vec::new();
        data.extend_from_slice(&800u16.to_be_bytes());
        data.extend_from_slice(&600u16.to_be_bytes());
        data.extend_from_slice(&PixelFormat::packed_rgbx().to_bytes());
        data.extend_from_slice(&4u32.to_be_bytes());

        let init = ServerInitHeader::parse(&data).unwrap();
        assert_eq!(init.width, 800);
        assert_eq!(init.height, 600);
        assert_eq!(init.format, PixelFormat::packed_rgbx());
        assert_eq!(init.name_len, 4);
    }

    #[test]
    fn server_init_too_short() {
        assert!(ServerInitHeader::parse(&[0u8; 12]).is_err());
    }

    #[test]
    fn rect_header_parse() {
        let mut data = Vec::new();
        data.extend_from_slice(&10u16.to_be_bytes());
        data.extend_from_slice(&20u16.to_be_bytes());
        data.extend_from_slice(&100u16.to_be_bytes());
        data.extend_from_slice(&200u16.to_be_bytes());
        data.extend_from_slice(&(-223i32).to_be_bytes());

        let rect = RectHeader::parse(&data).unwrap();
        assert_eq!(rect.x, 10);
        assert_eq!(rect.y, 20);
        assert_eq!(rect.width, 100);
        assert_eq!(rect.height, 200);
        assert_eq!(rect.encoding, ENCODING_DESKTOP_SIZE);
    }

    #[test]
    fn rect_header_too_short() {
        assert!(RectHeader::parse(&[0u8; 8]).is_err());
    }

    #[test]
    fn security_result_values() {
        assert_eq!(parse_security_result(&0u32.to_be_bytes()).unwrap(), 0);
        assert_eq!(parse_security_result(&1u32.to_be_bytes()).unwrap(), 1);
        assert!(parse_security_result(&[0u8; 2]).is_err());
    }

    #[test]
    fn server_message_dispatch_table() {
        assert_eq!(ServerMessage::from_byte(0), Some(ServerMessage::FramebufferUpdate));
        assert_eq!(ServerMessage::from_byte(2), Some(ServerMessage::Bell));
        assert_eq!(ServerMessage::from_byte(150), Some(ServerMessage::EndOfContinuousUpdates));
        assert_eq!(ServerMessage::from_byte(248), Some(ServerMessage::ServerFence));
        assert_eq!(ServerMessage::from_byte(99), None);
    }
}
