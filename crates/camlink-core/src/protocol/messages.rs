//! Opcode table, message header, and payload record types.
//!
//! Opcode values are stable within one deployed protocol version.  Bumping
//! [`PROTOCOL_VERSION`] is required whenever a value or a payload layout
//! changes, because the client handshake is an exact-match check.

use serde::{Deserialize, Serialize};

use crate::protocol::codec::ProtocolError;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Version constant baked into both client and server.
///
/// Reported by the server in the `rc` field of a `QUERY_VERSION` reply.
pub const PROTOCOL_VERSION: u32 = 1002;

/// Size of the fixed message header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Upper bound on `data_len` accepted from a peer (64 MiB).
///
/// Large enough for a full-resolution 16-bit frame from any supported sensor.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Default TCP port of the camera control service.
pub const DEFAULT_CONTROL_PORT: u16 = 985;

/// Default UDP port on which external burst triggers are received.
pub const DEFAULT_TRIGGER_PORT: u16 = 1911;

/// Result code for a successful request.
pub const RC_OK: i32 = 0;

/// Generic failure result code.
pub const RC_FAILED: i32 = -1;

// ── Opcodes ───────────────────────────────────────────────────────────────────

/// Command opcodes carried in the `msg` header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Opcode {
    ServerEnd = 0,
    QueryVersion = 1,
    GetCameraInfo = 2,
    AcquireImage = 3,
    GetImageInfo = 4,
    GetImageData = 5,
    GetExposureParms = 6,
    SetExposureParms = 7,
    RingGetInfo = 8,
    RingGetSize = 9,
    RingSetSize = 10,
    RingGetFrameCnt = 11,
    RingImageNData = 12,
    BurstArm = 13,
    BurstAbort = 14,
    BurstStatus = 15,
    BurstWait = 16,
    LedSetState = 17,
    VideoEnable = 18,
}

impl Opcode {
    /// Wire value of this opcode.
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Opcode::ServerEnd),
            1 => Ok(Opcode::QueryVersion),
            2 => Ok(Opcode::GetCameraInfo),
            3 => Ok(Opcode::AcquireImage),
            4 => Ok(Opcode::GetImageInfo),
            5 => Ok(Opcode::GetImageData),
            6 => Ok(Opcode::GetExposureParms),
            7 => Ok(Opcode::SetExposureParms),
            8 => Ok(Opcode::RingGetInfo),
            9 => Ok(Opcode::RingGetSize),
            10 => Ok(Opcode::RingSetSize),
            11 => Ok(Opcode::RingGetFrameCnt),
            12 => Ok(Opcode::RingImageNData),
            13 => Ok(Opcode::BurstArm),
            14 => Ok(Opcode::BurstAbort),
            15 => Ok(Opcode::BurstStatus),
            16 => Ok(Opcode::BurstWait),
            17 => Ok(Opcode::LedSetState),
            18 => Ok(Opcode::VideoEnable),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

// ── Message header ────────────────────────────────────────────────────────────

/// 16-byte header prepended to every message on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Raw opcode.  Kept as a number so unrecognised commands survive decoding.
    pub msg: u32,
    /// Caller-assigned correlation tag, echoed by the server.
    pub msgid: u32,
    /// Result code: 0 = success, negative = error, otherwise opcode-specific.
    pub rc: i32,
    /// Number of payload bytes that immediately follow the header.
    pub data_len: u32,
}

impl MessageHeader {
    /// Returns the typed opcode, or `None` if `msg` is not in the table.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::try_from(self.msg).ok()
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

/// A header together with its trailing payload.
///
/// The constructors keep `header.data_len` equal to `payload.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub header: MessageHeader,
    pub payload: Vec<u8>,
}

impl Message {
    /// Builds a request with no payload.
    pub fn request(opcode: Opcode, msgid: u32) -> Self {
        Self {
            header: MessageHeader {
                msg: opcode.code(),
                msgid,
                rc: RC_OK,
                data_len: 0,
            },
            payload: Vec::new(),
        }
    }

    /// Builds the default reply to `request`: same `msg`/`msgid`, `rc = 0`, no payload.
    pub fn reply_to(request: &MessageHeader) -> Self {
        Self {
            header: MessageHeader {
                msg: request.msg,
                msgid: request.msgid,
                rc: RC_OK,
                data_len: 0,
            },
            payload: Vec::new(),
        }
    }

    /// Replaces the payload and updates `data_len` to match.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.set_payload(payload);
        self
    }

    /// Sets the result code.
    pub fn with_rc(mut self, rc: i32) -> Self {
        self.header.rc = rc;
        self
    }

    /// Replaces the payload in place and updates `data_len` to match.
    pub fn set_payload(&mut self, payload: Vec<u8>) {
        self.header.data_len = payload.len() as u32;
        self.payload = payload;
    }

    /// Drops any payload and sets `rc`.
    pub fn fail(&mut self, rc: i32) {
        self.header.rc = rc;
        self.set_payload(Vec::new());
    }

    /// Typed opcode of this message, if recognised.
    pub fn opcode(&self) -> Option<Opcode> {
        self.header.opcode()
    }
}

// ── Payload records ───────────────────────────────────────────────────────────

/// GET_CAMERA_INFO reply payload: static description of the attached camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    /// Manufacturer model string.
    pub model: String,
    /// Serial number string.
    pub serial: String,
    /// Full sensor width in pixels.
    pub sensor_width: u32,
    /// Full sensor height in pixels.
    pub sensor_height: u32,
    /// Bits per pixel of the delivered image format (8 = mono, 24 = RGB).
    pub bits_per_pixel: u32,
    /// Pixel pitch in micrometres.
    pub pixel_pitch_um: f64,
}

/// Metadata describing one acquired frame.
///
/// Returned by GET_IMAGE_INFO and as the prefix of RING_IMAGE_N_DATA replies.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameInfo {
    /// Camera-assigned frame counter.
    pub sequence: u32,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Bytes per row including any padding.
    pub pitch: u32,
    /// Capture time, microseconds since the Unix epoch.
    pub timestamp_us: u64,
    /// Exposure used for this frame in milliseconds.
    pub exposure_ms: f64,
    /// Number of saturated pixels in the red, green, and blue channels.
    pub saturated: [u32; 3],
}

impl FrameInfo {
    /// Number of pixel bytes described by this metadata (`pitch * height`).
    pub fn frame_bytes(&self) -> usize {
        self.pitch as usize * self.height as usize
    }
}

/// GET/SET_EXPOSURE_PARMS payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposureParms {
    pub exposure_ms: f64,
    pub fps: f64,
    pub master_gain: f64,
    pub red_gain: f64,
    pub green_gain: f64,
    pub blue_gain: f64,
}

impl Default for ExposureParms {
    fn default() -> Self {
        Self {
            exposure_ms: 10.0,
            fps: 20.0,
            master_gain: 1.0,
            red_gain: 1.0,
            green_gain: 1.0,
            blue_gain: 1.0,
        }
    }
}

/// RING_GET_INFO reply payload: a snapshot of the ring indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RingInfo {
    /// Capacity in frames.
    pub size: u32,
    /// Slots holding real data.
    pub valid: u32,
    /// Most recently written slot.
    pub last: u32,
    /// Slot selected for display and retrieval.
    pub show: u32,
}
