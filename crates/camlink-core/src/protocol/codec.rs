//! Binary codec for the camlink message header and payload records.
//!
//! Wire format:
//! ```text
//! [msg:4][msgid:4][rc:4][data_len:4][payload:data_len]
//! ```
//! Total header size: 16 bytes. All multi-byte integers are big-endian.
//! Doubles travel as their IEEE-754 bit pattern, also big-endian.

use crate::protocol::messages::{
    CameraInfo, ExposureParms, FrameInfo, MessageHeader, RingInfo, HEADER_SIZE,
};
use thiserror::Error;

/// Errors that can occur during header or payload decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The opcode in the header is not in the table.
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u32),

    /// The payload could not be parsed (field value out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The peer declared a payload larger than this side accepts.
    #[error("payload of {declared} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge { declared: usize, limit: usize },

    /// The double encoding routine produced an unexpected bit pattern.
    #[error("double byte-order check failed: expected {expected:02X?}, got {actual:02X?}")]
    DoubleByteOrder { expected: [u8; 8], actual: [u8; 8] },
}

// ── Header ────────────────────────────────────────────────────────────────────

/// Encodes a header into its 16-byte wire form.
///
/// # Examples
///
/// ```rust
/// use camlink_core::protocol::{decode_header, encode_header, MessageHeader};
///
/// let header = MessageHeader { msg: 1, msgid: 7, rc: -1, data_len: 0 };
/// let bytes = encode_header(&header);
/// assert_eq!(decode_header(&bytes).unwrap(), header);
/// ```
pub fn encode_header(header: &MessageHeader) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[0..4].copy_from_slice(&header.msg.to_be_bytes());
    buf[4..8].copy_from_slice(&header.msgid.to_be_bytes());
    buf[8..12].copy_from_slice(&header.rc.to_be_bytes());
    buf[12..16].copy_from_slice(&header.data_len.to_be_bytes());
    buf
}

/// Decodes a header from the first 16 bytes of `bytes`.
///
/// Bytes beyond the header are ignored.  The opcode is not validated here;
/// unknown commands are a dispatch concern, not a framing one.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if fewer than 16 bytes are given.
pub fn decode_header(bytes: &[u8]) -> Result<MessageHeader, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }
    Ok(MessageHeader {
        msg: read_u32(bytes, 0)?,
        msgid: read_u32(bytes, 4)?,
        rc: read_u32(bytes, 8)? as i32,
        data_len: read_u32(bytes, 12)?,
    })
}

// ── Doubles ───────────────────────────────────────────────────────────────────

/// Reference value used by [`verify_double_byte_order`].
const DOUBLE_CHECK_VALUE: f64 = -1.5;

/// Big-endian bit pattern of [`DOUBLE_CHECK_VALUE`].
const DOUBLE_CHECK_BYTES: [u8; 8] = [0xBF, 0xF8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Appends `value` in network byte order.
pub fn encode_f64(buf: &mut Vec<u8>, value: f64) {
    buf.extend_from_slice(&value.to_bits().to_be_bytes());
}

/// Reads a network-order double at `offset`.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if the buffer is too short.
pub fn decode_f64(buf: &[u8], offset: usize) -> Result<f64, ProtocolError> {
    let bytes = take::<8>(buf, offset)?;
    Ok(f64::from_bits(u64::from_be_bytes(bytes)))
}

/// Checks the double encoding routine against a known bit pattern.
///
/// Called once at startup by both binaries so a broken build is caught
/// before any exposure parameters are exchanged.
///
/// # Errors
///
/// Returns [`ProtocolError::DoubleByteOrder`] if either direction disagrees
/// with the reference pattern.
pub fn verify_double_byte_order() -> Result<(), ProtocolError> {
    let mut encoded = Vec::with_capacity(8);
    encode_f64(&mut encoded, DOUBLE_CHECK_VALUE);
    let mut actual = [0u8; 8];
    actual.copy_from_slice(&encoded);
    if actual != DOUBLE_CHECK_BYTES {
        return Err(ProtocolError::DoubleByteOrder {
            expected: DOUBLE_CHECK_BYTES,
            actual,
        });
    }
    let decoded = decode_f64(&DOUBLE_CHECK_BYTES, 0)?;
    if decoded.to_bits() != DOUBLE_CHECK_VALUE.to_bits() {
        return Err(ProtocolError::DoubleByteOrder {
            expected: DOUBLE_CHECK_BYTES,
            actual: decoded.to_bits().to_be_bytes(),
        });
    }
    Ok(())
}

// ── Payload records ───────────────────────────────────────────────────────────

/// A structured payload with a fixed big-endian layout.
pub trait Record: Sized {
    /// Serializes the record into a fresh payload buffer.
    fn to_payload(&self) -> Vec<u8>;

    /// Parses the record from the start of `payload`.
    ///
    /// Trailing bytes after the record are left for the caller (see
    /// [`Record::encoded_len`]).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedPayload`] if the payload is short or invalid.
    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError>;

    /// Number of bytes this record occupies on the wire.
    fn encoded_len(&self) -> usize {
        self.to_payload().len()
    }
}

/// Size of an encoded [`FrameInfo`].
pub const FRAME_INFO_SIZE: usize = 4 * 4 + 8 + 8 + 3 * 4;

/// Size of an encoded [`ExposureParms`].
pub const EXPOSURE_PARMS_SIZE: usize = 6 * 8;

/// Size of an encoded [`RingInfo`].
pub const RING_INFO_SIZE: usize = 4 * 4;

impl Record for CameraInfo {
    fn to_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.model.len() + self.serial.len() + 20);
        write_length_prefixed_string(&mut buf, &self.model);
        write_length_prefixed_string(&mut buf, &self.serial);
        buf.extend_from_slice(&self.sensor_width.to_be_bytes());
        buf.extend_from_slice(&self.sensor_height.to_be_bytes());
        buf.extend_from_slice(&self.bits_per_pixel.to_be_bytes());
        encode_f64(&mut buf, self.pixel_pitch_um);
        buf
    }

    fn from_payload(p: &[u8]) -> Result<Self, ProtocolError> {
        let (model, off) = read_length_prefixed_string(p, 0)?;
        let (serial, off) = read_length_prefixed_string(p, off)?;
        // 4 (width) + 4 (height) + 4 (bpp) + 8 (pitch) = 20
        require_len(p, off + 20, "CameraInfo")?;
        Ok(CameraInfo {
            model,
            serial,
            sensor_width: read_u32(p, off)?,
            sensor_height: read_u32(p, off + 4)?,
            bits_per_pixel: read_u32(p, off + 8)?,
            pixel_pitch_um: decode_f64(p, off + 12)?,
        })
    }
}

impl Record for FrameInfo {
    fn to_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_INFO_SIZE);
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.width.to_be_bytes());
        buf.extend_from_slice(&self.height.to_be_bytes());
        buf.extend_from_slice(&self.pitch.to_be_bytes());
        buf.extend_from_slice(&self.timestamp_us.to_be_bytes());
        encode_f64(&mut buf, self.exposure_ms);
        for count in self.saturated {
            buf.extend_from_slice(&count.to_be_bytes());
        }
        buf
    }

    fn from_payload(p: &[u8]) -> Result<Self, ProtocolError> {
        require_len(p, FRAME_INFO_SIZE, "FrameInfo")?;
        Ok(FrameInfo {
            sequence: read_u32(p, 0)?,
            width: read_u32(p, 4)?,
            height: read_u32(p, 8)?,
            pitch: read_u32(p, 12)?,
            timestamp_us: read_u64(p, 16)?,
            exposure_ms: decode_f64(p, 24)?,
            saturated: [read_u32(p, 32)?, read_u32(p, 36)?, read_u32(p, 40)?],
        })
    }

    fn encoded_len(&self) -> usize {
        FRAME_INFO_SIZE
    }
}

impl Record for ExposureParms {
    fn to_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(EXPOSURE_PARMS_SIZE);
        encode_f64(&mut buf, self.exposure_ms);
        encode_f64(&mut buf, self.fps);
        encode_f64(&mut buf, self.master_gain);
        encode_f64(&mut buf, self.red_gain);
        encode_f64(&mut buf, self.green_gain);
        encode_f64(&mut buf, self.blue_gain);
        buf
    }

    fn from_payload(p: &[u8]) -> Result<Self, ProtocolError> {
        require_len(p, EXPOSURE_PARMS_SIZE, "ExposureParms")?;
        let parms = ExposureParms {
            exposure_ms: decode_f64(p, 0)?,
            fps: decode_f64(p, 8)?,
            master_gain: decode_f64(p, 16)?,
            red_gain: decode_f64(p, 24)?,
            green_gain: decode_f64(p, 32)?,
            blue_gain: decode_f64(p, 40)?,
        };
        let fields = [
            parms.exposure_ms,
            parms.fps,
            parms.master_gain,
            parms.red_gain,
            parms.green_gain,
            parms.blue_gain,
        ];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(ProtocolError::MalformedPayload(
                "ExposureParms: non-finite value".to_string(),
            ));
        }
        Ok(parms)
    }

    fn encoded_len(&self) -> usize {
        EXPOSURE_PARMS_SIZE
    }
}

impl Record for RingInfo {
    fn to_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RING_INFO_SIZE);
        buf.extend_from_slice(&self.size.to_be_bytes());
        buf.extend_from_slice(&self.valid.to_be_bytes());
        buf.extend_from_slice(&self.last.to_be_bytes());
        buf.extend_from_slice(&self.show.to_be_bytes());
        buf
    }

    fn from_payload(p: &[u8]) -> Result<Self, ProtocolError> {
        require_len(p, RING_INFO_SIZE, "RingInfo")?;
        Ok(RingInfo {
            size: read_u32(p, 0)?,
            valid: read_u32(p, 4)?,
            last: read_u32(p, 8)?,
            show: read_u32(p, 12)?,
        })
    }

    fn encoded_len(&self) -> usize {
        RING_INFO_SIZE
    }
}

// ── Request arguments ─────────────────────────────────────────────────────────

/// Encodes the single `u32` argument carried by parameterised requests
/// (ring size, frame index, wait timeout, on/off switches).
pub fn encode_argument(value: u32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Decodes a single `u32` request argument.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] if the payload is shorter than 4 bytes.
pub fn decode_argument(payload: &[u8]) -> Result<u32, ProtocolError> {
    require_len(payload, 4, "argument")?;
    read_u32(payload, 0)
}

// ── Primitive helpers ─────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn take<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N], ProtocolError> {
    let end = offset + N;
    if buf.len() < end {
        return Err(ProtocolError::InsufficientData {
            needed: end,
            available: buf.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..end]);
    Ok(out)
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    take::<4>(buf, offset).map(u32::from_be_bytes)
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, ProtocolError> {
    take::<8>(buf, offset).map(u64::from_be_bytes)
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_length_prefixed_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(u16::MAX as usize) as u16;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&bytes[..len as usize]);
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_length_prefixed_string(buf: &[u8], offset: usize) -> Result<(String, usize), ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 2 bytes for string length at offset {offset}"
        )));
    }
    let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    let start = offset + 2;
    if buf.len() < start + len {
        return Err(ProtocolError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
