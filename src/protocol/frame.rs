//! Raw WebSocket frames and their header layout.

pub mod codec;

use bytes::Bytes;

use crate::error::{MalformedFrame, Result};

/// WebSocket frame opcode (RFC 6455, section 5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Continuation of a fragmented message.
    Continuation,
    /// Text frame.
    Text,
    /// Binary frame.
    Binary,
    /// Close control frame.
    Close,
    /// Ping control frame.
    Ping,
    /// Pong control frame.
    Pong,
    /// One of the reserved opcode values.
    Reserved(u8),
}

impl OpCode {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0x0 => OpCode::Continuation,
            0x1 => OpCode::Text,
            0x2 => OpCode::Binary,
            0x8 => OpCode::Close,
            0x9 => OpCode::Ping,
            0xA => OpCode::Pong,
            other => OpCode::Reserved(other),
        }
    }
}

/// The fixed part of a frame header.
///
/// The payload length is not stored here; the decoder uses it to slice the
/// payload out of the read buffer and the two always travel together as a
/// [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// FIN bit: this frame is the final fragment of its message.
    pub is_final: bool,
    /// First reserved bit.
    pub rsv1: bool,
    /// Second reserved bit.
    pub rsv2: bool,
    /// Third reserved bit.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// MASK bit. Always `false` in valid server→client frames.
    pub masked: bool,
}

impl FrameHeader {
    /// Parses a frame header from the start of `src`.
    ///
    /// Returns `None` when `src` does not yet hold a complete header,
    /// otherwise the header, the number of bytes it occupies and the
    /// announced payload length.
    ///
    /// Length classes (second byte, low 7 bits):
    /// * `0..=125`: the length itself, payload starts at offset 2;
    /// * `126`: 16-bit big-endian length follows, payload starts at offset 4;
    /// * `127`: 64-bit big-endian length follows, payload starts at offset 10.
    pub fn parse(src: &[u8]) -> Option<(FrameHeader, usize, u64)> {
        if src.len() < 2 {
            return None;
        }

        let first = src[0];
        let second = src[1];

        let header = FrameHeader {
            is_final: first & 0x80 != 0,
            rsv1: first & 0x40 != 0,
            rsv2: first & 0x20 != 0,
            rsv3: first & 0x10 != 0,
            opcode: OpCode::from_bits(first & 0x0F),
            masked: second & 0x80 != 0,
        };

        let (length, mut header_len) = match second & 0x7F {
            126 => {
                if src.len() < 4 {
                    return None;
                }
                (u64::from(u16::from_be_bytes([src[2], src[3]])), 4)
            }
            127 => {
                if src.len() < 10 {
                    return None;
                }
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&src[2..10]);
                (u64::from_be_bytes(bytes), 10)
            }
            small => (u64::from(small), 2),
        };

        if header.masked {
            // The 4 masking-key bytes sit between the length field and the
            // payload. They are counted so the caller can report the frame
            // boundary correctly even though masked frames are rejected.
            if src.len() < header_len + 4 {
                return None;
            }
            header_len += 4;
        }

        Some((header, header_len, length))
    }
}

/// A complete frame as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The parsed header.
    pub header: FrameHeader,
    /// The payload bytes. Their length always equals the length announced
    /// by the header.
    pub payload: Bytes,
}

impl Frame {
    /// Returns the frame opcode.
    pub fn opcode(&self) -> OpCode {
        self.header.opcode
    }

    /// Returns the payload as text, failing on invalid UTF-8.
    pub fn to_text(&self) -> Result<&str, MalformedFrame> {
        simdutf8::basic::from_utf8(&self.payload).map_err(|_| MalformedFrame::Utf8)
    }

    /// Consumes the frame and returns its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}
