//! Error types used by the crate.

use std::io;

use thiserror::Error;

use crate::handshake::Response;

/// Result type of all WebSocket library calls.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible WebSocket client errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to establish the TCP connection. Surfaced once, never retried
    /// by this crate.
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),
    /// Input-output error on an established connection.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// The server answered the upgrade request with something other than
    /// `101 Switching Protocols`.
    #[error("HTTP error: {}", .0.status())]
    Http(Box<Response>),
    /// The handshake response carried values the `http` types reject.
    #[error("HTTP format error: {0}")]
    HttpFormat(#[from] http::Error),
    /// The handshake response could not be parsed at all.
    #[error("HTTP parse error: {0}")]
    HttpParse(#[from] httparse::Error),
    /// WebSocket protocol violation.
    #[error("WebSocket protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// A frame payload that should carry a JSON event did not. Receiving
    /// such a frame does not close the session; the frame is dropped.
    #[error("malformed event frame: {0}")]
    MalformedFrame(#[from] MalformedFrame),
    /// A frame exceeded a configured size limit.
    #[error("space limit exceeded: {0}")]
    Capacity(#[from] CapacityError),
}

/// Indicates the specific RFC 6455 rule a peer broke.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The connection closed before a complete handshake response arrived.
    #[error("handshake not finished")]
    HandshakeIncomplete,
    /// The handshake response used an HTTP version below 1.1.
    #[error("unsupported HTTP version")]
    WrongHttpVersion,
    /// The response lacks an `Upgrade: websocket` header.
    #[error("missing, duplicated or incorrect header upgrade")]
    MissingUpgradeWebSocketHeader,
    /// The response lacks a `Connection: upgrade` header.
    #[error("missing, duplicated or incorrect header connection")]
    MissingConnectionUpgradeHeader,
    /// The `Sec-WebSocket-Accept` header does not match the key we sent.
    #[error("key mismatch in sec-websocket-accept")]
    SecWebSocketAcceptKeyMismatch,
    /// The server sent a masked frame. Server→client frames must be
    /// unmasked (RFC 6455, section 5.1).
    #[error("received a masked frame from the server")]
    MaskedFrameFromServer,
    /// One of the reserved header bits was set without a negotiated
    /// extension giving it a meaning.
    #[error("reserved bits are non-zero")]
    NonZeroReservedBits,
    /// A non-final or continuation frame arrived. Fragmented messages are
    /// outside the scope of this client.
    #[error("fragmented frames are not supported")]
    FragmentedFrame,
    /// The frame opcode is one of the reserved values.
    #[error("unknown opcode: {0}")]
    UnknownOpCode(u8),
}

/// Indicates why a frame payload could not be decoded into an event.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MalformedFrame {
    /// The payload of a text frame is not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    Utf8,
    /// The payload text is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Indicates that a size limit was exceeded.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum CapacityError {
    /// A frame announced a payload longer than the configured maximum.
    #[error("frame too long: {size} > {max_size}")]
    FrameTooLong {
        /// The announced payload length.
        size: usize,
        /// The configured limit.
        max_size: usize,
    },
}
