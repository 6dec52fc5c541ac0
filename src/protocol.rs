//! The receiving half of the WebSocket wire protocol.

pub mod frame;

pub use frame::{codec::FrameDecoder, Frame, FrameHeader, OpCode};
