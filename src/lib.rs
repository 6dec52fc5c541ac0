//! Minimal, asynchronous WebSocket client for the [`monoio`](https://github.com/bytedance/monoio)
//! runtime that decodes incoming text frames into JSON events.
//!
//! The crate covers exactly one direction of the protocol: it opens a TCP
//! connection, performs the RFC 6455 client handshake, then turns every
//! complete text frame the server sends into a [`serde_json::Value`] handed
//! to a subscriber. It does not send data frames, negotiate close, or answer
//! pings; peers that need a full-duplex WebSocket should use a complete
//! protocol implementation instead.
//!
//! ```no_run
//! use eventsock::connect;
//!
//! #[monoio::main]
//! async fn main() -> eventsock::Result<()> {
//!     let mut client = connect("192.168.1.90", 8088).await?;
//!     let reason = client
//!         .run(&mut |event: serde_json::Value| {
//!             println!("event: {event}");
//!         })
//!         .await?;
//!     println!("disconnected: {reason}");
//!     Ok(())
//! }
//! ```

#![deny(
    missing_docs,
    unused_must_use,
    unused_mut,
    unused_imports,
    unused_import_braces
)]

pub mod error;
pub use error::{Error, MalformedFrame, Result};

pub mod client;
pub mod handshake;
pub mod protocol;

// re-export bytes since frame payloads are exposed as `Bytes`.
pub use bytes::Bytes;
pub use serde_json::Value;

pub use crate::{
    client::{
        client, client_with_config, connect, connect_with_config, ClientConfig, DisconnectReason,
        EventClient, EventHandler,
    },
    protocol::frame::{Frame, FrameHeader, OpCode},
};
