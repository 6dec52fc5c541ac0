//! Connecting to an event gateway and streaming decoded JSON events.

use std::fmt;

use bytes::{Buf, BytesMut};
use log::{debug, trace, warn};
use monoio::{
    io::{stream::Stream, AsyncReadRent, AsyncWriteRent, AsyncWriteRentExt},
    net::TcpStream,
};
use monoio_codec::FramedRead;
use serde_json::Value;

use crate::{
    error::{Error, MalformedFrame, ProtocolError, Result},
    handshake::{
        derive_accept_key, generate_key, verify_response, write_upgrade_request, ResponseDecoder,
    },
    protocol::frame::{codec::FrameDecoder, OpCode},
};

/// The configuration for an event client.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    /// Value of the `User-Agent` header in the upgrade request.
    pub user_agent: String,
    /// The maximum payload size of a single incoming frame. `None` means no
    /// size limit.
    ///
    /// The default value is 16 MiB, big enough for any sane event payload
    /// but small enough to prevent memory eating by a malicious peer.
    pub max_frame_size: Option<usize>,
    /// The initial capacity of the read buffer.
    pub initial_read_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("eventsock/", env!("CARGO_PKG_VERSION")).to_owned(),
            max_frame_size: Some(16 << 20),
            initial_read_capacity: 64 * 1024,
        }
    }
}

impl ClientConfig {
    /// Sets [`Self::user_agent`].
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets [`Self::max_frame_size`].
    pub fn max_frame_size(mut self, max_frame_size: Option<usize>) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Sets [`Self::initial_read_capacity`].
    pub fn initial_read_capacity(mut self, initial_read_capacity: usize) -> Self {
        self.initial_read_capacity = initial_read_capacity;
        self
    }
}

/// Why an [`EventClient`] no longer holds a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server sent a close frame.
    CloseFrame,
    /// The transport reached end of stream without a close frame.
    EndOfStream,
    /// [`EventClient::stop`] was called locally.
    Stopped,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::CloseFrame => f.write_str("server sent a close frame"),
            DisconnectReason::EndOfStream => f.write_str("transport closed"),
            DisconnectReason::Stopped => f.write_str("stopped locally"),
        }
    }
}

/// Subscriber for decoded events and session notifications.
///
/// Implemented for any `FnMut(Value)` closure when only events matter.
/// Events are delivered one per frame, in arrival order. Panics inside the
/// handler are not caught by this crate.
pub trait EventHandler {
    /// Called once per decoded JSON event.
    fn on_event(&mut self, event: Value);

    /// Called once when the session loses its transport, with the reason.
    fn on_disconnect(&mut self, reason: DisconnectReason) {
        let _ = reason;
    }
}

impl<F> EventHandler for F
where
    F: FnMut(Value),
{
    fn on_event(&mut self, event: Value) {
        self(event)
    }
}

/// Connects to the event gateway at `host:port` and performs the WebSocket
/// handshake.
///
/// Connection establishment failures surface as [`Error::Connect`]; this
/// crate never retries.
pub async fn connect(host: &str, port: u16) -> Result<EventClient<TcpStream>> {
    connect_with_config(host, port, ClientConfig::default()).await
}

/// The same as [`connect`] but with an explicit [`ClientConfig`].
pub async fn connect_with_config(
    host: &str,
    port: u16,
    config: ClientConfig,
) -> Result<EventClient<TcpStream>> {
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(Error::Connect)?;
    client_with_config(host, port, stream, config).await
}

/// Performs the client handshake over an already-established stream.
///
/// Useful when the stream is something other than a plain [`TcpStream`],
/// e.g. an in-memory stream in tests.
pub async fn client<S>(host: &str, port: u16, stream: S) -> Result<EventClient<S>>
where
    S: AsyncReadRent + AsyncWriteRent,
{
    client_with_config(host, port, stream, ClientConfig::default()).await
}

/// The same as [`client`] but with an explicit [`ClientConfig`].
pub async fn client_with_config<S>(
    host: &str,
    port: u16,
    mut stream: S,
    config: ClientConfig,
) -> Result<EventClient<S>>
where
    S: AsyncReadRent + AsyncWriteRent,
{
    let key = generate_key();
    let accept_key = derive_accept_key(key.as_bytes());

    let mut request = BytesMut::new();
    write_upgrade_request(&mut request, host, port, &config.user_agent, &key);
    trace!("sending upgrade request to {host}:{port}");
    let (res, _) = stream.write_all(request).await;
    res?;
    stream.flush().await?;

    let mut framed = FramedRead::with_capacity(
        stream,
        FrameDecoder::new(config.max_frame_size),
        config.initial_read_capacity,
    );

    // The response and the first frames may share a transport read; whatever
    // is buffered past the response stays in place for the frame decoder, so
    // handshake bytes can never reach it.
    match framed.next_with(&mut ResponseDecoder).await {
        Some(Ok((size, resp))) => {
            framed.read_buffer_mut().advance(size);
            verify_response(resp, &accept_key)?;
        }
        Some(Err(e)) => return Err(e),
        None => return Err(Error::Protocol(ProtocolError::HandshakeIncomplete)),
    }

    debug!("handshake with {host}:{port} complete");
    Ok(EventClient {
        framed: Some(framed),
        disconnect_reason: None,
    })
}

/// A WebSocket session that yields one JSON event per incoming text frame.
///
/// Obtained from [`connect`] after a successful handshake. The transport is
/// owned exclusively by the session and released on [`stop`](Self::stop),
/// on a close frame, or when the peer disconnects.
#[derive(Debug)]
pub struct EventClient<S> {
    /// `None` once the session lost or gave up its transport.
    framed: Option<FramedRead<S, FrameDecoder>>,
    disconnect_reason: Option<DisconnectReason>,
}

impl<S> EventClient<S>
where
    S: AsyncReadRent + AsyncWriteRent,
{
    /// Wraps a raw stream without performing a handshake.
    ///
    /// The stream must already speak WebSocket, i.e. the upgrade exchange
    /// happened elsewhere.
    pub fn from_raw_stream(stream: S, config: ClientConfig) -> Self {
        Self {
            framed: Some(FramedRead::with_capacity(
                stream,
                FrameDecoder::new(config.max_frame_size),
                config.initial_read_capacity,
            )),
            disconnect_reason: None,
        }
    }

    /// Returns `true` while the session holds a transport.
    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Why the transport was released, once it has been.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.disconnect_reason
    }

    /// Reads frames until one yields a JSON event.
    ///
    /// Returns `Ok(None)` once the session has no transport anymore; the
    /// cause is available from [`disconnect_reason`](Self::disconnect_reason).
    /// Binary, ping and pong frames are skipped. A close frame releases the
    /// transport without a closing handshake.
    ///
    /// A frame whose payload is not UTF-8 JSON fails with
    /// [`Error::MalformedFrame`] and is dropped; the session stays connected
    /// and the next call reads on. All other errors release the transport.
    pub async fn next_event(&mut self) -> Result<Option<Value>> {
        loop {
            let Some(framed) = self.framed.as_mut() else {
                return Ok(None);
            };

            match framed.next().await {
                Some(Ok(frame)) => match frame.opcode() {
                    OpCode::Text | OpCode::Binary if !frame.header.is_final => {
                        self.release(None);
                        return Err(Error::Protocol(ProtocolError::FragmentedFrame));
                    }
                    OpCode::Continuation => {
                        self.release(None);
                        return Err(Error::Protocol(ProtocolError::FragmentedFrame));
                    }
                    OpCode::Text => {
                        let event = serde_json::from_str(frame.to_text()?)
                            .map_err(MalformedFrame::Json)?;
                        return Ok(Some(event));
                    }
                    OpCode::Binary => {
                        debug!("skipping binary frame ({} bytes)", frame.payload.len());
                    }
                    OpCode::Ping | OpCode::Pong => {
                        trace!("skipping {:?} frame", frame.opcode());
                    }
                    OpCode::Close => {
                        debug!("server sent close frame");
                        self.release(Some(DisconnectReason::CloseFrame));
                        return Ok(None);
                    }
                    OpCode::Reserved(code) => {
                        self.release(None);
                        return Err(Error::Protocol(ProtocolError::UnknownOpCode(code)));
                    }
                },

                Some(Err(e)) => {
                    self.release(None);
                    return Err(e);
                }

                // End of stream: the peer went away without a close frame.
                None => {
                    self.release(Some(DisconnectReason::EndOfStream));
                    return Ok(None);
                }
            }
        }
    }

    /// Delivers events to `handler` until the session ends.
    ///
    /// One [`EventHandler::on_event`] call per frame, in arrival order.
    /// Malformed payloads are logged and skipped without ending the session.
    /// When the transport goes away, [`EventHandler::on_disconnect`] fires
    /// once and the reason is returned. Fatal errors are returned as-is;
    /// reconnecting is the caller's policy, not this crate's.
    pub async fn run<H>(&mut self, handler: &mut H) -> Result<DisconnectReason>
    where
        H: EventHandler + ?Sized,
    {
        loop {
            match self.next_event().await {
                Ok(Some(event)) => handler.on_event(event),
                Ok(None) => {
                    let reason = self
                        .disconnect_reason
                        .unwrap_or(DisconnectReason::EndOfStream);
                    handler.on_disconnect(reason);
                    return Ok(reason);
                }
                Err(Error::MalformedFrame(e)) => {
                    warn!("dropping frame with undecodable payload: {e}");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Shuts the transport down and releases it.
    ///
    /// Does nothing when the session is already closed or never held a
    /// transport, so calling it repeatedly is fine. An in-flight connect
    /// attempt cannot be cancelled this way; only an established session
    /// can be stopped.
    pub async fn stop(&mut self) {
        if let Some(mut framed) = self.framed.take() {
            self.disconnect_reason
                .get_or_insert(DisconnectReason::Stopped);
            if let Err(e) = framed.get_mut().shutdown().await {
                debug!("shutdown after stop failed: {e}");
            }
        }
    }

    /// Drops the transport, keeping the first recorded reason.
    fn release(&mut self, reason: Option<DisconnectReason>) {
        if self.framed.take().is_some() {
            if let Some(reason) = reason {
                self.disconnect_reason.get_or_insert(reason);
            }
        }
    }
}
