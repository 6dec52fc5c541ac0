//! Client side of the RFC 6455 opening handshake.
//!
//! The upgrade request is written byte for byte in a fixed header order,
//! matching what the event gateways this crate targets were tested against.
//! The response is parsed with `httparse` and verified before any frame
//! decoding starts.

use std::fmt::Write;

use bytes::BytesMut;
use http::{header::HeaderName, HeaderMap, HeaderValue, Response as HttpResponse, StatusCode};
use httparse::Status;
use monoio_codec::{Decoded, Decoder};
use sha1::{Digest, Sha1};

use crate::error::{Error, ProtocolError, Result};

/// Handshake response type. The body is never read by this crate.
pub type Response = HttpResponse<()>;

/// Maximum number of headers accepted in a handshake response.
const MAX_HEADERS: usize = 124;

/// Generates a random key for the `Sec-WebSocket-Key` header.
///
/// The key is a protocol nonce used to detect misbehaving proxies, not a
/// secret; `rand::random` is more than enough for it.
pub fn generate_key() -> String {
    // a base64-encoded (see Section 4 of [RFC4648]) value that,
    // when decoded, is 16 bytes in length (RFC 6455)
    let r: [u8; 16] = rand::random();
    data_encoding::BASE64.encode(&r)
}

/// Derives the `Sec-WebSocket-Accept` value the server must echo for a given
/// `Sec-WebSocket-Key`.
pub fn derive_accept_key(request_key: &[u8]) -> String {
    // ... field is constructed by concatenating /key/ ...
    // ... with the string "258EAFA5-E914-47DA-95CA-C5AB0DC85B11" (RFC 6455)
    const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
    let mut sha1 = Sha1::default();
    sha1.update(request_key);
    sha1.update(WS_GUID);
    data_encoding::BASE64.encode(&sha1.finalize())
}

/// Writes the HTTP/1.1 upgrade request into `dst`.
///
/// Wire format, terminated by an empty line:
///
/// ```text
/// GET / HTTP/1.1
/// Host: <host>:<port>
/// User-Agent: <user_agent>
/// Upgrade: Websocket
/// Connection: Upgrade
/// Sec-WebSocket-Key: <key>
/// Sec-WebSocket-Version: 13
/// ```
pub fn write_upgrade_request(
    dst: &mut BytesMut,
    host: &str,
    port: u16,
    user_agent: &str,
    key: &str,
) {
    dst.reserve(192 + host.len() + user_agent.len());

    write!(
        dst,
        "GET / HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         User-Agent: {user_agent}\r\n\
         Upgrade: Websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    )
    .expect("Bug: formatting into BytesMut cannot fail");
}

/// Decoder for the handshake response.
///
/// Yields the number of bytes the response occupied together with the parsed
/// response, so the caller can `advance` past it and hand the remaining
/// buffered bytes to the frame decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseDecoder;

impl Decoder for ResponseDecoder {
    type Item = (usize, Response);
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Decoded<Self::Item>, Self::Error> {
        let mut hbuffer = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut resp = httparse::Response::new(&mut hbuffer);

        Ok(match resp.parse(src)? {
            Status::Partial => Decoded::Insufficient,
            Status::Complete(size) => Decoded::Some((size, response_from_httparse(resp)?)),
        })
    }
}

fn response_from_httparse(raw: httparse::Response<'_, '_>) -> Result<Response> {
    if raw.version.expect("Bug: no HTTP version") < /*1.*/1 {
        return Err(Error::Protocol(ProtocolError::WrongHttpVersion));
    }

    let mut headers = HeaderMap::with_capacity(raw.headers.len());
    for header in raw.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(http::Error::from)?;
        let value = HeaderValue::from_bytes(header.value).map_err(http::Error::from)?;
        headers.append(name, value);
    }

    let mut response = Response::new(());
    *response.status_mut() =
        StatusCode::from_u16(raw.code.expect("Bug: no HTTP status code")).map_err(http::Error::from)?;
    *response.headers_mut() = headers;
    // httparse only supports HTTP 0.9/1.0/1.1, so after the version check
    // the only possible value here is 1.1.
    *response.version_mut() = http::Version::HTTP_11;

    Ok(response)
}

/// Verifies the handshake response against the key we sent.
///
/// Checks, in order (RFC 6455, section 4.1):
/// 1. the status code is `101 Switching Protocols`,
/// 2. the `Upgrade` header is present and names `websocket`,
/// 3. the `Connection` header is present and names `Upgrade`,
/// 4. `Sec-WebSocket-Accept` matches the derived accept key.
pub fn verify_response(resp: Response, accept_key: &str) -> Result<Response> {
    if resp.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Err(Error::Http(Box::new(resp)));
    }

    let headers = resp.headers();

    if !headers
        .get("Upgrade")
        .and_then(|h| h.to_str().ok())
        .map(|h| h.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
    {
        return Err(Error::Protocol(
            ProtocolError::MissingUpgradeWebSocketHeader,
        ));
    }

    if !headers
        .get("Connection")
        .and_then(|h| h.to_str().ok())
        .map(|h| h.eq_ignore_ascii_case("Upgrade"))
        .unwrap_or(false)
    {
        return Err(Error::Protocol(
            ProtocolError::MissingConnectionUpgradeHeader,
        ));
    }

    if !headers
        .get("Sec-WebSocket-Accept")
        .map(|h| h == accept_key)
        .unwrap_or(false)
    {
        return Err(Error::Protocol(
            ProtocolError::SecWebSocketAcceptKeyMismatch,
        ));
    }

    Ok(resp)
}
