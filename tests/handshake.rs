//! Handshake tests against a real TCP listener.

use eventsock::{
    error::ProtocolError,
    handshake::derive_accept_key,
    Error,
};
use local_sync::oneshot;
use monoio::{
    io::{AsyncReadRent, AsyncWriteRentExt},
    net::{TcpListener, TcpStream},
};

/// Reads from `stream` until a blank line terminates the HTTP request.
async fn read_http_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut request = Vec::new();
    loop {
        let (res, buf) = stream.read(vec![0u8; 1024]).await;
        let n = res.expect("server failed to read request");
        assert!(n > 0, "client hung up mid-request");
        request.extend_from_slice(&buf[..n]);
        if request.windows(4).any(|w| w == b"\r\n\r\n") {
            return request;
        }
    }
}

fn header_value<'a>(request: &'a str, name: &str) -> Option<&'a str> {
    request
        .lines()
        .find_map(|line| line.strip_prefix(&format!("{name}: ")))
}

/// Accepts one connection, answers the upgrade and hands the raw request to
/// the test body.
fn spawn_upgrade_server(
    listener: TcpListener,
    request_tx: oneshot::Sender<String>,
) -> monoio::task::JoinHandle<TcpStream> {
    monoio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept failed");
        let request = read_http_request(&mut stream).await;
        let request = String::from_utf8(request).expect("request is not UTF-8");

        let key = header_value(&request, "Sec-WebSocket-Key").expect("no Sec-WebSocket-Key");
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\
             \r\n",
            derive_accept_key(key.as_bytes())
        );
        let (res, _) = stream.write_all(response.into_bytes()).await;
        res.expect("server failed to write response");

        request_tx.send(request).unwrap();
        stream
    })
}

#[monoio::test]
async fn upgrade_request_format() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();
    let server = spawn_upgrade_server(listener, tx);

    let client = eventsock::connect("127.0.0.1", addr.port()).await.unwrap();
    assert!(client.is_connected());

    let request = rx.await.unwrap();
    let mut lines = request.lines();
    assert_eq!(lines.next(), Some("GET / HTTP/1.1"));
    assert_eq!(
        header_value(&request, "Host"),
        Some(format!("127.0.0.1:{}", addr.port()).as_str())
    );
    assert!(header_value(&request, "User-Agent")
        .unwrap()
        .starts_with("eventsock/"));
    assert_eq!(header_value(&request, "Upgrade"), Some("Websocket"));
    assert_eq!(header_value(&request, "Connection"), Some("Upgrade"));
    assert_eq!(header_value(&request, "Sec-WebSocket-Version"), Some("13"));

    // 16 random bytes, base64: 24 characters ending in "==".
    let key = header_value(&request, "Sec-WebSocket-Key").unwrap();
    assert_eq!(key.len(), 24);
    assert!(key.ends_with("=="));

    server.await;
}

#[monoio::test]
async fn custom_user_agent() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();
    let server = spawn_upgrade_server(listener, tx);

    let config = eventsock::ClientConfig::default().user_agent("deconz-probe/2.1");
    eventsock::connect_with_config("127.0.0.1", addr.port(), config)
        .await
        .unwrap();

    let request = rx.await.unwrap();
    assert_eq!(header_value(&request, "User-Agent"), Some("deconz-probe/2.1"));

    server.await;
}

#[monoio::test]
async fn rejected_upgrade_surfaces_status() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    monoio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_http_request(&mut stream).await;
        let (res, _) = stream
            .write_all(&b"HTTP/1.1 404 Not Found\r\n\r\n"[..])
            .await;
        res.unwrap();
    });

    match eventsock::connect("127.0.0.1", addr.port()).await {
        Err(Error::Http(resp)) => assert_eq!(resp.status().as_u16(), 404),
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[monoio::test]
async fn wrong_accept_key_fails_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    monoio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_http_request(&mut stream).await;
        let (res, _) = stream
            .write_all(
                &b"HTTP/1.1 101 Switching Protocols\r\n\
                   Upgrade: websocket\r\n\
                   Connection: Upgrade\r\n\
                   Sec-WebSocket-Accept: bm90IHRoZSByaWdodCBrZXk=\r\n\
                   \r\n"[..],
            )
            .await;
        res.unwrap();
    });

    match eventsock::connect("127.0.0.1", addr.port()).await {
        Err(Error::Protocol(ProtocolError::SecWebSocketAcceptKeyMismatch)) => {}
        other => panic!("expected accept-key mismatch, got {other:?}"),
    }
}

#[monoio::test]
async fn connection_cut_before_response() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    monoio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_http_request(&mut stream).await;
        // Hang up without answering.
        drop(stream);
    });

    match eventsock::connect("127.0.0.1", addr.port()).await {
        Err(Error::Protocol(ProtocolError::HandshakeIncomplete)) => {}
        other => panic!("expected incomplete handshake, got {other:?}"),
    }
}

// The io_uring driver on some kernels reports connect failures on the first
// I/O instead of at connect time; the epoll driver surfaces ECONNREFUSED
// directly, which is what this test is about.
#[monoio::test(driver = "legacy")]
async fn connect_refused() {
    // Bind and drop to get a port that refuses connections.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    match eventsock::connect("127.0.0.1", addr.port()).await {
        Err(Error::Connect(_)) => {}
        other => panic!("expected connect error, got {other:?}"),
    }
}
