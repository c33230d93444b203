//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use gannet::bus::LogQueueService;
use gannet::farm::Farm;
use gannet::lifecycle::Shutdown;
use gannet::proxy::ProxyServer;

/// Spawn the proxy over `farm` on an ephemeral port. The returned
/// `Shutdown` keeps the server alive until dropped or triggered.
#[allow(dead_code)]
pub async fn start_proxy(farm: Arc<Farm>) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = ProxyServer::new(farm, Arc::new(LogQueueService), 128);
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    (addr, shutdown)
}

/// Start a mock backend that returns a fixed 200 response.
#[allow(dead_code)]
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    serve_with(move |_head, _body| {
        let body = body.to_string();
        async move { (200, body) }
    })
    .await
}

/// Start a mock backend that echoes the request body back.
#[allow(dead_code)]
pub async fn start_echo_backend() -> SocketAddr {
    serve_with(|_head, body| async move { (200, String::from_utf8_lossy(&body).to_string()) })
        .await
}

/// Start a mock backend that returns the value of one request header as
/// the response body (empty when absent).
#[allow(dead_code)]
pub async fn start_header_reflecting_backend(header: &'static str) -> SocketAddr {
    serve_with(move |head, _body| {
        let value = header_value(&head, header).unwrap_or_default();
        async move { (200, value) }
    })
    .await
}

/// Accept loop: one request per connection, handled by `f`.
#[allow(dead_code)]
pub async fn serve_with<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String, Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        if let Some((head, body)) = read_request(&mut socket).await {
                            let (status, response_body) = f(head, body).await;
                            let status_text = match status {
                                200 => "200 OK",
                                404 => "404 Not Found",
                                500 => "500 Internal Server Error",
                                502 => "502 Bad Gateway",
                                503 => "503 Service Unavailable",
                                _ => "200 OK",
                            };
                            let response = format!(
                                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                                status_text,
                                response_body.len(),
                                response_body
                            );
                            let _ = socket.write_all(response.as_bytes()).await;
                        }
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Read one HTTP/1.1 request: the raw header block and the body, sized by
/// Content-Length. Chunked request bodies are not supported by the mocks.
async fn read_request(socket: &mut TcpStream) -> Option<(String, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut tmp).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        if buf.len() > 64 * 1024 {
            return None;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = header_value(&head, "content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut tmp).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&tmp[..n]);
    }
    Some((head, body))
}

/// Case-insensitive header lookup in a raw header block.
#[allow(dead_code)]
pub fn header_value(head: &str, name: &str) -> Option<String> {
    head.lines().find_map(|line| {
        let (header, value) = line.split_once(':')?;
        if header.trim().eq_ignore_ascii_case(name) {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// A listener bound then dropped: connecting to this address is refused.
#[allow(dead_code)]
pub async fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Give freshly spawned server tasks a moment to start accepting.
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
}
