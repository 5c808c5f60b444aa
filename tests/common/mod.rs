//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path as UrlPath, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral port.
pub async fn spawn_router(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Start a backend where `/hop/{n}` redirects (with `redirect_status`) to
/// `/hop/{n+1}` until `redirects` hops have been issued, then answers 200
/// `final:{n}`.
///
/// Returns the address and a per-request hit counter.
pub async fn start_redirect_chain(
    redirects: u32,
    redirect_status: StatusCode,
) -> (SocketAddr, Arc<AtomicU32>) {
    async fn hop(
        State((redirects, status, hits)): State<(u32, StatusCode, Arc<AtomicU32>)>,
        UrlPath(n): UrlPath<u32>,
    ) -> Response {
        hits.fetch_add(1, Ordering::SeqCst);
        if n < redirects {
            (status, [(header::LOCATION, format!("/hop/{}", n + 1))], "").into_response()
        } else {
            (StatusCode::OK, format!("final:{n}")).into_response()
        }
    }

    let hits = Arc::new(AtomicU32::new(0));
    let router = Router::new()
        .route("/hop/{n}", get(hop))
        .with_state((redirects, redirect_status, hits.clone()));
    (spawn_router(router).await, hits)
}

/// Start a backend answering every GET with `status` and `body`, counting hits.
pub async fn start_fixed_backend(status: u16, body: Vec<u8>) -> (SocketAddr, Arc<AtomicU32>) {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let body = Arc::new(body);
    let handler = move || {
        let counter = counter.clone();
        let body = body.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (StatusCode::from_u16(status).unwrap(), body.as_ref().clone())
        }
    };
    let router = Router::new()
        .route("/", get(handler.clone()))
        .route("/{*path}", get(handler));
    (spawn_router(router).await, hits)
}

/// Start a backend that echoes selected request headers and sets hostile
/// response headers the relay must strip.
pub async fn start_header_backend() -> SocketAddr {
    async fn handler(headers: HeaderMap) -> Response {
        let ua = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        (
            StatusCode::OK,
            [
                (header::WWW_AUTHENTICATE, "Basic realm=\"x\""),
                (header::PROXY_AUTHENTICATE, "Basic realm=\"y\""),
                (header::CONTENT_TYPE, "text/plain"),
            ],
            ua,
        )
            .into_response()
    }
    spawn_router(Router::new().route("/", get(handler))).await
}

/// Start a raw TCP server that declares a `Content-Length` of
/// `declared_len` and then never sends the body.
///
/// A client that tries to read the body hangs; one that honors the
/// declared length returns immediately.
pub async fn start_declared_oversize(declared_len: u64) -> (SocketAddr, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;
                        let head = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {declared_len}\r\nContent-Type: application/octet-stream\r\n\r\n"
                        );
                        let _ = socket.write_all(head.as_bytes()).await;
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    (addr, hits)
}

/// Start a raw TCP server that streams `chunks` chunked-encoding chunks of
/// `chunk_len` bytes with no `Content-Length`, then holds the connection
/// open without the terminating chunk.
///
/// Only a client that counts bytes as they arrive can give up early.
pub async fn start_unterminated_chunked(chunk_len: usize, chunks: usize) -> (SocketAddr, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let head = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Type: application/octet-stream\r\n\r\n";
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for _ in 0..chunks {
                    let mut chunk = format!("{chunk_len:x}\r\n").into_bytes();
                    chunk.extend(std::iter::repeat(b'z').take(chunk_len));
                    chunk.extend_from_slice(b"\r\n");
                    if socket.write_all(&chunk).await.is_err() {
                        return;
                    }
                    let _ = socket.flush().await;
                }
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
        }
    });
    (addr, hits)
}

/// A port that nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Write an executable shell script.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
