//! Relay wire entry point.
//!
//! # Responsibilities
//! - Accept `?url=<encoded target>` on any path and method; the upstream
//!   fetch is always a GET
//! - Reject a missing target with 400 before any network activity
//! - Announce readiness (marker line + optional ready file) once bound

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::RelayConfig;
use crate::relay::transport::{build_client, RedirectMode};
use crate::relay::Relay;

/// Environment variable naming the structured readiness file.
pub const READY_FILE_ENV: &str = "GATEWAY_READY_FILE";

/// Readiness record written by the relay once it accepts connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyRecord {
    pub pid: u32,
    pub address: String,
}

/// HTTP front for a [`Relay`].
pub struct RelayServer {
    router: Router,
    ready_marker: String,
}

impl RelayServer {
    pub fn new(config: &RelayConfig) -> reqwest::Result<Self> {
        let client = build_client(&config.user_agent, RedirectMode::Manual)?;
        let relay = Relay::new(client, config.max_redirects)
            .with_upstream_prefix(config.upstream_prefix.clone());
        Ok(Self::from_relay(relay, &config.ready_marker))
    }

    pub fn from_relay(relay: Relay, ready_marker: &str) -> Self {
        Self {
            router: router(relay),
            ready_marker: ready_marker.to_string(),
        }
    }

    /// Serve until `shutdown` resolves.
    ///
    /// `ready_file`, when given, receives a [`ReadyRecord`] after the listener
    /// is bound; the marker line is always printed to stdout.
    pub async fn run<F>(
        self,
        listener: TcpListener,
        ready_file: Option<&Path>,
        shutdown: F,
    ) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        announce_ready(addr, &self.ready_marker, ready_file).await?;

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Relay stopped");
        Ok(())
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

fn router(relay: Relay) -> Router {
    Router::new()
        .route("/", any(relay_handler))
        .route("/{*path}", any(relay_handler))
        .with_state(relay)
        .layer(TraceLayer::new_for_http())
}

async fn relay_handler(
    State(relay): State<Relay>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let raw = params.get("url").map(String::as_str).unwrap_or_default();
    let target = match relay.parse_target(raw) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected relay request");
            return e.into_response();
        }
    };

    tracing::info!(target = %raw, "Relay request");
    relay.respond(target).await
}

async fn announce_ready(
    addr: SocketAddr,
    marker: &str,
    ready_file: Option<&Path>,
) -> std::io::Result<()> {
    if let Some(path) = ready_file {
        let record = ReadyRecord {
            pid: std::process::id(),
            address: addr.to_string(),
        };
        let json = serde_json::to_vec(&record).map_err(std::io::Error::other)?;
        // Write then rename so the watcher never sees a partial record.
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
    }

    tracing::info!(address = %addr, "Relay listening");
    println!("{marker} at http://{addr}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn server() -> RelayServer {
        RelayServer::new(&RelayConfig::default()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn missing_url_is_bad_request() {
        for uri in ["/", "/?url=", "/?other=1"] {
            let response = server()
                .into_router()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri {uri}");
            assert!(body_text(response).await.contains("Missing 'url'"));
        }
    }

    #[tokio::test]
    async fn ready_file_holds_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.ready");
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        announce_ready(addr, "Sidecar relay running", Some(&path)).await.unwrap();

        let record: ReadyRecord =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(record.address, "127.0.0.1:9999");
        assert_eq!(record.pid, std::process::id());
    }
}
