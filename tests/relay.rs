//! Relay sidecar integration tests.

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::http::StatusCode;
use sidecar_gateway::config::RelayConfig;
use sidecar_gateway::relay::transport::{build_client, RedirectMode};
use sidecar_gateway::relay::{Relay, RelayError, RelayServer, BROWSER_USER_AGENT};
use url::Url;

mod common;

async fn start_relay() -> std::net::SocketAddr {
    let server = RelayServer::new(&RelayConfig::default()).unwrap();
    common::spawn_router(server.into_router()).await
}

fn relay_url(relay: std::net::SocketAddr, target: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    format!("http://{relay}/?url={encoded}")
}

#[tokio::test]
async fn empty_target_is_rejected_without_outbound_calls() {
    let (_, hits) = common::start_fixed_backend(200, b"never".to_vec()).await;
    let relay = start_relay().await;

    for query in ["/?url=", "/", "/?other=1"] {
        let response = reqwest::get(format!("http://{relay}{query}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.text().await.unwrap(),
            "[Relay] Missing 'url' query parameter."
        );
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn permanent_redirects_resolve_to_final_body() {
    let (backend, hits) = common::start_redirect_chain(2, StatusCode::MOVED_PERMANENTLY).await;
    let relay = start_relay().await;

    let response = reqwest::get(relay_url(relay, &format!("http://{backend}/hop/0")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.text().await.unwrap(), "final:2");
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn five_redirects_are_allowed() {
    let (backend, hits) = common::start_redirect_chain(5, StatusCode::FOUND).await;
    let client = build_client(BROWSER_USER_AGENT, RedirectMode::Manual).unwrap();
    let relay = Relay::new(client, 5);

    let target = Url::parse(&format!("http://{backend}/hop/0")).unwrap();
    let relayed = relay.fetch(target).await.unwrap();

    assert_eq!(relayed.status, StatusCode::OK);
    assert_eq!(relayed.redirects, 5);
    assert_eq!(relayed.url.path(), "/hop/5");
    assert_eq!(hits.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn sixth_redirect_is_never_followed() {
    let (backend, hits) = common::start_redirect_chain(6, StatusCode::FOUND).await;
    let relay = start_relay().await;

    let response = reqwest::get(relay_url(relay, &format!("http://{backend}/hop/0")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        response.text().await.unwrap(),
        "[Relay] Error: Too many redirects (6)"
    );
    // /hop/0 through /hop/5 answered; /hop/6 was never requested.
    assert_eq!(hits.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn too_many_redirects_error_carries_depth() {
    let (backend, _) = common::start_redirect_chain(3, StatusCode::TEMPORARY_REDIRECT).await;
    let client = build_client(BROWSER_USER_AGENT, RedirectMode::Manual).unwrap();
    let relay = Relay::new(client, 2);

    let target = Url::parse(&format!("http://{backend}/hop/0")).unwrap();
    let err = relay.fetch(target).await.unwrap_err();
    assert!(matches!(err, RelayError::TooManyRedirects(3)));
}

#[tokio::test]
async fn auth_challenges_are_stripped_and_browser_agent_sent() {
    let backend = common::start_header_backend().await;
    let relay = start_relay().await;

    let response = reqwest::get(relay_url(relay, &format!("http://{backend}/")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("www-authenticate").is_none());
    assert!(response.headers().get("proxy-authenticate").is_none());
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.headers()["content-type"], "text/plain");
    assert_eq!(response.text().await.unwrap(), BROWSER_USER_AGENT);
}

#[tokio::test]
async fn any_method_and_path_is_relayed_as_get() {
    // The fixed backend only routes GET, so a forwarded POST would be 405.
    let (backend, hits) = common::start_fixed_backend(200, b"payload".to_vec()).await;
    let relay = start_relay().await;
    let target: String =
        url::form_urlencoded::byte_serialize(format!("http://{backend}/pkg.zip").as_bytes()).collect();

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{relay}/packages/list?url={target}"))
        .body("ignored")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "payload");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upstream_status_is_relayed() {
    let (backend, _) = common::start_fixed_backend(404, b"gone".to_vec()).await;
    let relay = start_relay().await;

    let response = reqwest::get(relay_url(relay, &format!("http://{backend}/missing")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text().await.unwrap(), "gone");
}

#[tokio::test]
async fn unreachable_target_is_bad_gateway() {
    let dead = common::unused_addr().await;
    let relay = start_relay().await;

    let response = reqwest::get(relay_url(relay, &format!("http://{dead}/")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(response.text().await.unwrap().starts_with("Proxy Error:"));
}

#[tokio::test]
async fn run_announces_readiness_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let ready_file = dir.path().join("relay.ready");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = RelayServer::new(&RelayConfig::default()).unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let path = ready_file.clone();
    let task = tokio::spawn(async move {
        server
            .run(listener, Some(&path), async move {
                let _ = stop_rx.await;
            })
            .await
    });

    let record = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(raw) = tokio::fs::read(&ready_file).await {
                if let Ok(record) =
                    serde_json::from_slice::<sidecar_gateway::relay::server::ReadyRecord>(&raw)
                {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(record.address, addr.to_string());
    assert_eq!(record.pid, std::process::id());

    let _ = stop_tx.send(());
    task.await.unwrap().unwrap();
}
