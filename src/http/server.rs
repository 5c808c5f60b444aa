//! Gateway HTTP server.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all gateway handler
//! - Wire up middleware (request ID, tracing)
//! - Serve static hits directly, everything else through the lifecycle
//! - Bind to a listener and stop on the shutdown signal

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Method, Request},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::backend::BackendRuntime;
use crate::config::GatewayConfig;
use crate::http::request::{into_backend_request, request_id};
use crate::http::response;
use crate::http::static_files::StaticAssets;
use crate::lifecycle::{LifecycleManager, Readiness, ShutdownSignal};
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleManager>,
    pub assets: Option<Arc<StaticAssets>>,
    pub strip_headers: Arc<Vec<HeaderName>>,
    pub max_body_bytes: usize,
}

/// The public-facing static/dynamic router.
pub struct GatewayServer {
    router: Router,
    lifecycle: Arc<LifecycleManager>,
}

impl GatewayServer {
    /// The static root is `static_files.root`, else the backend document root.
    /// A missing root disables the static shortcut.
    pub fn new(config: &GatewayConfig, lifecycle: Arc<LifecycleManager>) -> std::io::Result<Self> {
        let root = match &config.static_files.root {
            Some(root) => root.clone(),
            None => config.backend.resolved_document_root()?,
        };
        let assets = match StaticAssets::new(&root, &config.static_files.exclude_extensions) {
            Ok(assets) => {
                tracing::info!(root = %assets.root().display(), "Serving static files");
                Some(Arc::new(assets))
            }
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "Static root unavailable, static shortcut disabled");
                None
            }
        };

        let state = AppState {
            lifecycle: lifecycle.clone(),
            assets,
            strip_headers: Arc::new(response::parse_strip_list(
                &config.server.strip_response_headers,
            )),
            max_body_bytes: config.server.max_body_bytes,
        };

        Ok(Self {
            router: Self::build_router(state),
            lifecycle,
        })
    }

    fn build_router(state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id());

        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(middleware)
    }

    /// Run until `stop` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        stop: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(stop.recv())
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    /// The router alone, for in-process use.
    pub fn into_router(self) -> Router {
        self.router
    }
}

async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(&request);

    if request.method() == Method::GET {
        if let Some(assets) = &state.assets {
            if let Some(response) = assets.serve(request.uri().path()).await {
                tracing::debug!(request_id = %request_id, path = %request.uri().path(), "Static hit");
                metrics::record_static_hit();
                metrics::record_request("static", response.status().as_u16(), start);
                return response;
            }
        }
    }

    let (outcome, response) = match state.lifecycle.ensure_ready().await {
        Readiness::Ready(runtime) => ("backend", dispatch(&state, runtime, request, &request_id).await),
        Readiness::Booted(_) => {
            tracing::debug!(request_id = %request_id, "Backend booted, redirecting to retry");
            ("booted", response::retry_redirect(request.uri()))
        }
        Readiness::Booting => ("booting", response::booting()),
        Readiness::Failed(reason) => {
            tracing::warn!(request_id = %request_id, reason = %reason, "Backend unavailable");
            ("failed", response::boot_failed())
        }
    };

    metrics::record_request(outcome, response.status().as_u16(), start);
    response
}

async fn dispatch(
    state: &AppState,
    runtime: Arc<dyn BackendRuntime>,
    request: Request<Body>,
    request_id: &str,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let backend_request = match into_backend_request(request, state.max_body_bytes).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Rejecting request");
            return e.into_response();
        }
    };

    match runtime.request(backend_request).await {
        Ok(backend) => {
            tracing::debug!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status = backend.status.as_u16(),
                "Backend responded"
            );
            response::from_backend(backend, &state.strip_headers)
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, method = %method, path = %path, error = %e, "Backend request failed");
            response::backend_error()
        }
    }
}
