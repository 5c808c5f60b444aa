//! Backend runtime adapter boundary.
//!
//! # Data Flow
//! ```text
//! Router (Ready)
//!     → BackendRequest {method, url, headers, body}
//!     → BackendRuntime::request
//!     → BackendResponse {status, headers, body}
//!
//! Lifecycle boot (once):
//!     RuntimeLoader::load → mount(working dir [, document root]) → chdir
//! ```
//!
//! # Design Decisions
//! - The runtime is a black box behind a trait object; the gateway only
//!   feeds it requests and relays its output
//! - `mount`/`chdir` are consumed once during boot
//! - `cgi.rs` is the bundled adapter (CGI/1.1 over a spawned interpreter)

pub mod cgi;
pub mod environment;

use std::path::Path;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use futures_util::future::BoxFuture;

pub use cgi::{CgiLoader, CgiRuntime};
pub use environment::backend_environment;

/// A request translated for the backend.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub method: Method,
    /// Path and query as received (`/index?x=1`).
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A fully produced backend response.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Backend adapter failures.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("no mount covers '{0}'")]
    MountMissing(String),

    #[error("backend exited with status {status}: {stderr}")]
    Exec { status: i32, stderr: String },
}

/// The sandboxed runtime as seen by the gateway.
pub trait BackendRuntime: Send + Sync {
    /// Execute one HTTP request.
    fn request(&self, request: BackendRequest) -> BoxFuture<'_, Result<BackendResponse, BackendError>>;

    /// Expose `host_path` at `vfs_path` in the runtime's filesystem view.
    fn mount(&self, vfs_path: &Path, host_path: &Path) -> Result<(), BackendError>;

    /// Set the runtime's working directory (a virtual path).
    fn chdir(&self, vfs_path: &Path) -> Result<(), BackendError>;

    /// Run the runtime's command-line entry point, returning its exit code.
    fn cli(
        &self,
        args: Vec<String>,
        env: Vec<(String, String)>,
    ) -> BoxFuture<'_, Result<i32, BackendError>>;
}

/// Constructs a runtime during boot.
pub trait RuntimeLoader: Send + Sync {
    fn load(&self) -> BoxFuture<'_, Result<Arc<dyn BackendRuntime>, BackendError>>;
}
