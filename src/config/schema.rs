//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Inbound listener for the static/dynamic router.
    pub server: ServerConfig,

    /// Relay sidecar settings (listener, spawn, readiness).
    pub relay: RelayConfig,

    /// Backend runtime adapter settings.
    pub backend: BackendConfig,

    /// Static asset shortcut.
    pub static_files: StaticFilesConfig,

    /// One-shot artifact download settings.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Gateway listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8000").
    pub bind_address: String,

    /// Public base URL the backend sees as its own origin.
    pub absolute_url: String,

    /// Largest request body forwarded to the backend.
    pub max_body_bytes: usize,

    /// Response headers removed from backend output before relaying.
    pub strip_response_headers: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            absolute_url: "http://127.0.0.1:8000".to_string(),
            max_body_bytes: 32 * 1024 * 1024,
            strip_response_headers: vec!["x-frame-options".to_string()],
        }
    }
}

/// Relay sidecar configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the relay listens on.
    pub bind_address: String,

    /// Spawn the relay as a subprocess during boot.
    pub spawn_sidecar: bool,

    /// Program used for the sidecar. Defaults to the current executable.
    pub program: Option<PathBuf>,

    /// Arguments for `program`. Defaults to `["relay", "--bind", <bind_address>]`.
    pub args: Option<Vec<String>>,

    /// Seconds to wait for the sidecar readiness signal.
    pub ready_timeout_secs: u64,

    /// Marker line the sidecar prints once it is accepting connections.
    pub ready_marker: String,

    /// Maximum number of redirects followed per fetch.
    pub max_redirects: u32,

    /// User-Agent sent upstream.
    pub user_agent: String,

    /// Optional public relay prefix; the encoded target is appended to it.
    pub upstream_prefix: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:9999".to_string(),
            spawn_sidecar: true,
            program: None,
            args: None,
            ready_timeout_secs: 10,
            ready_marker: "Sidecar relay running".to_string(),
            max_redirects: crate::relay::MAX_REDIRECTS,
            user_agent: crate::relay::BROWSER_USER_AGENT.to_string(),
            upstream_prefix: None,
        }
    }
}

/// Backend runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Interpreter spawned per request (CGI/1.1).
    pub cgi_program: PathBuf,

    /// Interpreter used by `exec`.
    pub cli_program: PathBuf,

    /// Host directory mounted into the backend's filesystem view.
    /// Defaults to the process working directory.
    pub working_dir: Option<PathBuf>,

    /// Distinct document root (hybrid mode). Falls back to `working_dir`.
    pub document_root: Option<PathBuf>,

    /// Script used when the request path does not name a script.
    pub front_controller: String,

    /// Extensions executed directly when the file exists. Anything else goes
    /// to the front controller.
    pub script_extensions: Vec<String>,

    /// Advertise HTTPS to the backend (`HTTPS=on`, forwarded proto).
    pub force_https: bool,

    /// Relay base URL exported to the backend as `LOCAL_PROXY_URL`.
    pub relay_base_url: String,

    /// Package-manager timeout exported as `COMPOSER_PROCESS_TIMEOUT`.
    pub package_timeout_secs: u64,

    /// Export `COMPOSER_DISABLE_CURL=1` so stream transports are used.
    pub disable_curl_transport: bool,

    /// Exported as `PHP_BINARY` so tools that re-spawn the interpreter come
    /// back through `exec`. Defaults to the running gateway executable.
    pub php_binary: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            cgi_program: PathBuf::from("php-cgi"),
            cli_program: PathBuf::from("php"),
            working_dir: None,
            document_root: None,
            front_controller: "index.php".to_string(),
            script_extensions: vec!["php".to_string()],
            force_https: false,
            relay_base_url: "http://127.0.0.1:9999/?url=".to_string(),
            package_timeout_secs: 600,
            disable_curl_transport: true,
            php_binary: None,
        }
    }
}

impl BackendConfig {
    /// Working directory, defaulting to the process working directory.
    pub fn resolved_working_dir(&self) -> std::io::Result<PathBuf> {
        match &self.working_dir {
            Some(dir) => std::path::absolute(dir),
            None => std::env::current_dir(),
        }
    }

    /// Document root, defaulting to the working directory.
    pub fn resolved_document_root(&self) -> std::io::Result<PathBuf> {
        match &self.document_root {
            Some(dir) => std::path::absolute(dir),
            None => self.resolved_working_dir(),
        }
    }
}

/// Static asset shortcut configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Root served verbatim. `None` uses the backend document root.
    pub root: Option<PathBuf>,

    /// Extensions that always go to the backend even when the file exists.
    pub exclude_extensions: Vec<String>,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            root: None,
            exclude_extensions: vec!["php".to_string()],
        }
    }
}

/// Artifact download configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Public relay prefix tried first; the encoded target is appended.
    pub public_relay_url: String,

    /// Size ceiling for the public relay attempt.
    pub ceiling_bytes: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            public_relay_url: "https://api.codetabs.com/v1/proxy?quest=".to_string(),
            ceiling_bytes: crate::upstream::DEFAULT_CEILING_BYTES,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "sidecar_gateway=debug,tower_http=debug".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
