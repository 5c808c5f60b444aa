//! Sidecar gateway library.
//!
//! A static/dynamic HTTP gateway that boots a backend runtime on first use,
//! plus the redirect-following relay sidecar that runtime uses for egress and
//! a preferred-then-fallback artifact downloader.

pub mod backend;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod paths;
pub mod relay;
pub mod upstream;

pub use config::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::{LifecycleManager, Shutdown};
pub use relay::RelayServer;
