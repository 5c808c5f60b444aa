//! Gateway HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → server.rs (request ID, tracing, catch-all handler)
//!     → static_files.rs (GET + regular file under root → stream it, done)
//!     → LifecycleManager::ensure_ready
//!         Booted  → 302 back to the same URL
//!         Booting → 202
//!         Failed  → 502
//!         Ready   → request.rs (buffer body) → BackendRuntime::request
//!                 → response.rs (strip headers) → client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod static_files;

pub use request::X_REQUEST_ID;
pub use server::{AppState, GatewayServer};
pub use static_files::StaticAssets;
