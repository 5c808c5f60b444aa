//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (fold recognized environment keys)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to each component at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Environment is read once in `main`, never deep in the call chain

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_env_overrides, load_config, ConfigError, IgnoredOverride};
pub use schema::{
    BackendConfig, GatewayConfig, ObservabilityConfig, RelayConfig, ServerConfig,
    StaticFilesConfig, UpstreamConfig,
};
