//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, operator-facing only)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stderr/stdout via tracing-subscriber
//!     → optional Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Failures are detailed in logs, never in response bodies
//! - Request ID flows through the gateway's trace spans
//! - Metrics are cheap no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
