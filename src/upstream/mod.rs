//! Resilient one-shot artifact downloads.
//!
//! # Data Flow
//! ```text
//! fetch_with_fallback(target, destination)
//!     → fallback.rs step 1: public relay, size ceiling (non-fatal on failure)
//!     → fallback.rs step 2: direct streamed GET (fatal on failure)
//!     → destination written with executable bits
//! ```

pub mod fallback;

pub use fallback::{fetch_with_fallback, FallbackOptions, FetchError, FetchOutcome};

/// Public relays commonly refuse bodies above 5 MiB.
pub const DEFAULT_CEILING_BYTES: u64 = 5 * 1024 * 1024;
