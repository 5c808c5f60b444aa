//! Network helpers.
//!
//! # Data Flow
//! ```text
//! Lifecycle boot
//!     → probe.rs (is the relay port already bound?)
//!     → spawn the sidecar only when it is free
//! ```

pub mod probe;
