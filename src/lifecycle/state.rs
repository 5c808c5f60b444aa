//! Backend state machine.
//!
//! # States
//! - Uninitialized: nothing booted yet
//! - Initializing: exactly one caller is running the boot sequence
//! - Ready: runtime loaded and mounted
//! - Failed: boot failed; durable for the process lifetime
//!
//! # State Transitions
//! ```text
//! Uninitialized → Initializing   (exactly once, atomic claim)
//! Initializing  → Ready          (boot succeeded)
//! Initializing  → Failed(reason) (boot failed)
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::backend::BackendRuntime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendState {
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
}

impl BackendState {
    /// Ready and Failed never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BackendState::Ready | BackendState::Failed(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendState::Uninitialized => "uninitialized",
            BackendState::Initializing => "initializing",
            BackendState::Ready => "ready",
            BackendState::Failed(_) => "failed",
        }
    }
}

/// What a caller of `ensure_ready` should do next.
#[derive(Clone)]
pub enum Readiness {
    /// Runtime was already up.
    Ready(Arc<dyn BackendRuntime>),
    /// This caller ran the boot and it succeeded.
    Booted(Arc<dyn BackendRuntime>),
    /// Another caller's boot is in flight; retry shortly.
    Booting,
    /// Boot failed; no retry in this process.
    Failed(String),
}

impl Readiness {
    pub fn runtime(&self) -> Option<&Arc<dyn BackendRuntime>> {
        match self {
            Readiness::Ready(rt) | Readiness::Booted(rt) => Some(rt),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Readiness::Ready(_) => f.write_str("Ready"),
            Readiness::Booted(_) => f.write_str("Booted"),
            Readiness::Booting => f.write_str("Booting"),
            Readiness::Failed(reason) => f.debug_tuple("Failed").field(reason).finish(),
        }
    }
}

/// Boot sequence failures. All of them move the manager to `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error("relay sidecar did not signal readiness within {0:?}")]
    RelayStartTimeout(Duration),

    #[error("relay sidecar failed to start: {0}")]
    SubprocessSpawn(String),

    #[error("backend boot failed: {0}")]
    Backend(#[from] crate::backend::BackendError),

    #[error("gateway shut down during boot")]
    ShutDown,

    #[error("boot task aborted: {0}")]
    Aborted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!BackendState::Uninitialized.is_terminal());
        assert!(!BackendState::Initializing.is_terminal());
        assert!(BackendState::Ready.is_terminal());
        assert!(BackendState::Failed("x".into()).is_terminal());
    }
}
