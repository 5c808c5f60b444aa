//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! First dynamic request (manager.rs):
//!     claim Initializing → [probe relay port → spawn sidecar (sidecar.rs)
//!     → await readiness] → load runtime → mount → chdir → Ready
//!
//! Concurrent requests during boot:
//!     observe Initializing → Booting (retry signal, never a second boot)
//!
//! Interrupt (signals.rs):
//!     SIGINT → kill sidecar → stop listeners (shutdown.rs) → exit 130
//! ```
//!
//! # Design Decisions
//! - One boot per process; `Failed` is terminal
//! - Readiness has a hard timeout (10s by default)
//! - The sidecar never outlives the gateway: killed on interrupt and on drop

pub mod manager;
pub mod shutdown;
pub mod sidecar;
pub mod signals;
pub mod state;

pub use manager::{BootPlan, LifecycleManager};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use sidecar::{ReadySignal, Sidecar, SidecarPlan};
pub use state::{BackendState, BootError, Readiness};
