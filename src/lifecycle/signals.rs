//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT (Ctrl+C)
//! - Map an interrupt to the conventional exit status

/// Exit status after an interrupt (128 + SIGINT).
pub const INTERRUPT_EXIT_CODE: u8 = 130;

/// Resolve when the process receives an interrupt.
///
/// If the handler cannot be installed this never resolves, leaving the
/// process to be stopped some other way.
pub async fn interrupt() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Interrupt received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to install interrupt handler");
            std::future::pending::<()>().await;
        }
    }
}
