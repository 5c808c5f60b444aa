//! Port liveness probing.

use std::io::ErrorKind;
use std::net::SocketAddr;

use tokio::net::TcpListener;

/// Returns true if something is already listening on `addr`.
///
/// Probes by binding: only `AddrInUse` counts as taken. The probe listener
/// is dropped immediately.
pub async fn is_port_taken(addr: SocketAddr) -> bool {
    match TcpListener::bind(addr).await {
        Ok(_) => false,
        Err(e) if e.kind() == ErrorKind::AddrInUse => true,
        Err(e) => {
            tracing::debug!(address = %addr, error = %e, "Port probe failed");
            false
        }
    }
}
