//! Relay sidecar subprocess.
//!
//! # Responsibilities
//! - Spawn the relay with piped stdout/stderr
//! - Detect readiness: the structured ready file first, the marker line on
//!   either output stream as a fallback for programs that cannot write it
//! - Forward the child's output into the log stream
//! - Kill the child on shutdown or drop

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use crate::lifecycle::state::BootError;
use crate::relay::server::{ReadyRecord, READY_FILE_ENV};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How to launch the sidecar and recognize that it is up.
#[derive(Debug, Clone)]
pub struct SidecarPlan {
    pub relay_addr: std::net::SocketAddr,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub ready_marker: String,
    pub ready_timeout: Duration,
}

/// How readiness was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadySignal {
    File(ReadyRecord),
    Marker,
}

/// Handle to a running sidecar.
#[derive(Debug)]
pub struct Sidecar {
    child: Child,
    pid: Option<u32>,
    ready_file: PathBuf,
}

impl Sidecar {
    /// Spawn and wait for readiness within `plan.ready_timeout`.
    ///
    /// On timeout or premature exit the child is killed before returning.
    pub async fn spawn(plan: &SidecarPlan) -> Result<(Self, ReadySignal), BootError> {
        let ready_file =
            std::env::temp_dir().join(format!("sidecar-gateway-{}.ready", uuid::Uuid::new_v4()));

        let mut child = Command::new(&plan.program)
            .args(&plan.args)
            .env(READY_FILE_ENV, &ready_file)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BootError::SubprocessSpawn(format!("{}: {e}", plan.program.display()))
            })?;

        let pid = child.id();
        tracing::info!(pid, program = %plan.program.display(), "Relay sidecar spawned");

        let marker_seen = Arc::new(AtomicBool::new(false));
        if let Some(stdout) = child.stdout.take() {
            watch_output(stdout, "stdout", plan.ready_marker.clone(), marker_seen.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            watch_output(stderr, "stderr", plan.ready_marker.clone(), marker_seen.clone());
        }

        let mut sidecar = Self {
            child,
            pid,
            ready_file,
        };

        let waited = tokio::time::timeout(plan.ready_timeout, sidecar.wait_ready(&marker_seen)).await;
        match waited {
            Ok(Ok(signal)) => {
                tracing::info!(pid, signal = ?signal, "Relay sidecar ready");
                Ok((sidecar, signal))
            }
            Ok(Err(e)) => {
                sidecar.kill();
                Err(e)
            }
            Err(_) => {
                sidecar.kill();
                Err(BootError::RelayStartTimeout(plan.ready_timeout))
            }
        }
    }

    async fn wait_ready(&mut self, marker_seen: &AtomicBool) -> Result<ReadySignal, BootError> {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        loop {
            ticker.tick().await;

            if let Ok(raw) = tokio::fs::read(&self.ready_file).await {
                if let Ok(record) = serde_json::from_slice::<ReadyRecord>(&raw) {
                    return Ok(ReadySignal::File(record));
                }
            }
            if marker_seen.load(Ordering::SeqCst) {
                return Ok(ReadySignal::Marker);
            }
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    return Err(BootError::SubprocessSpawn(format!(
                        "relay exited prematurely with {status}"
                    )))
                }
                Ok(None) => {}
                Err(e) => return Err(BootError::SubprocessSpawn(e.to_string())),
            }
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Forcibly kill the child. Synchronous: the signal is sent before return.
    pub fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(pid = self.pid, error = %e, "Sidecar already gone");
        } else {
            tracing::info!(pid = self.pid, "Relay sidecar killed");
        }
        let _ = std::fs::remove_file(&self.ready_file);
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.ready_file);
    }
}

fn watch_output<R>(stream: R, name: &'static str, marker: String, seen: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.contains(&marker) {
                seen.store(true, Ordering::SeqCst);
            }
            tracing::debug!(target: "sidecar", stream = name, "{line}");
        }
    });
}
