//! Single-flight backend initialization.
//!
//! # Responsibilities
//! - Own the process-wide `BackendState`
//! - Let exactly one caller claim `Uninitialized → Initializing`
//! - Run the boot sequence: sidecar, runtime load, mounts, chdir
//! - Kill the sidecar on shutdown, including one still waiting for readiness
//!
//! # Design Decisions
//! - The claim is a compare-and-set under the watch channel's lock
//! - The boot runs on its own task so a dropped request cannot strand the
//!   state in `Initializing`
//! - `Failed` is durable; there is no automatic retry
//! - Shutdown is sticky: a boot that finishes spawning afterwards kills its
//!   own sidecar and fails

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::backend::{BackendRuntime, RuntimeLoader};
use crate::config::GatewayConfig;
use crate::lifecycle::sidecar::{Sidecar, SidecarPlan};
use crate::lifecycle::state::{BackendState, BootError, Readiness};
use crate::net::probe;
use crate::observability::metrics;

/// Everything the boot sequence needs, resolved up front.
#[derive(Debug, Clone)]
pub struct BootPlan {
    /// `None` skips the sidecar step.
    pub sidecar: Option<SidecarPlan>,
    pub working_dir: PathBuf,
    pub document_root: PathBuf,
}

impl BootPlan {
    pub fn from_config(config: &GatewayConfig) -> std::io::Result<Self> {
        let sidecar = if config.relay.spawn_sidecar {
            let relay_addr: SocketAddr = config
                .relay
                .bind_address
                .parse()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
            let program = match &config.relay.program {
                Some(program) => program.clone(),
                None => std::env::current_exe()?,
            };
            let args = config.relay.args.clone().unwrap_or_else(|| {
                vec![
                    "relay".to_string(),
                    "--bind".to_string(),
                    config.relay.bind_address.clone(),
                ]
            });
            Some(SidecarPlan {
                relay_addr,
                program,
                args,
                ready_marker: config.relay.ready_marker.clone(),
                ready_timeout: Duration::from_secs(config.relay.ready_timeout_secs),
            })
        } else {
            None
        };

        Ok(Self {
            sidecar,
            working_dir: config.backend.resolved_working_dir()?,
            document_root: config.backend.resolved_document_root()?,
        })
    }
}

/// Owner of the backend state machine.
pub struct LifecycleManager {
    state: watch::Sender<BackendState>,
    runtime: OnceLock<Arc<dyn BackendRuntime>>,
    loader: Arc<dyn RuntimeLoader>,
    plan: BootPlan,
    sidecar: Mutex<Option<Sidecar>>,
    stopping: AtomicBool,
    boots: AtomicUsize,
    spawns: AtomicUsize,
}

impl LifecycleManager {
    pub fn new(loader: Arc<dyn RuntimeLoader>, plan: BootPlan) -> Arc<Self> {
        let (state, _) = watch::channel(BackendState::Uninitialized);
        Arc::new(Self {
            state,
            runtime: OnceLock::new(),
            loader,
            plan,
            sidecar: Mutex::new(None),
            stopping: AtomicBool::new(false),
            boots: AtomicUsize::new(0),
            spawns: AtomicUsize::new(0),
        })
    }

    /// Current state snapshot.
    pub fn state(&self) -> BackendState {
        self.state.borrow().clone()
    }

    /// Make sure the runtime is up, booting it if nobody has yet.
    pub async fn ensure_ready(self: &Arc<Self>) -> Readiness {
        if let Some(runtime) = self.runtime.get() {
            return Readiness::Ready(runtime.clone());
        }

        let claimed = self.state.send_if_modified(|state| {
            if *state == BackendState::Uninitialized {
                *state = BackendState::Initializing;
                true
            } else {
                false
            }
        });

        if !claimed {
            return match &*self.state.borrow() {
                BackendState::Failed(reason) => Readiness::Failed(reason.clone()),
                BackendState::Ready => match self.runtime.get() {
                    Some(runtime) => Readiness::Ready(runtime.clone()),
                    None => Readiness::Booting,
                },
                BackendState::Uninitialized | BackendState::Initializing => Readiness::Booting,
            };
        }

        let manager = Arc::clone(self);
        let boot = tokio::spawn(async move {
            let outcome = manager.boot().await;
            manager.settle(outcome)
        });
        match boot.await {
            Ok(readiness) => readiness,
            Err(e) => self.settle(Err(BootError::Aborted(e.to_string()))),
        }
    }

    /// Wait until the state is `Ready` or `Failed`.
    pub async fn wait_settled(&self) -> BackendState {
        let mut rx = self.state.subscribe();
        let settled = match rx.wait_for(BackendState::is_terminal).await {
            Ok(state) => state.clone(),
            // The sender lives in `self`, so it cannot be gone while we borrow it.
            Err(_) => self.state(),
        };
        settled
    }

    /// Kill the sidecar, if this manager spawned one.
    ///
    /// A sidecar still starting when this runs is killed by the boot as
    /// soon as it is handed over.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let mut guard = self.sidecar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut sidecar) = guard.take() {
            sidecar.kill();
        }
    }

    /// Boot sequences started (0 or 1).
    pub fn boot_count(&self) -> usize {
        self.boots.load(Ordering::SeqCst)
    }

    /// Sidecar spawns performed (0 or 1).
    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub fn sidecar_pid(&self) -> Option<u32> {
        let guard = self.sidecar.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().and_then(Sidecar::pid)
    }

    fn settle(&self, outcome: Result<Arc<dyn BackendRuntime>, BootError>) -> Readiness {
        match outcome {
            Ok(runtime) => {
                let runtime = self.runtime.get_or_init(|| runtime).clone();
                self.state.send_replace(BackendState::Ready);
                metrics::record_boot("ready");
                tracing::info!("Backend ready");
                Readiness::Booted(runtime)
            }
            Err(e) => {
                let reason = e.to_string();
                self.state.send_replace(BackendState::Failed(reason.clone()));
                metrics::record_boot("failed");
                tracing::error!(error = %reason, "Backend boot failed");
                Readiness::Failed(reason)
            }
        }
    }

    async fn boot(&self) -> Result<Arc<dyn BackendRuntime>, BootError> {
        let started = Instant::now();
        self.boots.fetch_add(1, Ordering::SeqCst);
        tracing::info!("Booting backend runtime");

        if let Some(plan) = &self.plan.sidecar {
            if probe::is_port_taken(plan.relay_addr).await {
                tracing::info!(address = %plan.relay_addr, "Relay port already bound, reusing it");
            } else {
                self.spawns.fetch_add(1, Ordering::SeqCst);
                let (mut sidecar, _) = Sidecar::spawn(plan).await?;
                // Checked under the lock `shutdown` takes, so one of the two kills it.
                let mut slot = self.sidecar.lock().unwrap_or_else(|e| e.into_inner());
                if self.is_shut_down() {
                    sidecar.kill();
                    return Err(BootError::ShutDown);
                }
                *slot = Some(sidecar);
            }
        }

        let runtime = self.loader.load().await?;
        if self.is_shut_down() {
            return Err(BootError::ShutDown);
        }

        let working_dir = &self.plan.working_dir;
        let document_root = &self.plan.document_root;
        runtime.mount(working_dir, working_dir)?;
        if document_root != working_dir {
            runtime.mount(document_root, document_root)?;
        }
        runtime.chdir(document_root)?;

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            working_dir = %working_dir.display(),
            document_root = %document_root.display(),
            "Backend boot sequence complete"
        );
        Ok(runtime)
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
