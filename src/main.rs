//! Sidecar gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                  sidecar-gateway serve               │
//!                 │                                                      │
//!   Browser ─────▶│  http::server ──▶ static_files ── hit ──▶ stream file│
//!                 │        │                                             │
//!                 │        └─ miss ─▶ lifecycle::manager (boot once)     │
//!                 │                        │                             │
//!                 │                        ├─ spawn ─▶ relay sidecar ────┼──▶ Internet
//!                 │                        └─ load ──▶ backend runtime   │      ▲
//!                 │                                       │            │      │
//!                 │                                       └── egress ──┼──────┘
//!                 └──────────────────────────────────────────────────────┘
//! ```
//!
//! `relay` runs the sidecar on its own; `exec` boots the same way and then
//! runs one backend CLI invocation.

use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use sidecar_gateway::backend::{environment, CgiLoader};
use sidecar_gateway::config::validation::validate_config;
use sidecar_gateway::config::{
    apply_env_overrides, load_config, ConfigError, GatewayConfig, IgnoredOverride,
};
use sidecar_gateway::lifecycle::signals::{self, INTERRUPT_EXIT_CODE};
use sidecar_gateway::lifecycle::{BootPlan, LifecycleManager, Readiness, Shutdown};
use sidecar_gateway::observability::{logging, metrics};
use sidecar_gateway::relay::server::READY_FILE_ENV;
use sidecar_gateway::{GatewayServer, RelayServer};

#[derive(Parser)]
#[command(name = "sidecar-gateway", version)]
#[command(about = "Static/dynamic gateway with a lazily booted backend and relay sidecar", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway
    Serve {
        /// Listen address (overrides server.bind_address)
        #[arg(long)]
        bind: Option<String>,
        /// Directory served without booting the backend
        #[arg(long)]
        static_root: Option<PathBuf>,
        /// Backend document root
        #[arg(long)]
        document_root: Option<PathBuf>,
    },
    /// Run the relay sidecar
    Relay {
        /// Listen address (overrides relay.bind_address)
        #[arg(long)]
        bind: Option<String>,
        /// Where to write the readiness record once listening
        #[arg(long, env = READY_FILE_ENV)]
        ready_file: Option<PathBuf>,
    },
    /// Boot the backend and run one CLI invocation
    Exec {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_from(shim_args(
        std::env::args_os().collect(),
        std::env::var_os(environment::ENV_EXEC_SHIM).is_some(),
    ));

    let (mut config, ignored) = match base_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("sidecar-gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    match &cli.command {
        Command::Serve {
            bind,
            static_root,
            document_root,
        } => {
            if let Some(bind) = bind {
                config.server.bind_address = bind.clone();
            }
            if let Some(root) = static_root {
                config.static_files.root = Some(root.clone());
            }
            if let Some(root) = document_root {
                config.backend.document_root = Some(root.clone());
            }
        }
        Command::Relay { bind: Some(bind), .. } => config.relay.bind_address = bind.clone(),
        _ => {}
    }

    if let Err(errors) = validate_config(&config) {
        eprintln!("sidecar-gateway: {}", ConfigError::Validation(errors));
        return ExitCode::FAILURE;
    }

    logging::init(&config.observability.log_filter);
    tracing::info!("sidecar-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    ignored.iter().for_each(IgnoredOverride::log);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    match cli.command {
        Command::Serve { .. } => serve(config).await,
        Command::Relay { ready_file, .. } => relay(config, ready_file).await,
        Command::Exec { args } => exec(config, args).await,
    }
}

/// File (if any) + environment, before CLI overrides.
fn base_config(path: Option<&Path>) -> Result<(GatewayConfig, Vec<IgnoredOverride>), ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    let ignored = apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok((config, ignored))
}

/// Invoked as `PHP_BINARY`, the arguments belong to the interpreter.
fn shim_args(mut args: Vec<OsString>, shim: bool) -> Vec<OsString> {
    let explicit = args
        .get(1)
        .is_some_and(|first| ["serve", "relay", "exec"].iter().any(|cmd| first == cmd));
    if shim && !explicit {
        args.insert(1.min(args.len()), OsString::from("exec"));
    }
    args
}

fn lifecycle_for(config: &GatewayConfig) -> std::io::Result<Arc<LifecycleManager>> {
    let plan = BootPlan::from_config(config)?;
    let loader = CgiLoader::new(
        config.backend.clone(),
        config.server.absolute_url.clone(),
        plan.document_root.clone(),
    );
    Ok(LifecycleManager::new(Arc::new(loader), plan))
}

async fn serve(config: GatewayConfig) -> ExitCode {
    let started = async {
        let lifecycle = lifecycle_for(&config)?;
        let server = GatewayServer::new(&config, lifecycle.clone())?;
        let listener = TcpListener::bind(&config.server.bind_address).await?;
        Ok::<_, std::io::Error>((lifecycle, server, listener))
    };
    let (lifecycle, server, listener) = match started.await {
        Ok(parts) => parts,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start gateway");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    let mut running = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        result = &mut running => {
            lifecycle.shutdown();
            match result {
                Ok(Ok(())) => ExitCode::SUCCESS,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Gateway failed");
                    ExitCode::FAILURE
                }
                Err(e) => {
                    tracing::error!(error = %e, "Gateway task panicked");
                    ExitCode::FAILURE
                }
            }
        }
        _ = signals::interrupt() => {
            lifecycle.shutdown();
            shutdown.trigger();
            let _ = running.await;
            tracing::info!("Shutdown complete");
            ExitCode::from(INTERRUPT_EXIT_CODE)
        }
    }
}

async fn relay(config: GatewayConfig, ready_file: Option<PathBuf>) -> ExitCode {
    let server = match RelayServer::new(&config.relay) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build relay client");
            return ExitCode::FAILURE;
        }
    };
    let listener = match TcpListener::bind(&config.relay.bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %config.relay.bind_address, error = %e, "Failed to bind relay");
            return ExitCode::FAILURE;
        }
    };

    match server.run(listener, ready_file.as_deref(), signals::interrupt()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Relay failed");
            ExitCode::FAILURE
        }
    }
}

async fn exec(config: GatewayConfig, args: Vec<String>) -> ExitCode {
    let lifecycle = match lifecycle_for(&config) {
        Ok(lifecycle) => lifecycle,
        Err(e) => {
            tracing::error!(error = %e, "Failed to plan backend boot");
            return ExitCode::FAILURE;
        }
    };

    let run = async {
        let runtime = match lifecycle.ensure_ready().await {
            Readiness::Ready(runtime) | Readiness::Booted(runtime) => runtime,
            Readiness::Failed(reason) => {
                tracing::error!(reason = %reason, "Backend boot failed");
                return ExitCode::FAILURE;
            }
            Readiness::Booting => {
                tracing::error!("Backend boot already in flight");
                return ExitCode::FAILURE;
            }
        };

        let env = environment::overlay(
            environment::backend_environment(&config.backend),
            std::env::vars(),
        );
        match runtime.cli(environment::cli_args(args), env).await {
            Ok(code) => ExitCode::from(exit_byte(code)),
            Err(e) => {
                tracing::error!(error = %e, "Backend CLI failed");
                ExitCode::FAILURE
            }
        }
    };

    let code = tokio::select! {
        code = run => code,
        _ = signals::interrupt() => ExitCode::from(INTERRUPT_EXIT_CODE),
    };
    lifecycle.shutdown();
    code
}

/// Process exit statuses are a byte; anything outside maps to 1.
fn exit_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn shim_routes_interpreter_args_to_exec() {
        assert_eq!(
            shim_args(os(&["sidecar-gateway", "composer.phar", "install"]), true),
            os(&["sidecar-gateway", "exec", "composer.phar", "install"])
        );
        assert_eq!(
            shim_args(os(&["sidecar-gateway", "-v"]), true),
            os(&["sidecar-gateway", "exec", "-v"])
        );
    }

    #[test]
    fn shim_keeps_explicit_subcommands() {
        let args = os(&["sidecar-gateway", "relay", "--bind", "127.0.0.1:9999"]);
        assert_eq!(shim_args(args.clone(), true), args);
        let args = os(&["sidecar-gateway", "composer.phar"]);
        assert_eq!(shim_args(args.clone(), false), args);
    }

    #[test]
    fn exit_codes_fit_a_byte() {
        assert_eq!(exit_byte(0), 0);
        assert_eq!(exit_byte(255), 255);
        assert_eq!(exit_byte(-1), 1);
        assert_eq!(exit_byte(256), 1);
    }
}
