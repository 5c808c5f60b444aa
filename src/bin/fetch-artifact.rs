//! One-shot artifact download: public relay first, direct stream second.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use url::Url;

use sidecar_gateway::config::{load_config, GatewayConfig};
use sidecar_gateway::observability::logging;
use sidecar_gateway::relay::transport::{build_client, RedirectMode};
use sidecar_gateway::upstream::{fetch_with_fallback, FallbackOptions, FetchOutcome};

const DIRECT_MAX_REDIRECTS: usize = 10;

#[derive(Parser)]
#[command(name = "fetch-artifact", version)]
#[command(about = "Download a file, preferring the public relay and falling back to a direct fetch", long_about = None)]
struct Cli {
    /// Artifact URL
    url: Url,

    /// Destination file; parent directories are created
    dest: PathBuf,

    /// TOML configuration file (only the [upstream] section is used)
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Public relay prefix; the encoded URL is appended
    #[arg(long)]
    public_relay_url: Option<String>,

    /// Largest body accepted from the public relay
    #[arg(long)]
    ceiling_bytes: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("fetch-artifact: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => GatewayConfig::default(),
    };
    logging::init("sidecar_gateway=info,fetch_artifact=info");

    let mut options = FallbackOptions::from(&config.upstream);
    if let Some(prefix) = cli.public_relay_url {
        options.public_relay_url = prefix;
    }
    if let Some(ceiling) = cli.ceiling_bytes {
        options.ceiling_bytes = ceiling;
    }

    if let Some(parent) = cli.dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            tracing::error!(directory = %parent.display(), error = %e, "Failed to create destination directory");
            return ExitCode::FAILURE;
        }
    }

    let client = match build_client(&config.relay.user_agent, RedirectMode::Follow(DIRECT_MAX_REDIRECTS)) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    match fetch_with_fallback(&client, &options, &cli.url, &cli.dest).await {
        Ok(FetchOutcome::PublicRelay { bytes }) => {
            tracing::info!(dest = %cli.dest.display(), bytes, "Downloaded via public relay");
            ExitCode::SUCCESS
        }
        Ok(FetchOutcome::Direct { bytes }) => {
            tracing::info!(dest = %cli.dest.display(), bytes, "Downloaded directly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(url = %cli.url, error = %e, "Download failed");
            ExitCode::FAILURE
        }
    }
}
