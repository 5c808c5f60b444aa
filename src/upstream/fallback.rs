//! Preferred-then-fallback download strategy.
//!
//! # Design Decisions
//! - Step 1 errors are control flow: logged, never returned
//! - A declared length over the ceiling skips the body entirely
//! - Step 2 streams to disk; there is no step 3

use std::path::Path;

use futures_util::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::config::UpstreamConfig;

/// Where a download finally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    PublicRelay { bytes: u64 },
    Direct { bytes: u64 },
}

/// Fatal download failures (step 2 only).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Download failed, status code {0}")]
    DownloadFailed(u16),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error writing artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// Knobs for [`fetch_with_fallback`].
#[derive(Debug, Clone)]
pub struct FallbackOptions {
    /// Prefix the percent-encoded target is appended to.
    pub public_relay_url: String,
    pub ceiling_bytes: u64,
}

impl From<&UpstreamConfig> for FallbackOptions {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            public_relay_url: config.public_relay_url.clone(),
            ceiling_bytes: config.ceiling_bytes,
        }
    }
}

/// Why step 1 gave up.
#[derive(Debug)]
enum PrimaryOutcome {
    Fetched(Vec<u8>),
    Oversized { bytes: u64 },
    Status(u16),
    Transport(reqwest::Error),
}

/// Download `target` into `destination`, preferring the public relay.
pub async fn fetch_with_fallback(
    client: &reqwest::Client,
    options: &FallbackOptions,
    target: &Url,
    destination: &Path,
) -> Result<FetchOutcome, FetchError> {
    match fetch_via_public_relay(client, options, target).await {
        PrimaryOutcome::Fetched(bytes) => {
            let mut file = create_executable(destination).await?;
            file.write_all(&bytes).await?;
            file.flush().await?;
            tracing::info!(
                destination = %destination.display(),
                bytes = bytes.len(),
                "Downloaded via public relay"
            );
            return Ok(FetchOutcome::PublicRelay {
                bytes: bytes.len() as u64,
            });
        }
        PrimaryOutcome::Oversized { bytes } => tracing::warn!(
            bytes,
            ceiling = options.ceiling_bytes,
            "Public relay response over ceiling, falling back to direct download"
        ),
        PrimaryOutcome::Status(status) => tracing::warn!(
            status,
            "Public relay request failed, falling back to direct download"
        ),
        PrimaryOutcome::Transport(e) => tracing::warn!(
            error = %e,
            "Public relay fetch failed, falling back to direct download"
        ),
    }

    let bytes = fetch_direct(client, target, destination).await?;
    tracing::info!(
        destination = %destination.display(),
        bytes,
        "Downloaded via direct stream"
    );
    Ok(FetchOutcome::Direct { bytes })
}

async fn fetch_via_public_relay(
    client: &reqwest::Client,
    options: &FallbackOptions,
    target: &Url,
) -> PrimaryOutcome {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_str().as_bytes()).collect();
    let proxied = format!("{}{}", options.public_relay_url, encoded);

    let response = match client.get(&proxied).send().await {
        Ok(r) => r,
        Err(e) => return PrimaryOutcome::Transport(e),
    };
    if !response.status().is_success() {
        return PrimaryOutcome::Status(response.status().as_u16());
    }
    if let Some(declared) = response.content_length() {
        if declared > options.ceiling_bytes {
            return PrimaryOutcome::Oversized { bytes: declared };
        }
    }

    let mut buffer = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => return PrimaryOutcome::Transport(e),
        };
        buffer.extend_from_slice(&chunk);
        if buffer.len() as u64 > options.ceiling_bytes {
            return PrimaryOutcome::Oversized {
                bytes: buffer.len() as u64,
            };
        }
    }
    PrimaryOutcome::Fetched(buffer)
}

async fn fetch_direct(
    client: &reqwest::Client,
    target: &Url,
    destination: &Path,
) -> Result<u64, FetchError> {
    let response = client.get(target.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::DownloadFailed(status.as_u16()));
    }

    let mut file = create_executable(destination).await?;
    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

async fn create_executable(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o755);
    let file = options.open(path).await?;

    // `mode` only applies on creation and is masked by umask.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    }
    Ok(file)
}
