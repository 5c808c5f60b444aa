//! Static asset shortcut.
//!
//! # Responsibilities
//! - Resolve a request path to a regular file under the static root
//! - Stream the file with a content type derived from its extension
//!
//! # Design Decisions
//! - `..` is resolved before joining, then the canonical target must still
//!   sit under the canonical root (symlinks cannot escape either)
//! - Excluded extensions (scripts) always go to the backend
//! - Any miss falls through to the backend; no 404 is produced here

use std::path::{Path, PathBuf};

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use futures_util::stream::{self, Stream};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::paths::join_under;

const CHUNK_SIZE: usize = 64 * 1024;

/// Files under a root directory, served verbatim.
#[derive(Debug, Clone)]
pub struct StaticAssets {
    root: PathBuf,
    exclude_extensions: Vec<String>,
}

impl StaticAssets {
    /// `root` must exist; it is canonicalized once here.
    pub fn new(root: &Path, exclude_extensions: &[String]) -> std::io::Result<Self> {
        Ok(Self {
            root: std::fs::canonicalize(root)?,
            exclude_extensions: exclude_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `url_path` to a servable file, if there is one.
    pub async fn resolve(&self, url_path: &str) -> Option<PathBuf> {
        let candidate = join_under(&self.root, url_path)?;

        if let Some(ext) = candidate.extension().and_then(|e| e.to_str()) {
            if self.exclude_extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)) {
                return None;
            }
        }

        let canonical = tokio::fs::canonicalize(&candidate).await.ok()?;
        if !canonical.starts_with(&self.root) {
            tracing::warn!(path = %url_path, "Static path escapes root, ignoring");
            return None;
        }

        let metadata = tokio::fs::metadata(&canonical).await.ok()?;
        metadata.is_file().then_some(canonical)
    }

    /// Build a streaming response for `url_path`, or `None` to fall through.
    pub async fn serve(&self, url_path: &str) -> Option<Response> {
        let path = self.resolve(url_path).await?;
        let file = File::open(&path).await.ok()?;
        let len = file.metadata().await.ok().map(|m| m.len());

        let mut response = Response::new(Body::from_stream(file_stream(file)));
        *response.status_mut() = StatusCode::OK;
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type(&path)));
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        if let Some(len) = len {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        }
        Some(response)
    }
}

/// Content type for a file, by extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" | "map" => "application/json",
        "txt" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

fn file_stream(file: File) -> impl Stream<Item = std::io::Result<Bytes>> {
    stream::unfold(Some(file), |state| async move {
        let mut file = state?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some(file)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}
