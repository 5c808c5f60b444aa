//! CGI/1.1 backend adapter.
//!
//! Each request spawns the configured interpreter with CGI meta-variables,
//! feeds the body on stdin and parses the CGI response from stdout. Mounts
//! are a pass-through view of the host filesystem: a virtual path is
//! translated through the longest matching mount.
//!
//! A client `Proxy` header is never exported: as `HTTP_PROXY` it would
//! redirect the backend's own outbound HTTP clients.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, RwLock};

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::backend::{
    backend_environment, BackendError, BackendRequest, BackendResponse, BackendRuntime,
    RuntimeLoader,
};
use crate::config::BackendConfig;
use crate::paths::{join_under, split_query};

#[derive(Debug, Clone)]
struct Mount {
    vfs: PathBuf,
    host: PathBuf,
}

/// Backend runtime speaking CGI/1.1 to an external interpreter.
#[derive(Debug)]
pub struct CgiRuntime {
    cgi_program: PathBuf,
    cli_program: PathBuf,
    front_controller: String,
    script_extensions: Vec<String>,
    document_root: PathBuf,
    server_name: String,
    server_port: u16,
    force_https: bool,
    env: Vec<(String, String)>,
    mounts: RwLock<Vec<Mount>>,
    cwd: RwLock<Option<PathBuf>>,
}

impl CgiRuntime {
    pub fn new(config: &BackendConfig, absolute_url: &str, document_root: PathBuf) -> Self {
        let origin = url::Url::parse(absolute_url).ok();
        let server_name = origin
            .as_ref()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let server_port = origin
            .as_ref()
            .and_then(|u| u.port_or_known_default())
            .unwrap_or(80);

        Self {
            cgi_program: config.cgi_program.clone(),
            cli_program: config.cli_program.clone(),
            front_controller: config.front_controller.clone(),
            script_extensions: config.script_extensions.clone(),
            document_root,
            server_name,
            server_port,
            force_https: config.force_https,
            env: backend_environment(config),
            mounts: RwLock::new(Vec::new()),
            cwd: RwLock::new(None),
        }
    }

    /// Translate a virtual path through the mount table.
    fn translate(&self, vfs_path: &Path) -> Result<PathBuf, BackendError> {
        let mounts = self.mounts.read().unwrap_or_else(|e| e.into_inner());
        mounts
            .iter()
            .filter_map(|m| vfs_path.strip_prefix(&m.vfs).ok().map(|rest| (m, rest)))
            .max_by_key(|(m, _)| m.vfs.components().count())
            .map(|(m, rest)| m.host.join(rest))
            .ok_or_else(|| BackendError::MountMissing(vfs_path.display().to_string()))
    }

    /// Existing files run directly only when their extension is a script's.
    fn is_script(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.script_extensions
                    .iter()
                    .any(|s| s.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
    }

    fn host_cwd(&self) -> Option<PathBuf> {
        self.cwd.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn run_request(&self, request: BackendRequest) -> Result<BackendResponse, BackendError> {
        let (path, query) = split_query(&request.url);
        let docroot = self.translate(&self.document_root)?;

        let requested = join_under(&docroot, path);
        let is_script = match &requested {
            Some(p) if self.is_script(p) => {
                tokio::fs::metadata(p).await.map(|m| m.is_file()).unwrap_or(false)
            }
            _ => false,
        };
        let (script_filename, script_name, path_info) = match requested {
            Some(p) if is_script => {
                let name = format!("/{}", p.strip_prefix(&docroot).unwrap_or(&p).display());
                (p, name, String::new())
            }
            _ => (
                docroot.join(&self.front_controller),
                format!("/{}", self.front_controller),
                path.to_string(),
            ),
        };

        let mut command = Command::new(&self.cgi_program);
        command
            .envs(self.env.iter().cloned())
            .env("GATEWAY_INTERFACE", "CGI/1.1")
            .env("SERVER_PROTOCOL", "HTTP/1.1")
            .env("SERVER_SOFTWARE", concat!("sidecar-gateway/", env!("CARGO_PKG_VERSION")))
            .env("SERVER_NAME", &self.server_name)
            .env("SERVER_PORT", self.server_port.to_string())
            .env("REMOTE_ADDR", "127.0.0.1")
            .env("REDIRECT_STATUS", "200")
            .env("REQUEST_METHOD", request.method.as_str())
            .env("REQUEST_URI", &request.url)
            .env("QUERY_STRING", query)
            .env("DOCUMENT_ROOT", &docroot)
            .env("SCRIPT_FILENAME", &script_filename)
            .env("SCRIPT_NAME", &script_name)
            .env("PATH_INFO", &path_info)
            .env("CONTENT_LENGTH", request.body.len().to_string());

        if let Some(content_type) = request.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
            command.env("CONTENT_TYPE", content_type);
        }
        if self.force_https {
            command.env("HTTPS", "on").env("HTTP_X_FORWARDED_PROTO", "https");
        }
        for (name, value) in &request.headers {
            if *name == header::CONTENT_TYPE || *name == header::CONTENT_LENGTH || *name == "proxy" {
                continue;
            }
            if let Ok(value) = value.to_str() {
                let key = format!("HTTP_{}", name.as_str().to_ascii_uppercase().replace('-', "_"));
                command.env(key, value);
            }
        }
        if let Some(cwd) = self.host_cwd() {
            command.current_dir(cwd);
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BackendError::Spawn {
                program: self.cgi_program.display().to_string(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let body = request.body.clone();
            tokio::spawn(async move {
                // Scripts that ignore stdin close it early; that is fine.
                let _ = stdin.write_all(&body).await;
            });
        }

        let output = child.wait_with_output().await?;
        if !output.stderr.is_empty() {
            tracing::warn!(
                script = %script_filename.display(),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "Backend wrote to stderr"
            );
        }
        if !output.status.success() && output.stdout.is_empty() {
            return Err(BackendError::Exec {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        parse_cgi_output(&output.stdout)
    }

    async fn run_cli(&self, args: Vec<String>, env: Vec<(String, String)>) -> Result<i32, BackendError> {
        let mut command = Command::new(&self.cli_program);
        command
            .args(&args)
            .envs(env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = self.host_cwd() {
            command.current_dir(cwd);
        }

        let status = command
            .status()
            .await
            .map_err(|source| BackendError::Spawn {
                program: self.cli_program.display().to_string(),
                source,
            })?;
        Ok(status.code().unwrap_or(1))
    }
}

impl BackendRuntime for CgiRuntime {
    fn request(&self, request: BackendRequest) -> BoxFuture<'_, Result<BackendResponse, BackendError>> {
        self.run_request(request).boxed()
    }

    fn mount(&self, vfs_path: &Path, host_path: &Path) -> Result<(), BackendError> {
        if !host_path.is_dir() {
            return Err(BackendError::MountMissing(host_path.display().to_string()));
        }
        let mut mounts = self.mounts.write().unwrap_or_else(|e| e.into_inner());
        mounts.retain(|m| m.vfs != vfs_path);
        mounts.push(Mount {
            vfs: vfs_path.to_path_buf(),
            host: host_path.to_path_buf(),
        });
        tracing::debug!(vfs = %vfs_path.display(), host = %host_path.display(), "Mounted");
        Ok(())
    }

    fn chdir(&self, vfs_path: &Path) -> Result<(), BackendError> {
        let host = self.translate(vfs_path)?;
        *self.cwd.write().unwrap_or_else(|e| e.into_inner()) = Some(host);
        Ok(())
    }

    fn cli(
        &self,
        args: Vec<String>,
        env: Vec<(String, String)>,
    ) -> BoxFuture<'_, Result<i32, BackendError>> {
        self.run_cli(args, env).boxed()
    }
}

/// Builds a [`CgiRuntime`] during boot.
#[derive(Debug, Clone)]
pub struct CgiLoader {
    config: BackendConfig,
    absolute_url: String,
    document_root: PathBuf,
}

impl CgiLoader {
    pub fn new(config: BackendConfig, absolute_url: impl Into<String>, document_root: PathBuf) -> Self {
        Self {
            config,
            absolute_url: absolute_url.into(),
            document_root,
        }
    }
}

impl RuntimeLoader for CgiLoader {
    fn load(&self) -> BoxFuture<'_, Result<Arc<dyn BackendRuntime>, BackendError>> {
        async move {
            // Bare program names are resolved through PATH at spawn time.
            let program = &self.config.cgi_program;
            if program.components().count() > 1 && !program.exists() {
                return Err(BackendError::Spawn {
                    program: program.display().to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            let runtime = CgiRuntime::new(&self.config, &self.absolute_url, self.document_root.clone());
            Ok(Arc::new(runtime) as Arc<dyn BackendRuntime>)
        }
        .boxed()
    }
}

/// Parse a CGI response: headers, blank line, body.
pub fn parse_cgi_output(raw: &[u8]) -> Result<BackendResponse, BackendError> {
    let (head_len, sep_len) = find_header_end(raw)
        .ok_or_else(|| BackendError::MalformedResponse("missing header terminator".into()))?;
    let head = String::from_utf8_lossy(&raw[..head_len]);

    let mut status = None;
    let mut headers = HeaderMap::new();
    for line in head.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(BackendError::MalformedResponse(format!("bad header line '{line}'")));
        };
        let (name, value) = (name.trim(), value.trim());

        if name.eq_ignore_ascii_case("status") {
            let code = value
                .split_whitespace()
                .next()
                .and_then(|c| c.parse::<u16>().ok())
                .and_then(|c| StatusCode::from_u16(c).ok())
                .ok_or_else(|| BackendError::MalformedResponse(format!("bad status '{value}'")))?;
            status = Some(code);
            continue;
        }

        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;
        headers.append(name, value);
    }

    let status = status.unwrap_or(if headers.contains_key(header::LOCATION) {
        StatusCode::FOUND
    } else {
        StatusCode::OK
    });

    Ok(BackendResponse {
        status,
        headers,
        body: Bytes::copy_from_slice(&raw[head_len + sep_len..]),
    })
}

fn find_header_end(raw: &[u8]) -> Option<(usize, usize)> {
    let crlf = raw.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    let lf = raw.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}
