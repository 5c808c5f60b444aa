//! Environment exported to the backend.

use std::path::PathBuf;

use crate::config::loader::{ENV_DISABLE_CURL, ENV_PACKAGE_TIMEOUT, ENV_RELAY_URL};
use crate::config::BackendConfig;

/// Package-manager manifest name.
pub const ENV_COMPOSER: &str = "COMPOSER";
/// Interpreter path tools use to re-spawn themselves.
pub const ENV_PHP_BINARY: &str = "PHP_BINARY";
/// Set when `PHP_BINARY` is the gateway itself; argv then implies `exec`.
pub const ENV_EXEC_SHIM: &str = "SIDECAR_GATEWAY_EXEC_SHIM";

/// Flag accepted by `exec` in place of the interpreter's `-d` form.
pub const DISABLE_FUNCTIONS_FLAG: &str = "--disable-functions";
const DISABLED_FUNCTIONS: &str = "disable_functions=proc_open,popen";

/// Variables every backend invocation receives.
///
/// Collaborators inside the sandbox read `LOCAL_PROXY_URL` to route their
/// outbound calls through the relay.
pub fn backend_environment(config: &BackendConfig) -> Vec<(String, String)> {
    let mut env = vec![
        (ENV_RELAY_URL.to_string(), config.relay_base_url.clone()),
        (ENV_COMPOSER.to_string(), "composer.json".to_string()),
        (
            ENV_PACKAGE_TIMEOUT.to_string(),
            config.package_timeout_secs.to_string(),
        ),
    ];
    if config.disable_curl_transport {
        env.push((ENV_DISABLE_CURL.to_string(), "1".to_string()));
    }
    match php_binary(config) {
        Some((path, shim)) => {
            env.push((ENV_PHP_BINARY.to_string(), path.display().to_string()));
            if shim {
                env.push((ENV_EXEC_SHIM.to_string(), "1".to_string()));
            }
        }
        None => tracing::debug!("Could not resolve gateway executable; PHP_BINARY not exported"),
    }
    env
}

/// Configured binary, or the running gateway (which then needs the shim).
fn php_binary(config: &BackendConfig) -> Option<(PathBuf, bool)> {
    match &config.php_binary {
        Some(path) => Some((path.clone(), false)),
        None => std::env::current_exe().ok().map(|exe| (exe, true)),
    }
}

/// Overlay `host` on top of `base`; host values win.
pub fn overlay(base: Vec<(String, String)>, host: impl IntoIterator<Item = (String, String)>) -> Vec<(String, String)> {
    let mut merged = base;
    for (key, value) in host {
        match merged.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => merged.push((key, value)),
        }
    }
    merged
}

/// Rewrite `exec` arguments for the interpreter.
///
/// The first `--disable-functions` is removed and replaced by a leading
/// `-d disable_functions=proc_open,popen`.
pub fn cli_args(mut args: Vec<String>) -> Vec<String> {
    let Some(at) = args.iter().position(|a| a == DISABLE_FUNCTIONS_FLAG) else {
        return args;
    };
    args.remove(at);
    let mut rewritten = Vec::with_capacity(args.len() + 2);
    rewritten.push("-d".to_string());
    rewritten.push(DISABLED_FUNCTIONS.to_string());
    rewritten.extend(args);
    rewritten
}
