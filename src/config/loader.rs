//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Relay base URL handed to the backend.
pub const ENV_RELAY_URL: &str = "LOCAL_PROXY_URL";
/// Package-manager timeout in seconds.
pub const ENV_PACKAGE_TIMEOUT: &str = "COMPOSER_PROCESS_TIMEOUT";
/// Disables the curl transport inside the sandbox.
pub const ENV_DISABLE_CURL: &str = "COMPOSER_DISABLE_CURL";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// An environment value that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredOverride {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

impl IgnoredOverride {
    /// Report through `tracing`. Call once the subscriber is installed.
    pub fn log(&self) {
        tracing::warn!(
            key = self.key,
            value = %self.value,
            error = %self.reason,
            "Ignoring unparsable environment override"
        );
    }
}

/// Fold the recognized environment keys into `config`.
///
/// `lookup` abstracts the environment so callers decide where values come
/// from; `main` passes `std::env::var`. This runs before logging exists, so
/// unparsable values are returned rather than logged.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Vec<IgnoredOverride>
where
    F: Fn(&str) -> Option<String>,
{
    let mut ignored = Vec::new();

    if let Some(url) = lookup(ENV_RELAY_URL).filter(|v| !v.is_empty()) {
        config.backend.relay_base_url = url;
    }

    if let Some(raw) = lookup(ENV_PACKAGE_TIMEOUT) {
        match raw.trim().parse::<u64>() {
            Ok(secs) => config.backend.package_timeout_secs = secs,
            Err(e) => ignored.push(IgnoredOverride {
                key: ENV_PACKAGE_TIMEOUT,
                value: raw,
                reason: e.to_string(),
            }),
        }
    }

    if let Some(raw) = lookup(ENV_DISABLE_CURL) {
        config.backend.disable_curl_transport = parse_flag(&raw);
    }

    ignored
}

fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_recognized_keys() {
        let mut config = GatewayConfig::default();
        let ignored = apply_env_overrides(
            &mut config,
            env(&[
                (ENV_RELAY_URL, "http://127.0.0.1:7777/?url="),
                (ENV_PACKAGE_TIMEOUT, "1200"),
                (ENV_DISABLE_CURL, "0"),
            ]),
        );
        assert!(ignored.is_empty());

        assert_eq!(config.backend.relay_base_url, "http://127.0.0.1:7777/?url=");
        assert_eq!(config.backend.package_timeout_secs, 1200);
        assert!(!config.backend.disable_curl_transport);
    }

    #[test]
    fn bad_timeout_keeps_default() {
        let mut config = GatewayConfig::default();
        let ignored = apply_env_overrides(&mut config, env(&[(ENV_PACKAGE_TIMEOUT, "soon")]));
        assert_eq!(config.backend.package_timeout_secs, 600);
        assert_eq!(ignored.len(), 1);
        assert_eq!(ignored[0].key, ENV_PACKAGE_TIMEOUT);
        assert_eq!(ignored[0].value, "soon");
    }

    #[test]
    fn load_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nbind_address = \"127.0.0.1:8100\"\n\n[relay]\nspawn_sidecar = false\n"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:8100");
        assert!(!config.relay.spawn_sidecar);
        assert_eq!(config.relay.bind_address, "127.0.0.1:9999");
    }

    #[test]
    fn load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[relay]\nbind_address = \"nowhere\"\n").unwrap();

        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
