//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, URLs and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check every semantic constraint, collecting all failures.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "server.bind_address", &config.server.bind_address);
    check_socket_addr(&mut errors, "relay.bind_address", &config.relay.bind_address);

    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    check_url(&mut errors, "server.absolute_url", &config.server.absolute_url);
    check_url(&mut errors, "upstream.public_relay_url", &config.upstream.public_relay_url);
    if let Some(prefix) = &config.relay.upstream_prefix {
        check_url(&mut errors, "relay.upstream_prefix", prefix);
    }

    if config.relay.ready_timeout_secs == 0 {
        errors.push(ValidationError::new("relay.ready_timeout_secs", "must be > 0"));
    }
    if config.relay.ready_marker.trim().is_empty() {
        errors.push(ValidationError::new("relay.ready_marker", "must not be empty"));
    }
    if config.upstream.ceiling_bytes == 0 {
        errors.push(ValidationError::new("upstream.ceiling_bytes", "must be > 0"));
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::new("server.max_body_bytes", "must be > 0"));
    }
    if config.backend.front_controller.contains("..") {
        errors.push(ValidationError::new(
            "backend.front_controller",
            "must not contain '..'",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{value}' is not a socket address"),
        ));
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    match url::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, e.to_string())),
    }
}
