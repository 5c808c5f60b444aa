//! Response shaping.
//!
//! # Responsibilities
//! - Relay backend responses, minus headers the gateway is told to drop
//! - Produce the fixed gateway responses for boot states and errors
//!
//! # Design Decisions
//! - `X-Frame-Options` is stripped by default so the app can be framed
//! - Framing headers from the backend are dropped; the body is re-framed here

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use crate::backend::BackendResponse;

/// Parse configured header names, skipping anything invalid.
pub fn parse_strip_list(names: &[String]) -> Vec<HeaderName> {
    names
        .iter()
        .filter_map(|name| match HeaderName::from_bytes(name.trim().as_bytes()) {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!(header = %name, "Ignoring invalid header name in strip list");
                None
            }
        })
        .collect()
}

/// Convert a backend response, removing `strip` headers.
pub fn from_backend(backend: BackendResponse, strip: &[HeaderName]) -> Response {
    let mut headers = backend.headers;
    for name in strip {
        headers.remove(name);
    }
    for name in [header::CONTENT_LENGTH, header::TRANSFER_ENCODING, header::CONNECTION] {
        headers.remove(name);
    }

    let mut response = Response::new(Body::from(backend.body));
    *response.status_mut() = backend.status;
    *response.headers_mut() = headers;
    response
}

/// The runtime just came up; ask the client to repeat the request.
pub fn retry_redirect(uri: &Uri) -> Response {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let location = HeaderValue::from_str(target).unwrap_or_else(|_| HeaderValue::from_static("/"));
    let mut response = StatusCode::FOUND.into_response();
    response.headers_mut().insert(header::LOCATION, location);
    response
}

pub fn booting() -> Response {
    (StatusCode::ACCEPTED, "Booting...").into_response()
}

pub fn boot_failed() -> Response {
    (StatusCode::BAD_GATEWAY, "Backend boot failed").into_response()
}

pub fn backend_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal backend error").into_response()
}
