//! Header sanitization for relayed responses.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers
//! - Strip upstream auth challenges so a local caller is never prompted
//! - Inject a wildcard CORS allow header

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Headers scoped to a single connection (RFC 9110 §7.6.1).
const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Challenges that would otherwise leak to an unrelated local caller.
const AUTH_CHALLENGES: [HeaderName; 2] = [header::WWW_AUTHENTICATE, header::PROXY_AUTHENTICATE];

/// Sanitize upstream headers for relaying.
pub fn sanitize(mut headers: HeaderMap) -> HeaderMap {
    // Names listed in `Connection` are hop-by-hop as well.
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in HOP_BY_HOP.iter().chain(AUTH_CHALLENGES.iter()).chain(listed.iter()) {
        headers.remove(name);
    }
    headers.remove("keep-alive");

    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers
}
