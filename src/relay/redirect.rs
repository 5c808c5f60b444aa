//! Bounded redirect chasing.
//!
//! # State Machine
//! ```text
//! fetch(url, depth=0)
//!     → 301/302/303/307/308 + Location: drain body, resolve Location,
//!       depth += 1, depth > max → TooManyRedirects, else loop
//!     → any other status: terminal, sanitize headers, stream body
//!     → transport error at any hop: Transport
//! ```

use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use url::Url;

use crate::observability::metrics;
use crate::relay::headers;

/// Current position in a redirect chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectChain {
    pub current_url: Url,
    pub depth: u32,
}

impl RedirectChain {
    pub fn new(start: Url) -> Self {
        Self {
            current_url: start,
            depth: 0,
        }
    }

    /// Move to `location`, resolved against the current URL.
    pub fn follow(&mut self, location: &str) -> Result<(), RelayError> {
        let next = self
            .current_url
            .join(location)
            .map_err(|e| RelayError::InvalidLocation {
                location: location.to_string(),
                reason: e.to_string(),
            })?;
        self.current_url = next;
        self.depth += 1;
        Ok(())
    }
}

/// Relay failure classes.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("missing 'url' query parameter")]
    MissingTarget,

    #[error("invalid target url '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("too many redirects ({0})")]
    TooManyRedirects(u32),

    #[error("invalid redirect location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl RelayError {
    /// Status reported to the caller for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingTarget | RelayError::InvalidTarget { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = match &self {
            RelayError::MissingTarget => "[Relay] Missing 'url' query parameter.".to_string(),
            RelayError::TooManyRedirects(n) => format!("[Relay] Error: Too many redirects ({n})"),
            other => format!("Proxy Error: {other}"),
        };
        (self.status(), [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
    }
}

/// Terminal upstream response, sanitized and ready to stream.
#[derive(Debug)]
pub struct RelayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Final URL after redirects.
    pub url: Url,
    /// Redirects followed to reach `url`.
    pub redirects: u32,
    body: reqwest::Response,
}

impl IntoResponse for RelayResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from_stream(self.body.bytes_stream()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Outbound fetcher following redirects by hand.
#[derive(Debug, Clone)]
pub struct Relay {
    client: reqwest::Client,
    max_redirects: u32,
    upstream_prefix: Option<String>,
}

impl Relay {
    /// `client` must not follow redirects on its own.
    pub fn new(client: reqwest::Client, max_redirects: u32) -> Self {
        Self {
            client,
            max_redirects,
            upstream_prefix: None,
        }
    }

    /// Wrap every target as `<prefix><percent-encoded target>`.
    pub fn with_upstream_prefix(mut self, prefix: Option<String>) -> Self {
        self.upstream_prefix = prefix;
        self
    }

    /// Parse a caller-supplied target into an absolute http(s) URL.
    pub fn parse_target(&self, raw: &str) -> Result<Url, RelayError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RelayError::MissingTarget);
        }
        let target = Url::parse(raw).map_err(|e| RelayError::InvalidTarget {
            target: raw.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(RelayError::InvalidTarget {
                target: raw.to_string(),
                reason: format!("unsupported scheme '{}'", target.scheme()),
            });
        }

        match &self.upstream_prefix {
            None => Ok(target),
            Some(prefix) => {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(target.as_str().as_bytes()).collect();
                Url::parse(&format!("{prefix}{encoded}")).map_err(|e| RelayError::InvalidTarget {
                    target: raw.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Fetch `target`, chasing redirects up to the configured bound.
    pub async fn fetch(&self, target: Url) -> Result<RelayResponse, RelayError> {
        let mut chain = RedirectChain::new(target);

        loop {
            let mut response = self.client.get(chain.current_url.clone()).send().await?;
            let status = response.status();

            let location = is_redirect(status)
                .then(|| response.headers().get(header::LOCATION))
                .flatten()
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);

            let Some(location) = location else {
                metrics::record_relay(status.as_u16());
                return Ok(RelayResponse {
                    status,
                    headers: headers::sanitize(response.headers().clone()),
                    url: chain.current_url,
                    redirects: chain.depth,
                    body: response,
                });
            };

            // Drain so the connection can be reused; errors here do not matter.
            while let Ok(Some(_)) = response.chunk().await {}

            chain.follow(&location)?;
            metrics::record_redirect();
            tracing::debug!(
                location = %chain.current_url,
                depth = chain.depth,
                "Following redirect"
            );

            if chain.depth > self.max_redirects {
                tracing::warn!(depth = chain.depth, "Redirect limit exceeded");
                return Err(RelayError::TooManyRedirects(chain.depth));
            }
        }
    }

    /// Fetch and turn the outcome into a response, written exactly once.
    pub async fn respond(&self, target: Url) -> Response {
        match self.fetch(target).await {
            Ok(relayed) => relayed.into_response(),
            Err(e) => {
                tracing::error!(error = %e, "Relay request failed");
                metrics::record_relay(e.status().as_u16());
                e.into_response()
            }
        }
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::transport::{build_client, RedirectMode};

    fn relay() -> Relay {
        let client = build_client("test", RedirectMode::Manual).unwrap();
        Relay::new(client, 5)
    }

    #[test]
    fn chain_resolves_relative_and_absolute_locations() {
        let mut chain = RedirectChain::new(Url::parse("https://a.example/dir/page").unwrap());

        chain.follow("/login").unwrap();
        assert_eq!(chain.current_url.as_str(), "https://a.example/login");
        assert_eq!(chain.depth, 1);

        chain.follow("next?x=1").unwrap();
        assert_eq!(chain.current_url.as_str(), "https://a.example/next?x=1");

        chain.follow("http://b.example/").unwrap();
        assert_eq!(chain.current_url.as_str(), "http://b.example/");
        assert_eq!(chain.depth, 3);
    }

    #[test]
    fn redirect_statuses() {
        for code in [301, 302, 303, 307, 308] {
            assert!(is_redirect(StatusCode::from_u16(code).unwrap()));
        }
        for code in [200, 300, 304, 404] {
            assert!(!is_redirect(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn parse_target_rejects_empty_and_bad_schemes() {
        let relay = relay();
        assert!(matches!(relay.parse_target(""), Err(RelayError::MissingTarget)));
        assert!(matches!(relay.parse_target("   "), Err(RelayError::MissingTarget)));
        assert!(matches!(
            relay.parse_target("ftp://files.example/x"),
            Err(RelayError::InvalidTarget { .. })
        ));
        assert!(matches!(
            relay.parse_target("not a url"),
            Err(RelayError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn upstream_prefix_wraps_encoded_target() {
        let relay = relay().with_upstream_prefix(Some(
            "https://api.codetabs.com/v1/proxy?quest=".to_string(),
        ));
        let url = relay.parse_target("https://getcomposer.org/a b?x=1&y=2").unwrap();
        assert_eq!(url.host_str(), Some("api.codetabs.com"));
        let quest: Vec<_> = url.query_pairs().collect();
        assert_eq!(quest[0].0, "quest");
        assert_eq!(quest[0].1, "https://getcomposer.org/a%20b?x=1&y=2");
    }

    #[test]
    fn error_statuses() {
        assert_eq!(RelayError::MissingTarget.status(), StatusCode::BAD_REQUEST);
        assert_eq!(RelayError::TooManyRedirects(6).status(), StatusCode::BAD_GATEWAY);
    }
}
