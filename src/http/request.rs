//! Request translation.
//!
//! # Responsibilities
//! - Buffer the body up to the configured limit
//! - Produce a `BackendRequest` carrying method, path+query, headers, body
//!
//! # Design Decisions
//! - A declared `Content-Length` over the limit is rejected before reading
//! - The URL handed to the backend is the raw path and query, never absolute

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
};

use crate::backend::BackendRequest;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Why a request could not be handed to the backend.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    BodyRead(String),
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RequestError::BodyRead(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Request ID assigned by the middleware stack, or `"unknown"`.
pub fn request_id<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Buffer `request` and convert it for the backend.
pub async fn into_backend_request(
    request: Request<Body>,
    limit: usize,
) -> Result<BackendRequest, RequestError> {
    let (parts, body) = request.into_parts();

    let declared = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(RequestError::BodyTooLarge { limit });
    }

    let body = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| RequestError::BodyRead(e.to_string()))?;

    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    Ok(BackendRequest {
        method: parts.method,
        url,
        headers: parts.headers,
        body,
    })
}
