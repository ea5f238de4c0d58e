//! HTTP request spans.

use axum::{body::Body, http::Request};
use tracing::{Span, info_span};

/// Span for one HTTP request.
///
/// Records the path only. The socket handshake carries the bearer token in
/// the query string, so the full URI must never reach the logs.
pub fn request_span(request: &Request<Body>) -> Span {
    info_span!(
        "http_request",
        method = %request.method(),
        path = %request.uri().path(),
    )
}
