//! Error hook for failures that happen after credential translation,
//! while a request is being routed downstream.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use token_client::FailureKind;
use tracing::{debug, warn};

use crate::error::RoutingError;
use crate::error_body::ErrorResponseBody;

/// Local endpoint that answers 404 for whatever path follows it
pub const NOT_FOUND_PATH: &str = "/notFound";

/// Everything known about one failed routing attempt
#[derive(Debug)]
pub struct RoutingFailure<'a> {
    pub route_id: &'a str,
    pub target: &'a str,
    /// Original request URI, when it could be recovered
    pub uri: Option<&'a str>,
    pub error: &'a RoutingError,
}

/// Build the JSON error response for a routing failure.
///
/// Timeouts answer 504 and unreachable services 503, both with the failure
/// message. Anything else is a 500 naming the route.
pub fn routing_error_response(failure: &RoutingFailure<'_>) -> Response {
    let uri = failure.uri;
    warn!(
        route = failure.route_id,
        target = failure.target,
        uri = uri.unwrap_or(crate::error_body::UNKNOWN_PATH),
        error = %failure.error,
        "Using route '{}' to service '{}' for request '{}' failed",
        failure.route_id,
        failure.target,
        uri.unwrap_or(crate::error_body::UNKNOWN_PATH),
    );
    debug!(?failure, "routing failure detail");

    let message = failure.error.to_string();
    let body = match failure.error.kind() {
        FailureKind::Timeout => ErrorResponseBody::build(StatusCode::GATEWAY_TIMEOUT, &message, uri),
        FailureKind::Unavailable => {
            ErrorResponseBody::build(StatusCode::SERVICE_UNAVAILABLE, &message, uri)
        }
        FailureKind::Other => ErrorResponseBody::build(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Gateway error: '{}' failed: {message}", failure.route_id),
            uri,
        ),
    };
    body.into_response()
}

/// 404 body for `path`, with no message.
pub fn not_found(path: &str) -> Response {
    ErrorResponseBody::status_only(StatusCode::NOT_FOUND, path).into_response()
}

/// Handler for `/notFound/**`: reports the path that followed the prefix.
pub async fn not_found_handler(request: Request) -> Response {
    let path = request.uri().path();
    let original = path.strip_prefix(NOT_FOUND_PATH).unwrap_or(path);
    not_found(if original.is_empty() { "/" } else { original })
}
