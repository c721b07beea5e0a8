//! Request routing
//!
//! Matches the request against the route table, then either forwards it to
//! the route's HTTP backend (hop-by-hop headers stripped, optional prefix
//! strip) or re-dispatches it to the local router for `forward:` targets.
//! Backend responses are returned verbatim, error statuses included.

use axum::Router;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tower::ServiceExt;
use tracing::{debug, error, instrument, warn};

use crate::error::RoutingError;
use crate::error_body::ErrorResponseBody;
use crate::gateway_error::{RoutingFailure, not_found, routing_error_response};
use crate::health::ServiceMetrics;
use crate::metrics;
use crate::routes::{Route, RouteSnapshot, RouteTarget, SharedRouteTable};

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Shared state for routing, cloned into each handler call
#[derive(Clone)]
pub struct ProxyState {
    pub client: reqwest::Client,
    pub routes: SharedRouteTable,
    /// Serves `forward:` targets
    pub local: Router,
    pub timeout: Duration,
    pub metrics: ServiceMetrics,
}

/// Route one request that already went through credential translation.
///
/// Dispatches on the request's [`RouteSnapshot`] when the translation
/// middleware attached one, so both steps see the same table.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn route_request(state: &ProxyState, request: Request, request_id: String) -> Response {
    let started = Instant::now();
    let _in_flight = state.metrics.enter();
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let routes = request
        .extensions()
        .get::<RouteSnapshot>()
        .map(|snapshot| Arc::clone(&snapshot.0))
        .unwrap_or_else(|| state.routes.snapshot());

    let response = match routes.match_route(&path) {
        None => {
            debug!("no route matched");
            not_found(&path)
        }
        Some(route) => {
            debug!(route = %route.id, target = %route.target, "route matched");
            let outcome = match &route.target {
                RouteTarget::Forward(local_path) => {
                    dispatch_local(&state.local, route, local_path, request).await
                }
                RouteTarget::Url(base) => forward(state, route, base, request).await,
            };
            match outcome {
                Ok(response) => response,
                Err(Forwarding::BadBody(message)) => ErrorResponseBody::build(
                    StatusCode::BAD_REQUEST,
                    &format!("invalid request body: {message}"),
                    Some(&path),
                )
                .into_response(),
                Err(Forwarding::Failed { uri, error }) => {
                    metrics::record_upstream_error(error.kind().as_str());
                    let target = route.target.to_string();
                    routing_error_response(&RoutingFailure {
                        route_id: &route.id,
                        target: &target,
                        uri: Some(&uri),
                        error: &error,
                    })
                }
            }
        }
    };

    let status = response.status();
    if status.is_server_error() {
        state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
    }
    metrics::record_request(
        status.as_u16(),
        method.as_str(),
        started.elapsed().as_secs_f64(),
    );
    response
}

enum Forwarding {
    BadBody(String),
    Failed { uri: String, error: RoutingError },
}

fn original_uri(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| uri.path().to_owned())
}

/// Target path plus the (possibly prefix-stripped) request path and query.
fn join_target(base: &str, route: &Route, uri: &Uri) -> String {
    let mut joined = base.trim_end_matches('/').to_owned();
    joined.push_str(route.downstream_path(uri.path()));
    if joined.is_empty() {
        joined.push('/');
    }
    if let Some(query) = uri.query() {
        joined.push('?');
        joined.push_str(query);
    }
    joined
}

async fn dispatch_local(
    local: &Router,
    route: &Route,
    local_path: &str,
    request: Request,
) -> Result<Response, Forwarding> {
    let (mut parts, body) = request.into_parts();
    let original = original_uri(&parts.uri);
    let target = join_target(local_path, route, &parts.uri);

    parts.uri = target.parse::<Uri>().map_err(|e| Forwarding::Failed {
        uri: original.clone(),
        error: RoutingError::Other(format!("invalid local path {target}: {e}")),
    })?;
    debug!(local = %parts.uri, "dispatching to local handler");

    match local.clone().oneshot(Request::from_parts(parts, body)).await {
        Ok(response) => Ok(response),
        Err(never) => match never {},
    }
}

async fn forward(
    state: &ProxyState,
    route: &Route,
    base: &str,
    request: Request,
) -> Result<Response, Forwarding> {
    let method = request.method().clone();
    let original = original_uri(request.uri());
    let upstream_url = join_target(base, route, request.uri());

    let mut headers = reqwest::header::HeaderMap::new();
    for (name, value) in request.headers() {
        if !is_hop_by_hop(name.as_str()) && *name != axum::http::header::HOST {
            headers.append(name.clone(), value.clone());
        }
    }

    let body_bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to read request body");
            Forwarding::BadBody(e.to_string())
        })?;

    for attempt in 0..MAX_ATTEMPTS {
        if attempt > 0 {
            warn!(attempt, "retrying after upstream timeout");
            tokio::time::sleep(RETRY_DELAY).await;
        }

        let sent = state
            .client
            .request(method.clone(), &upstream_url)
            .headers(headers.clone())
            .timeout(state.timeout)
            .body(body_bytes.clone())
            .send()
            .await;

        let upstream_response = match sent {
            Ok(r) => r,
            Err(e) if e.is_timeout() && attempt < MAX_ATTEMPTS - 1 => continue,
            Err(e) if e.is_timeout() => {
                return Err(Forwarding::Failed {
                    uri: original,
                    error: RoutingError::Timeout(format!(
                        "upstream timeout after {:?} ({MAX_ATTEMPTS} attempts)",
                        state.timeout
                    )),
                });
            }
            Err(e) => {
                return Err(Forwarding::Failed {
                    uri: original,
                    error: RoutingError::from_reqwest(&e),
                });
            }
        };

        let status = upstream_response.status();
        let resp_headers = upstream_response.headers().clone();
        let resp_body = upstream_response
            .bytes()
            .await
            .map_err(|e| Forwarding::Failed {
                uri: original.clone(),
                error: RoutingError::from_reqwest(&e),
            })?;

        let mut response = Response::builder().status(status);
        for (name, value) in &resp_headers {
            if !is_hop_by_hop(name.as_str()) {
                response = response.header(name, value);
            }
        }
        return response
            .body(Body::from(resp_body))
            .map_err(|e| Forwarding::Failed {
                uri: original.clone(),
                error: RoutingError::Other(format!("response build error: {e}")),
            });
    }

    Err(Forwarding::Failed {
        uri: original,
        error: RoutingError::Other("unexpected retry exhaustion".into()),
    })
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}
