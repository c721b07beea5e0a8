//! Endpoints the gateway serves itself, and the counters behind `/health`

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{any, get};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::gateway_error::{NOT_FOUND_PATH, not_found_handler};
use crate::routes::SharedRouteTable;

/// How long in-flight requests may take to finish after a shutdown signal
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Process-lifetime counters. Cloning shares the underlying atomics.
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    /// Requests currently being routed; reported if the drain times out
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    /// Count one request as in flight until the guard drops.
    pub fn enter(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard(Arc::clone(&self.in_flight))
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InFlightGuard(Arc<AtomicU64>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[derive(Clone)]
pub struct HealthState {
    pub metrics: ServiceMetrics,
    pub routes: SharedRouteTable,
}

/// Health endpoint: status, uptime, request/error counts and route count.
pub async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.metrics.started_at.elapsed().as_secs(),
        "requests_served": state.metrics.requests_total.load(Ordering::Relaxed),
        "errors_total": state.metrics.errors_total.load(Ordering::Relaxed),
        "routes": state.routes.snapshot().len(),
    });
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Router for targets reachable through `forward:` routes.
pub fn local_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(NOT_FOUND_PATH, any(not_found_handler))
        .route(&format!("{NOT_FOUND_PATH}/{{*rest}}"), any(not_found_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::{Route, RouteTable, RouteTarget};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> HealthState {
        HealthState {
            metrics: ServiceMetrics::new(),
            routes: SharedRouteTable::new(RouteTable::new(vec![Route {
                id: "things".into(),
                pattern: "/things/**".into(),
                target: RouteTarget::Url("http://things".into()),
                strip_prefix: true,
            }])),
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_counters_and_routes() {
        let state = state();
        state.metrics.requests_total.fetch_add(5, Ordering::Relaxed);
        state.metrics.errors_total.fetch_add(2, Ordering::Relaxed);

        let (status, json) = get_json(local_router(state), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["requests_served"], 5);
        assert_eq!(json["errors_total"], 2);
        assert_eq!(json["routes"], 1);
        assert!(json["uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn not_found_is_served_locally() {
        let (status, json) = get_json(local_router(state()), "/notFound/gone").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["path"], "/gone");
    }

    #[test]
    fn in_flight_guard_decrements_on_drop() {
        let metrics = ServiceMetrics::new();
        {
            let _first = metrics.enter();
            let _second = metrics.enter();
            assert_eq!(metrics.in_flight.load(Ordering::Relaxed), 2);
        }
        assert_eq!(metrics.in_flight.load(Ordering::Relaxed), 0);
    }
}
