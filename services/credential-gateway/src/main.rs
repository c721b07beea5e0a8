//! Credential gateway
//!
//! Single-binary Rust service that:
//! 1. Accepts requests carrying HTTP Basic credentials
//! 2. Exchanges them for a bearer token with the authorization server
//!    (OAuth2 password grant)
//! 3. Rewrites the Authorization header and routes the request to its
//!    downstream service

mod classify;
mod config;
mod error;
mod error_body;
mod filter;
mod gateway_error;
mod health;
mod metrics;
mod proxy;
mod routes;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::net::TcpListener;
use token_client::AuthServerClient;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use crate::classify::RouteClassifier;
use crate::config::Config;
use crate::filter::{CredentialTranslationFilter, translate_credentials};
use crate::health::{DRAIN_TIMEOUT, HealthState, ServiceMetrics, local_router};
use crate::proxy::ProxyState;
use crate::routes::SharedRouteTable;

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    proxy: ProxyState,
    prometheus: PrometheusHandle,
}

/// Build the axum router.
///
/// `/metrics` and the local endpoints are served directly. Everything else
/// goes through credential translation and then routing. A concurrency
/// limit based on `max_connections` wraps the whole router.
fn build_router(
    state: AppState,
    filter: Arc<CredentialTranslationFilter>,
    max_connections: usize,
) -> Router {
    let gateway = Router::new()
        .fallback(gateway_handler)
        .layer(axum::middleware::from_fn_with_state(
            filter,
            translate_credentials,
        ))
        .with_state(state.clone());

    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(state.clone())
        .merge(state.proxy.local.clone())
        .merge(gateway)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting credential-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        auth_server = %config.auth_server.location_uri,
        service_name = %config.auth_server.name,
        routes = config.routes.len(),
        "configuration loaded"
    );

    if config.auth_server.password.is_none() {
        warn!(
            service_name = %config.auth_server.name,
            "no service password configured (AUTH_SERVER_PASSWORD or password_file); token requests will use an empty password"
        );
    }

    let auth_client = AuthServerClient::new(config.client_config())
        .context("failed to build authorization server client")?;
    info!(endpoint = auth_client.token_endpoint(), "token endpoint");

    let routes = SharedRouteTable::new(config.route_table()?);
    let metrics = ServiceMetrics::new();

    let filter = Arc::new(CredentialTranslationFilter::new(
        RouteClassifier::new(config.auth_server.token_path.clone()),
        routes.clone(),
        Arc::new(auth_client),
    ));

    let proxy_state = ProxyState {
        client: reqwest::Client::new(),
        routes: routes.clone(),
        local: local_router(HealthState {
            metrics: metrics.clone(),
            routes: routes.clone(),
        }),
        timeout: Duration::from_secs(config.proxy.timeout_secs),
        metrics: metrics.clone(),
    };

    let app_state = AppState {
        proxy: proxy_state,
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, filter, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    spawn_route_reload(config_path, routes);

    info!(addr = %listen_addr, "accepting requests");

    // Clone in_flight counter for drain observability after shutdown
    let in_flight = metrics.in_flight.clone();

    // The drain timeout starts when the shutdown signal fires: notify the
    // server to drain, then race the drain against the timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Catch-all handler routing every request that is not served locally.
async fn gateway_handler(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    proxy::route_request(&state.proxy, request, request_id).await
}

/// Re-read `[[routes]]` from `path` and swap them in. Requests already
/// holding a snapshot finish on the old table.
fn reload_routes(path: &Path, routes: &SharedRouteTable) -> common::Result<usize> {
    let table = Config::load(path)?.route_table()?;
    let count = table.len();
    routes.replace(table);
    Ok(count)
}

#[cfg(unix)]
fn spawn_route_reload(path: PathBuf, routes: SharedRouteTable) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to install SIGHUP handler; route reload disabled");
            return;
        }
    };
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match reload_routes(&path, &routes) {
                Ok(count) => info!(routes = count, "route table reloaded"),
                Err(e) => warn!(error = %e, "route reload failed; keeping current routes"),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_route_reload(_path: PathBuf, _routes: SharedRouteTable) {}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
