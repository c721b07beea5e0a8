//! Pre-routing credential translation
//!
//! Per request: `Unclassified -> (Skipped | Extracting) -> Exchanging ->
//! (Forwarded | Rejected | Failed)`. A malformed Basic header goes from
//! `Extracting` straight to `Failed`. Exactly one of the terminal states
//! is reached, and only `Skipped`/`Forwarded` let the request continue to
//! routing.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Instant;
use token_client::{
    Credentials, FailureKind, TokenExchange, TranslationOutcome, UpstreamFailure,
};
use tracing::{debug, warn};

use crate::classify::RouteClassifier;
use crate::error_body::ErrorResponseBody;
use crate::metrics;
use crate::routes::{RouteSnapshot, RouteTable, SharedRouteTable};

/// Client-facing message for rejected credentials. The authorization
/// server's reason is logged, never returned.
pub const ACCESS_DENIED: &str = "Access Denied";

pub const MALFORMED_HEADER: &str = "Unable to process the Authorization header";

const TIMEOUT_MESSAGE: &str = "Authorization server did not respond in time";
const UNAVAILABLE_MESSAGE: &str = "Authorization server unavailable";
const PROCESSING_ERROR: &str = "Exception processing authentication request";

/// Terminal state of one pass through the filter
#[derive(Debug)]
pub enum Disposition {
    /// Not intercepted; headers untouched
    Skipped,
    /// Authorization header now carries the bearer token
    Forwarded,
    /// Credentials refused (401)
    Rejected(Response),
    /// Malformed header or exchange failure
    Failed(Response),
}

impl Disposition {
    pub fn label(&self) -> &'static str {
        match self {
            Disposition::Skipped => "skipped",
            Disposition::Forwarded => "forwarded",
            Disposition::Rejected(_) => "rejected",
            Disposition::Failed(_) => "failed",
        }
    }
}

pub struct CredentialTranslationFilter {
    classifier: RouteClassifier,
    routes: SharedRouteTable,
    exchanger: Arc<dyn TokenExchange>,
}

impl CredentialTranslationFilter {
    pub fn new(
        classifier: RouteClassifier,
        routes: SharedRouteTable,
        exchanger: Arc<dyn TokenExchange>,
    ) -> Self {
        Self {
            classifier,
            routes,
            exchanger,
        }
    }

    /// Current route table; take it once per request.
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.routes.snapshot()
    }

    /// Run the translation for one request against `routes`, rewriting
    /// `headers` on success.
    pub async fn apply(
        &self,
        path: &str,
        headers: &mut HeaderMap,
        routes: &RouteTable,
    ) -> Disposition {
        let disposition = self.translate(path, headers, routes).await;
        metrics::record_translation(disposition.label());
        disposition
    }

    async fn translate(
        &self,
        path: &str,
        headers: &mut HeaderMap,
        routes: &RouteTable,
    ) -> Disposition {
        let extracted = {
            let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
            if !self
                .classifier
                .should_intercept(path, authorization, routes)
            {
                return Disposition::Skipped;
            }
            Credentials::from_basic_header(authorization.unwrap_or_default())
        };

        let credentials = match extracted {
            Ok(c) => c,
            Err(e) => {
                warn!(cause = %e, path, "unable to process authorization header");
                return Disposition::Failed(
                    ErrorResponseBody::build(StatusCode::BAD_REQUEST, MALFORMED_HEADER, Some(path))
                        .into_response(),
                );
            }
        };

        let started = Instant::now();
        let outcome = self.exchanger.exchange(&credentials).await;
        metrics::record_exchange_duration(started.elapsed().as_secs_f64());

        match outcome {
            TranslationOutcome::Success(token) => {
                let mut value = match HeaderValue::from_str(&token.bearer_header()) {
                    Ok(v) => v,
                    Err(_) => {
                        return failed(
                            &credentials,
                            &UpstreamFailure::new(
                                FailureKind::Other,
                                "access token is not a valid header value",
                            ),
                            path,
                        );
                    }
                };
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
                debug!(user = %credentials.username, "basic credentials translated to bearer token");
                Disposition::Forwarded
            }
            TranslationOutcome::BadCredentials(reason) => {
                warn!(
                    user = %credentials.username,
                    cause = %reason,
                    "authentication request failed"
                );
                Disposition::Rejected(
                    ErrorResponseBody::build(StatusCode::UNAUTHORIZED, ACCESS_DENIED, Some(path))
                        .into_response(),
                )
            }
            TranslationOutcome::UpstreamFailure(failure) => failed(&credentials, &failure, path),
        }
    }
}

fn failed(credentials: &Credentials, failure: &UpstreamFailure, path: &str) -> Disposition {
    warn!(
        user = %credentials.username,
        cause = %failure.reason,
        kind = failure.kind.as_str(),
        "exception processing authentication request"
    );
    debug!(user = %credentials.username, ?failure, "token exchange failure detail");

    let (status, message) = match failure.kind {
        FailureKind::Timeout => (StatusCode::GATEWAY_TIMEOUT, TIMEOUT_MESSAGE),
        FailureKind::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_MESSAGE),
        FailureKind::Other => (StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_ERROR),
    };
    Disposition::Failed(ErrorResponseBody::build(status, message, Some(path)).into_response())
}

/// axum middleware: the pre-routing hook, run once per inbound request.
///
/// The route snapshot used for classification travels with the request as
/// a [`RouteSnapshot`] extension, so routing cannot see a different table.
pub async fn translate_credentials(
    State(filter): State<Arc<CredentialTranslationFilter>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    let routes = filter.snapshot();
    match filter.apply(&path, request.headers_mut(), &routes).await {
        Disposition::Skipped | Disposition::Forwarded => {
            request.extensions_mut().insert(RouteSnapshot(routes));
            next.run(request).await
        }
        Disposition::Rejected(response) | Disposition::Failed(response) => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::{Route, RouteTarget};
    use crate::test_support::capture_logs;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use token_client::AccessToken;

    /// Canned exchanger recording every call it receives
    struct StubExchange {
        outcome: TranslationOutcome,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl StubExchange {
        fn new(outcome: TranslationOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl TokenExchange for StubExchange {
        fn exchange<'a>(
            &'a self,
            credentials: &'a Credentials,
        ) -> Pin<Box<dyn Future<Output = TranslationOutcome> + Send + 'a>> {
            self.calls.lock().unwrap().push((
                credentials.username.clone(),
                credentials.password.expose().clone(),
            ));
            let outcome = self.outcome.clone();
            Box::pin(async move { outcome })
        }
    }

    fn token(value: &str) -> TranslationOutcome {
        let token: AccessToken = serde_json::from_value(serde_json::json!({
            "access_token": value,
            "token_type": "bearer",
        }))
        .unwrap();
        TranslationOutcome::Success(token)
    }

    fn filter_with(stub: Arc<StubExchange>) -> CredentialTranslationFilter {
        let routes = SharedRouteTable::new(RouteTable::new(vec![
            Route {
                id: "local".into(),
                pattern: "/local/**".into(),
                target: RouteTarget::Forward("/notFound".into()),
                strip_prefix: false,
            },
            Route {
                id: "things".into(),
                pattern: "/things/**".into(),
                target: RouteTarget::Url("http://things".into()),
                strip_prefix: true,
            },
        ]));
        CredentialTranslationFilter::new(RouteClassifier::new("oauth"), routes, stub)
    }

    fn basic_headers(raw: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", STANDARD.encode(raw))).unwrap(),
        );
        headers
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn success_rewrites_authorization_to_bearer() {
        let stub = StubExchange::new(token("xyz"));
        let filter = filter_with(stub.clone());
        let mut headers = basic_headers("alice:secret");

        let disposition = filter.apply("/things/1", &mut headers, &filter.snapshot()).await;

        assert!(matches!(disposition, Disposition::Forwarded));
        assert_eq!(headers[AUTHORIZATION], "Bearer xyz");
        assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(stub.calls(), vec![("alice".into(), "secret".into())]);
    }

    #[tokio::test]
    async fn password_with_colon_reaches_exchange_intact() {
        let stub = StubExchange::new(token("t"));
        let filter = filter_with(stub.clone());
        let mut headers = basic_headers("alice:se:cr:et");

        filter.apply("/things/1", &mut headers, &filter.snapshot()).await;

        assert_eq!(stub.calls(), vec![("alice".into(), "se:cr:et".into())]);
    }

    #[tokio::test]
    async fn bad_credentials_answer_generic_401() {
        let stub = StubExchange::new(TranslationOutcome::BadCredentials("bad password".into()));
        let filter = filter_with(stub);
        let mut headers = basic_headers("alice:secret");
        let (logs, _guard) = capture_logs();

        let disposition = filter.apply("/things/1", &mut headers, &filter.snapshot()).await;

        let Disposition::Rejected(response) = disposition else {
            panic!("expected Rejected, got {disposition:?}");
        };
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["message"], ACCESS_DENIED);
        assert_eq!(json["status"], 401);
        assert_eq!(json["path"], "/things/1");
        assert!(!json.to_string().contains("bad password"));

        let logs = logs.contents();
        assert!(logs.contains("WARN"), "got: {logs}");
        assert!(logs.contains("alice"));
        assert!(logs.contains("bad password"), "reason must be logged");
        assert!(!logs.contains("secret"), "password leaked: {logs}");
    }

    #[tokio::test]
    async fn timeout_answers_504_and_logs_without_password() {
        let stub = StubExchange::new(TranslationOutcome::upstream(
            FailureKind::Timeout,
            "operation timed out",
        ));
        let filter = filter_with(stub);
        let mut headers = basic_headers("alice:secret");
        let (logs, _guard) = capture_logs();

        let disposition = filter.apply("/things/1", &mut headers, &filter.snapshot()).await;

        let Disposition::Failed(response) = disposition else {
            panic!("expected Failed, got {disposition:?}");
        };
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let json = body_json(response).await;
        assert_eq!(json["status"], 504);
        assert_eq!(json["error"], "Gateway Timeout");

        let logs = logs.contents();
        assert!(logs.contains("alice"), "got: {logs}");
        assert!(!logs.contains("secret"), "password leaked: {logs}");
    }

    #[tokio::test]
    async fn upstream_failure_status_follows_root_cause() {
        let cases = [
            (FailureKind::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (FailureKind::Unavailable, StatusCode::SERVICE_UNAVAILABLE),
            (FailureKind::Other, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (kind, expected) in cases {
            let stub = StubExchange::new(TranslationOutcome::upstream(
                kind,
                "Invalid username or password",
            ));
            let filter = filter_with(stub);
            let mut headers = basic_headers("alice:secret");
            match filter.apply("/things/1", &mut headers, &filter.snapshot()).await {
                Disposition::Failed(response) => assert_eq!(response.status(), expected),
                other => panic!("expected Failed for {kind:?}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn non_basic_header_is_left_untouched() {
        let stub = StubExchange::new(token("xyz"));
        let filter = filter_with(stub.clone());
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Digest abc123"));

        let disposition = filter.apply("/things/1", &mut headers, &filter.snapshot()).await;

        assert!(matches!(disposition, Disposition::Skipped));
        assert_eq!(headers[AUTHORIZATION], "Digest abc123");
        assert!(stub.calls().is_empty(), "no exchange for skipped requests");
    }

    #[tokio::test]
    async fn issuance_and_local_paths_never_call_exchange() {
        let stub = StubExchange::new(token("xyz"));
        let filter = filter_with(stub.clone());
        for path in ["/oauth/token", "/local/thing"] {
            let mut headers = basic_headers("alice:secret");
            let before = headers.clone();
            let disposition = filter.apply(path, &mut headers, &filter.snapshot()).await;
            assert!(matches!(disposition, Disposition::Skipped), "{path}");
            assert_eq!(headers, before);
        }
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn malformed_header_is_processing_error_not_401() {
        let stub = StubExchange::new(token("xyz"));
        let filter = filter_with(stub.clone());
        for raw in ["Basic !!!", "Basic bm8tY29sb24="] {
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, HeaderValue::from_static(raw));

            match filter.apply("/things/1", &mut headers, &filter.snapshot()).await {
                Disposition::Failed(response) => {
                    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
                    let json = body_json(response).await;
                    assert_eq!(json["message"], MALFORMED_HEADER);
                }
                other => panic!("expected Failed for {raw}, got {other:?}"),
            }
        }
        assert!(stub.calls().is_empty(), "no exchange for malformed headers");
    }

    #[tokio::test]
    async fn middleware_forwards_rewritten_request_or_short_circuits() {
        use axum::Router;
        use axum::body::Body;
        use axum::routing::get;
        use tower::ServiceExt;

        fn app(stub: Arc<StubExchange>) -> Router {
            let filter = Arc::new(filter_with(stub));
            Router::new()
                .route(
                    "/things/1",
                    get(|headers: HeaderMap| async move {
                        headers
                            .get(AUTHORIZATION)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("none")
                            .to_string()
                    }),
                )
                .layer(axum::middleware::from_fn_with_state(
                    filter,
                    translate_credentials,
                ))
        }

        let request = || {
            axum::http::Request::builder()
                .uri("/things/1")
                .header(
                    AUTHORIZATION,
                    format!("Basic {}", STANDARD.encode("alice:secret")),
                )
                .body(Body::empty())
                .unwrap()
        };

        let response = app(StubExchange::new(token("xyz")))
            .oneshot(request())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"Bearer xyz");

        let response = app(StubExchange::new(TranslationOutcome::BadCredentials(
            "nope".into(),
        )))
        .oneshot(request())
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
