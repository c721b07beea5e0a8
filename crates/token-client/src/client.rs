//! Password-grant client for the authorization server
//!
//! Issues `POST <location>/oauth/token?grant_type=password&username=..&password=..`
//! with the gateway's service credentials as HTTP Basic auth. One call per
//! exchange, no retries: retry policy belongs to the transport in front of
//! the authorization server.

use common::{REDACTED, Secret};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::error::Error as _;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use crate::credentials::Credentials;
use crate::interpret::interpret;
use crate::token::{AccessToken, FailureKind, TranslationOutcome};

/// Path of the token endpoint below the authorization server location
pub const TOKEN_ENDPOINT_PATH: &str = "oauth/token";

/// Everything except RFC 3986 unreserved characters is encoded, so `+`,
/// `&` and `=` in a password can never be read as form syntax.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Abstraction over the token exchange so the gateway filter can be
/// driven by a stub in tests.
///
/// Boxed futures keep the trait object-safe, so the filter can hold an
/// `Arc<dyn TokenExchange>`.
pub trait TokenExchange: Send + Sync {
    fn exchange<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> Pin<Box<dyn Future<Output = TranslationOutcome> + Send + 'a>>;
}

/// Connection settings, fixed at startup
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the authorization server, e.g. `http://auth-server`
    pub location_uri: String,
    pub service_name: String,
    pub service_password: Secret<String>,
    pub connect_timeout: Duration,
    /// Longest wait for the next chunk of the response once connected
    pub read_timeout: Duration,
}

/// reqwest-backed [`TokenExchange`] implementation
pub struct AuthServerClient {
    http: reqwest::Client,
    token_endpoint: String,
    service_name: String,
    service_password: Secret<String>,
}

impl AuthServerClient {
    pub fn new(config: ClientConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            token_endpoint: format!(
                "{}/{TOKEN_ENDPOINT_PATH}",
                config.location_uri.trim_end_matches('/')
            ),
            service_name: config.service_name,
            service_password: config.service_password,
        })
    }

    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    /// Full request URL with user credentials already percent-encoded.
    fn token_request_url(&self, credentials: &Credentials) -> String {
        format!(
            "{}?grant_type=password&username={}&password={}",
            self.token_endpoint,
            utf8_percent_encode(&credentials.username, QUERY_VALUE),
            utf8_percent_encode(credentials.password.expose(), QUERY_VALUE),
        )
    }

    /// Run one password-grant exchange. Never panics or returns an error:
    /// every failure mode is folded into the outcome.
    pub async fn exchange(&self, credentials: &Credentials) -> TranslationOutcome {
        debug!(
            user = %credentials.username,
            endpoint = %self.token_endpoint,
            "requesting password-grant token"
        );

        let response = match self
            .http
            .post(self.token_request_url(credentials))
            .basic_auth(&self.service_name, Some(self.service_password.expose()))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return transport_failure(e, credentials),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return interpret(status, &body);
        }

        let body = match response.bytes().await {
            Ok(b) => b,
            Err(e) => return transport_failure(e, credentials),
        };
        match serde_json::from_slice::<AccessToken>(&body) {
            Ok(token) => TranslationOutcome::Success(token),
            Err(e) => {
                TranslationOutcome::upstream(FailureKind::Other, format!("invalid token response: {e}"))
            }
        }
    }
}

impl TokenExchange for AuthServerClient {
    fn exchange<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> Pin<Box<dyn Future<Output = TranslationOutcome> + Send + 'a>> {
        Box::pin(AuthServerClient::exchange(self, credentials))
    }
}

fn classify(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() || caused_by_io_timeout(err) {
        FailureKind::Timeout
    } else if err.is_connect() {
        FailureKind::Unavailable
    } else {
        FailureKind::Other
    }
}

fn caused_by_io_timeout(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

fn transport_failure(mut err: reqwest::Error, credentials: &Credentials) -> TranslationOutcome {
    let kind = classify(&err);
    if let Some(url) = err.url_mut() {
        redact_password_param(url);
    }

    let mut description = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        description.push_str(": ");
        description.push_str(&cause.to_string());
        source = cause.source();
    }

    let encoded = Secret::new(
        utf8_percent_encode(credentials.password.expose(), QUERY_VALUE).to_string(),
    );
    let description = encoded.scrub(&credentials.password.scrub(&description));
    TranslationOutcome::upstream(kind, description)
}

fn redact_password_param(url: &mut reqwest::Url) {
    if !url.query_pairs().any(|(name, _)| name == "password") {
        return;
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| {
            let value = if name == "password" {
                REDACTED.to_string()
            } else {
                value.into_owned()
            };
            (name.into_owned(), value)
        })
        .collect();
    url.query_pairs_mut().clear().extend_pairs(pairs);
}
