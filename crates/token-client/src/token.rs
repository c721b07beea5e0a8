//! Token response and per-request exchange outcome

use serde::Deserialize;
use std::fmt;

/// Bearer token returned by the authorization server's token endpoint.
///
/// Request-scoped: it authorizes the one request it was issued for and is
/// dropped afterwards. Only `access_token` is required in the response
/// body; everything else is informational.
#[derive(Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Seconds until expiry (delta, not absolute)
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl AccessToken {
    /// Authorization header value presented to downstream services
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &common::REDACTED)
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Root-cause classification of a failed exchange, used to pick the
/// HTTP status the gateway answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No response within the configured deadline (504)
    Timeout,
    /// Connection refused/reset or a 5xx from the authorization server (503)
    Unavailable,
    /// Anything else: unexpected status, unparseable body (500)
    Other,
}

impl FailureKind {
    /// Label used for metrics and structured logs
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Unavailable => "connection",
            FailureKind::Other => "other",
        }
    }
}

/// Failure to obtain a token for reasons other than the user's password.
///
/// `reason` is safe to log: the end user's password has been scrubbed
/// from it. It is never returned to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl UpstreamFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason, self.kind.as_str())
    }
}

/// Result of exactly one token exchange.
#[derive(Debug, Clone)]
pub enum TranslationOutcome {
    Success(AccessToken),
    /// The authorization server rejected the user's credentials. The
    /// reason comes from its `error_description` and is for logs only.
    BadCredentials(String),
    UpstreamFailure(UpstreamFailure),
}

impl TranslationOutcome {
    pub fn upstream(kind: FailureKind, reason: impl Into<String>) -> Self {
        TranslationOutcome::UpstreamFailure(UpstreamFailure::new(kind, reason))
    }
}
