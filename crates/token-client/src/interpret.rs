//! Interpretation of authorization-server error responses
//!
//! A 400 from the token endpoint means the password grant itself was
//! refused (wrong password, disabled account). Every other non-2xx status
//! is an upstream problem, regardless of what the body says. A 401 in
//! particular means the gateway's own service credentials were refused.

use reqwest::StatusCode;
use serde_json::Value;
use std::collections::HashMap;

use crate::token::{FailureKind, TranslationOutcome};

/// Returned when the body carries no usable `error_description`
pub const FALLBACK_DESCRIPTION: &str = "Invalid username or password";

const ERROR_DESCRIPTION: &str = "error_description";

/// Extract `error_description` from a flat JSON object.
///
/// Empty, non-JSON, non-object or description-less bodies all yield
/// [`FALLBACK_DESCRIPTION`]; parse failures are never propagated.
pub fn describe(body: &str) -> String {
    if body.trim().is_empty() {
        return FALLBACK_DESCRIPTION.to_string();
    }

    serde_json::from_str::<HashMap<String, Value>>(body)
        .ok()
        .and_then(|mut fields| match fields.remove(ERROR_DESCRIPTION) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            _ => None,
        })
        .unwrap_or_else(|| FALLBACK_DESCRIPTION.to_string())
}

/// Map a non-2xx token endpoint response to an outcome.
pub fn interpret(status: StatusCode, body: &str) -> TranslationOutcome {
    match status {
        StatusCode::BAD_REQUEST => TranslationOutcome::BadCredentials(describe(body)),
        StatusCode::UNAUTHORIZED => TranslationOutcome::upstream(
            FailureKind::Other,
            "authorization server not properly configured for gateway service credentials; \
             all requests will fail",
        ),
        s if s.is_server_error() => TranslationOutcome::upstream(
            FailureKind::Unavailable,
            format!("authorization server returned {s}: {}", describe(body)),
        ),
        s => TranslationOutcome::upstream(
            FailureKind::Other,
            format!("authorization server returned {s}: {}", describe(body)),
        ),
    }
}
