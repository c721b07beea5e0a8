//! JSON error body shared by every failure response the gateway produces
//!
//! `{"timestamp":<epoch-ms>,"status":<int>,"error":"<reason>","message":"..","path":".."}`

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Path reported when the request path is not known
pub const UNKNOWN_PATH: &str = "unknown-uri";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponseBody {
    pub timestamp: u64,
    pub status: u16,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorResponseBody {
    /// Body for `status`; a missing `path` becomes [`UNKNOWN_PATH`].
    pub fn build(status: StatusCode, message: &str, path: Option<&str>) -> Self {
        Self {
            timestamp: now_millis(),
            status: status.as_u16(),
            error: reason_phrase(status),
            message: Some(message.to_string()),
            path: Some(path.unwrap_or(UNKNOWN_PATH).to_string()),
        }
    }

    /// Body with only the reason phrase, e.g. for 404s.
    pub fn status_only(status: StatusCode, path: &str) -> Self {
        Self {
            timestamp: now_millis(),
            status: status.as_u16(),
            error: reason_phrase(status),
            message: None,
            path: Some(path.to_string()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ErrorResponseBody {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::to_string(&self).unwrap_or_else(|_| {
            serde_json::json!({ "status": self.status, "error": self.error }).to_string()
        });
        (
            status,
            [(
                axum::http::header::CONTENT_TYPE,
                "application/json;charset=UTF-8",
            )],
            body,
        )
            .into_response()
    }
}

fn reason_phrase(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("Unknown Status")
        .to_string()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
