//! Service-specific error types

use std::error::Error as _;
use thiserror::Error;
use token_client::FailureKind;

/// Failure while routing a request to its downstream service.
///
/// Credential-translation failures never show up here: the filter answers
/// those itself before routing starts.
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

impl RoutingError {
    /// Classify a transport error by its root cause, keeping the cause chain
    /// in the message.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        if err.is_timeout() {
            RoutingError::Timeout(message)
        } else if err.is_connect() {
            RoutingError::Unavailable(message)
        } else {
            RoutingError::Other(message)
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            RoutingError::Timeout(_) => FailureKind::Timeout,
            RoutingError::Unavailable(_) => FailureKind::Unavailable,
            RoutingError::Other(_) => FailureKind::Other,
        }
    }
}
