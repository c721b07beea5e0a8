//! Error types for credential extraction

/// Reasons an inbound Basic Authorization header cannot be decoded.
///
/// These describe a malformed request, not an authentication rejection:
/// the authorization server is never consulted for them.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MalformedCredentials {
    #[error("authorization header is not of the Basic scheme")]
    NotBasic,

    #[error("basic credentials are not valid base64")]
    InvalidBase64,

    #[error("basic credentials are not valid UTF-8")]
    InvalidUtf8,

    #[error("basic credentials lack a ':' separator")]
    MissingSeparator,
}
