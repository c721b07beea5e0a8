//! End-user credentials carried in an HTTP Basic Authorization header

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use std::fmt;

use crate::error::MalformedCredentials;

const BASIC_SCHEME: &str = "basic";

/// Whether an Authorization header value uses the Basic scheme.
///
/// The scheme token is matched case-insensitively (RFC 7617 §2).
pub fn is_basic(header: &str) -> bool {
    split_scheme(header).is_some_and(|(scheme, _)| scheme.eq_ignore_ascii_case(BASIC_SCHEME))
}

fn split_scheme(header: &str) -> Option<(&str, &str)> {
    let header = header.trim_start();
    match header.split_once(' ') {
        Some((scheme, rest)) => Some((scheme, rest.trim())),
        None if !header.is_empty() => Some((header, "")),
        None => None,
    }
}

/// Username/password pair decoded from a single inbound request.
///
/// The password lives in a [`Secret`], so formatting a `Credentials`
/// (in logs or error messages) never prints it.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Secret<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Secret::new(password.into()),
        }
    }

    /// Decode `Basic base64(username:password)`.
    ///
    /// Splits on the first colon only, so passwords containing ':' survive
    /// intact. An empty password (`"alice:"`) is accepted; a payload
    /// without any colon is not.
    pub fn from_basic_header(header: &str) -> Result<Self, MalformedCredentials> {
        let (scheme, payload) = split_scheme(header).ok_or(MalformedCredentials::NotBasic)?;
        if !scheme.eq_ignore_ascii_case(BASIC_SCHEME) {
            return Err(MalformedCredentials::NotBasic);
        }

        let decoded = STANDARD
            .decode(payload)
            .map_err(|_| MalformedCredentials::InvalidBase64)?;
        let decoded = String::from_utf8(decoded).map_err(|_| MalformedCredentials::InvalidUtf8)?;

        let (username, password) = decoded
            .split_once(':')
            .ok_or(MalformedCredentials::MissingSeparator)?;
        Ok(Self::new(username, password))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(raw: &str) -> String {
        format!("Basic {}", STANDARD.encode(raw))
    }

    #[test]
    fn decodes_username_and_password() {
        let creds = Credentials::from_basic_header(&basic("alice:secret")).unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password.expose(), "secret");
    }

    #[test]
    fn password_with_colons_stays_intact() {
        for password in ["a:b", ":leading", "trailing:", "::", "x:y:z:w"] {
            let creds =
                Credentials::from_basic_header(&basic(&format!("bob:{password}"))).unwrap();
            assert_eq!(creds.username, "bob");
            assert_eq!(creds.password.expose(), password);
        }
    }

    #[test]
    fn empty_password_is_accepted() {
        let creds = Credentials::from_basic_header(&basic("carol:")).unwrap();
        assert_eq!(creds.username, "carol");
        assert_eq!(creds.password.expose(), "");
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let header = format!("bAsIc {}", STANDARD.encode("dave:pw"));
        assert!(is_basic(&header));
        assert!(Credentials::from_basic_header(&header).is_ok());
    }

    #[test]
    fn missing_separator_is_malformed() {
        let err = Credentials::from_basic_header(&basic("no-colon-here")).unwrap_err();
        assert_eq!(err, MalformedCredentials::MissingSeparator);
    }

    #[test]
    fn invalid_base64_is_malformed() {
        let err = Credentials::from_basic_header("Basic !!!not-base64!!!").unwrap_err();
        assert_eq!(err, MalformedCredentials::InvalidBase64);
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let header = format!("Basic {}", STANDARD.encode([0xff, 0xfe, b':', b'x']));
        let err = Credentials::from_basic_header(&header).unwrap_err();
        assert_eq!(err, MalformedCredentials::InvalidUtf8);
    }

    #[test]
    fn other_schemes_are_not_basic() {
        assert!(!is_basic("Digest username=\"alice\""));
        assert!(!is_basic("Bearer xyz"));
        assert!(!is_basic("Basically nothing"));
        assert!(!is_basic(""));
        assert_eq!(
            Credentials::from_basic_header("Bearer xyz").unwrap_err(),
            MalformedCredentials::NotBasic
        );
    }

    #[test]
    fn debug_never_shows_password() {
        let creds = Credentials::new("erin", "topsecret");
        let debug = format!("{creds:?}");
        assert!(debug.contains("erin"));
        assert!(!debug.contains("topsecret"), "got: {debug}");
    }
}
