//! Authorization-server client for the credential gateway
//!
//! Turns an end user's HTTP Basic credentials into a bearer token by
//! running an OAuth2 password-grant exchange against the authorization
//! server. The gateway itself authenticates to the authorization server
//! with a separate, statically configured service credential pair.
//!
//! Exchange flow:
//! 1. `credentials::Credentials::from_basic_header()` decodes the inbound header
//! 2. `AuthServerClient::exchange()` posts the password grant
//! 3. Non-2xx answers go through `interpret::interpret()`
//! 4. The caller receives exactly one `TranslationOutcome`

pub mod client;
pub mod credentials;
pub mod error;
pub mod interpret;
pub mod token;

pub use client::{AuthServerClient, ClientConfig, TokenExchange};
pub use credentials::{Credentials, is_basic};
pub use error::MalformedCredentials;
pub use interpret::{FALLBACK_DESCRIPTION, describe};
pub use token::{AccessToken, FailureKind, TranslationOutcome, UpstreamFailure};
