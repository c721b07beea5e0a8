//! Secret wrapper for passwords and tokens
//!
//! Values wrapped in [`Secret`] never reach a formatter: `Debug` and
//! `Display` print a fixed marker, and the memory is zeroized on drop.
//! [`Secret::scrub`] removes the raw value from arbitrary text, for
//! error messages produced by libraries that echo request URLs.

use std::fmt;
use zeroize::Zeroize;

/// Marker written in place of a secret value
pub const REDACTED: &str = "[REDACTED]";

/// Sensitive value - redacted in Debug/Display/logs
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T: Zeroize + AsRef<str>> Secret<T> {
    /// Replace every occurrence of the secret in `text` with [`REDACTED`].
    ///
    /// Empty secrets are left alone; replacing "" would interleave the
    /// marker between every character.
    pub fn scrub(&self, text: &str) -> String {
        let raw = self.0.as_ref();
        if raw.is_empty() {
            return text.to_owned();
        }
        text.replace(raw, REDACTED)
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Secret<String> {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}
