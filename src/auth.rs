//! Bot token handling.
//!
//! Obtaining a token is outside the scope of this crate: it is issued from the bot's settings
//! page and handed to [`crate::rest::Client`] and [`crate::gateway::Gateway`] as-is.

use reqwest::header::HeaderValue;
/// Secret string types that redact values in debug output for security.
pub use secrecy::{ExposeSecret, SecretString};

use crate::Result;

/// A bot's bearer token.
///
/// The inner value is never printed by `Debug`, and the rendered header value is flagged as
/// sensitive so HTTP tooling skips it as well.
#[derive(Clone, Debug)]
pub struct Token(SecretString);

impl Token {
    #[must_use]
    pub fn new(token: String) -> Self {
        Self(SecretString::from(token))
    }

    /// Returns the raw secret.
    #[must_use]
    pub fn secret(&self) -> &SecretString {
        &self.0
    }

    /// `Authorization` header value for this token, i.e. `Bearer <token>`.
    pub fn bearer(&self) -> Result<HeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.0.expose_secret()))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl From<&str> for Token {
    fn from(token: &str) -> Self {
        Self::new(token.to_owned())
    }
}

impl From<String> for Token {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}
