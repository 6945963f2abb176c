//! Gateway login credentials
//!
//! The password is held in a [`SecretString`] so it never shows up in
//! `Debug` output or log lines, and its heap buffer is zeroized on drop.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Environment variable carrying the gateway login identity
pub const USER_ENV: &str = "IBKR_USER";

/// Environment variable carrying the gateway login secret
pub const PASSWORD_ENV: &str = "IBKR_PASSWORD";

/// Opaque username/password pair for the headless gateway
pub struct Credential {
    username: String,
    password: SecretString,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Exposes the password for the duration of `action` only.
    pub fn with_password<F, R>(&self, action: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        action(self.password.expose_secret())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
