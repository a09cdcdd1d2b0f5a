//! Broker client credential list.
//!
//! The list is supplied as JSON, `[{"u": "<user>", "p": "<password>"}, ...]`.
//! An empty list disables authentication and every attempt is allowed.

use serde::Deserialize;
use thiserror::Error;

/// One permitted username/password pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credential {
    /// Username.
    #[serde(rename = "u", alias = "username")]
    pub username: String,
    /// Password.
    #[serde(rename = "p", alias = "password")]
    pub password: String,
}

/// Errors that can occur when parsing a credential list.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The list is not a JSON array of `{u, p}` objects.
    #[error("malformed credential list: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Accepted credentials for broker clients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    users: Vec<Credential>,
}

impl Credentials {
    /// Builds a credential list from already parsed entries.
    pub fn new(users: Vec<Credential>) -> Self {
        Self { users }
    }

    /// Parses the JSON credential list.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Malformed` if `json` is not an array of
    /// `{u, p}` objects.
    pub fn from_json(json: &str) -> Result<Self, CredentialError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// Consumes the list, returning its entries.
    pub fn into_users(self) -> Vec<Credential> {
        self.users
    }

    /// Returns `true` when at least one credential is configured.
    pub fn is_enabled(&self) -> bool {
        !self.users.is_empty()
    }

    /// Configured usernames, for the startup log line.
    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.users.iter().map(|c| c.username.as_str())
    }

    /// Checks a presented username and password.
    ///
    /// Always `true` when authentication is disabled. A missing password is
    /// compared as the empty string.
    pub fn verify(&self, username: &str, password: Option<&str>) -> bool {
        if !self.is_enabled() {
            return true;
        }
        let password = password.unwrap_or("");
        self.users
            .iter()
            .any(|c| c.username == username && c.password == password)
    }
}
