//! Credential Types
//!
//! Access/refresh credentials, identity record and session.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Short-lived bearer credential attached to every request.
#[derive(Clone)]
pub struct AccessToken {
    value: SecretString,
}

impl AccessToken {
    /// Create new access token.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: SecretString::new(value.into()),
        }
    }

    /// Get token value.
    pub fn secret(&self) -> &str {
        self.value.expose_secret()
    }

    /// Format as Authorization header value.
    pub fn authorization_header(&self, scheme: &str) -> String {
        format!("{} {}", scheme, self.value.expose_secret())
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AccessToken").field(&"[REDACTED]").finish()
    }
}

/// Longer-lived credential, only ever sent to the exchange endpoint.
#[derive(Clone)]
pub struct RefreshToken {
    value: SecretString,
}

impl RefreshToken {
    /// Create new refresh token.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: SecretString::new(value.into()),
        }
    }

    /// Get token value.
    pub fn secret(&self) -> &str {
        self.value.expose_secret()
    }
}

impl std::fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RefreshToken").field(&"[REDACTED]").finish()
    }
}

/// Access and refresh credential issued together at sign-in.
#[derive(Clone, Debug)]
pub struct CredentialPair {
    pub access: AccessToken,
    pub refresh: RefreshToken,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: AccessToken::new(access),
            refresh: RefreshToken::new(refresh),
        }
    }
}

/// Identity record returned by sign-in and `auth/me`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// User identifier.
    pub id: u64,
    /// Username.
    pub username: String,
    /// Email address (may be empty).
    #[serde(default)]
    pub email: String,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Identity {
    pub fn new(id: u64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: String::new(),
            extra: HashMap::new(),
        }
    }
}

/// Signed-in user and their credentials.
#[derive(Clone, Debug)]
pub struct Session {
    pub identity: Identity,
    pub credentials: CredentialPair,
    /// When the session was created or restored.
    pub established_at: DateTime<Utc>,
}

impl Session {
    pub fn new(identity: Identity, credentials: CredentialPair) -> Self {
        Self {
            identity,
            credentials,
            established_at: Utc::now(),
        }
    }
}

/// Body returned by the login and register endpoints.
#[derive(Clone, Debug, Deserialize)]
pub struct AuthResponse {
    pub user: Identity,
    pub access: String,
    pub refresh: String,
}

impl AuthResponse {
    pub fn into_parts(self) -> (CredentialPair, Identity) {
        (CredentialPair::new(self.access, self.refresh), self.user)
    }
}

/// Body returned by the exchange endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct ExchangeResponse {
    /// New access credential.
    pub access: String,
    /// Rotated refresh credential, when the server rotates.
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Credentials produced by a successful exchange.
#[derive(Clone, Debug)]
pub struct ExchangedCredentials {
    pub access: AccessToken,
    pub refresh: Option<RefreshToken>,
}

impl From<ExchangeResponse> for ExchangedCredentials {
    fn from(response: ExchangeResponse) -> Self {
        Self {
            access: AccessToken::new(response.access),
            refresh: response.refresh.map(RefreshToken::new),
        }
    }
}
