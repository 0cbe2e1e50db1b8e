//! Session Error Types
//!
//! Error hierarchy for authenticated request dispatch and credential refresh.

use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::core::HttpResponse;

/// Root error type for the session integration.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthenticationError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "SESSION_CONFIG",
            Self::Authentication(_) => "SESSION_AUTH",
            Self::Api(_) => "SESSION_API",
            Self::Network(_) => "SESSION_NETWORK",
            Self::Protocol(_) => "SESSION_PROTOCOL",
        }
    }

    /// HTTP status of the failed response, if the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(e) => Some(e.status),
            Self::Authentication(AuthenticationError::LoginRejected { status, .. }) => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Check if the server answered with an unauthorized status.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_unauthorized())
    }

    /// Check if the session ended because the credentials could not be renewed.
    pub fn is_session_expired(&self) -> bool {
        matches!(
            self,
            Self::Authentication(AuthenticationError::SessionExpired(_))
        )
    }

    /// Check if error requires the user to sign in again.
    pub fn needs_reauth(&self) -> bool {
        match self {
            Self::Authentication(AuthenticationError::SessionExpired(_)) => true,
            Self::Authentication(AuthenticationError::LoginRejected { .. }) => true,
            Self::Api(e) => e.is_unauthorized(),
            _ => false,
        }
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid endpoint URL: {url}")]
    InvalidEndpoint { url: String },

    #[error("Environment error: {message}")]
    Environment { message: String },
}

/// Authentication error.
#[derive(Error, Debug)]
pub enum AuthenticationError {
    #[error("Session expired: {0}")]
    SessionExpired(SessionExpiry),

    #[error("Sign-in rejected with status {status}")]
    LoginRejected {
        status: u16,
        detail: Option<String>,
    },

    #[error("Refresh coordinator is no longer running")]
    CoordinatorUnavailable,
}

/// Why a session could not be renewed.
///
/// Cloned once per waiter when a refresh episode fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionExpiry {
    #[error("no refresh credential available")]
    NoRefreshCredential,

    #[error("refresh credential rejected with status {status}")]
    ExchangeRejected { status: u16 },

    #[error("refresh exchange failed: {message}")]
    ExchangeFailed { message: String },

    #[error("refresh exchange timed out after {timeout:?}")]
    ExchangeTimedOut { timeout: Duration },
}

impl SessionExpiry {
    /// Classify a failed exchange call.
    pub fn from_exchange_error(error: &SessionError) -> Self {
        match error {
            SessionError::Api(e) => Self::ExchangeRejected { status: e.status },
            SessionError::Network(NetworkError::Timeout { timeout }) => {
                Self::ExchangeTimedOut { timeout: *timeout }
            }
            other => Self::ExchangeFailed {
                message: other.to_string(),
            },
        }
    }
}

impl From<SessionExpiry> for SessionError {
    fn from(expiry: SessionExpiry) -> Self {
        SessionError::Authentication(AuthenticationError::SessionExpired(expiry))
    }
}

/// Non-success HTTP response, passed through untouched.
#[derive(Error, Debug, Clone)]
#[error("HTTP {status} {status_text}")]
pub struct ApiError {
    /// HTTP status code.
    pub status: u16,
    /// Status text.
    pub status_text: String,
    /// Response headers (lower-cased names).
    pub headers: HashMap<String, String>,
    /// Raw response body.
    pub body: String,
}

impl ApiError {
    /// Check if this is an unauthorized response.
    pub fn is_unauthorized(&self) -> bool {
        self.status == crate::core::UNAUTHORIZED_STATUS
    }

    /// `detail` field of a JSON error body, if any.
    pub fn detail(&self) -> Option<String> {
        serde_json::from_str::<ErrorBody>(&self.body)
            .ok()
            .and_then(|b| b.detail)
    }
}

impl From<HttpResponse> for ApiError {
    fn from(response: HttpResponse) -> Self {
        Self {
            status: response.status,
            status_text: response.status_text,
            headers: response.headers,
            body: response.body,
        }
    }
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
}

/// Network/transport error.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Protocol/response parsing error.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("Response too large: {size} bytes")]
    ResponseTooLarge { size: usize },
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Get user-friendly error message.
pub fn get_user_message(error: &SessionError) -> String {
    match error {
        SessionError::Authentication(AuthenticationError::SessionExpired(_)) => {
            "Your session has expired. Please sign in again.".to_string()
        }
        SessionError::Authentication(AuthenticationError::LoginRejected { .. }) => {
            "Sign-in failed. Check your username and password.".to_string()
        }
        SessionError::Network(NetworkError::Timeout { .. }) => {
            "The request timed out. Please check your connection and try again.".to_string()
        }
        SessionError::Network(_) => {
            "The server could not be reached. Please try again later.".to_string()
        }
        SessionError::Api(e) if e.status >= 500 => {
            "The service is temporarily unavailable. Please try again later.".to_string()
        }
        _ => "The request could not be completed. Please try again.".to_string(),
    }
}
