//! Configuration Types
//!
//! API client configuration types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigurationError, SessionError};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default authorization scheme.
pub const DEFAULT_AUTH_SCHEME: &str = "Bearer";

/// Default User-Agent header.
pub const DEFAULT_USER_AGENT: &str = "session-auth-integration/0.1.0";

/// Environment variable names read by [`ClientConfig::from_env`].
pub const ENV_BASE_URL: &str = "API_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "API_TIMEOUT_SECS";
pub const ENV_REFRESH_TIMEOUT_SECS: &str = "API_REFRESH_TIMEOUT_SECS";
pub const ENV_REFRESH_ROTATION: &str = "API_REFRESH_ROTATION";

/// How the exchange endpoint treats the refresh credential.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshRotation {
    /// The refresh credential stays the same; any returned value is ignored.
    #[default]
    Reuse,
    /// The exchange may return a new refresh credential, which replaces the old one.
    Rotate,
}

impl FromStr for RefreshRotation {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reuse" | "same" => Ok(Self::Reuse),
            "rotate" | "rotating" => Ok(Self::Rotate),
            other => Err(ConfigurationError::InvalidConfig {
                message: format!("unknown refresh rotation mode: {}", other),
            }),
        }
    }
}

/// Paths of the authentication endpoints, relative to the base URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEndpoints {
    /// Sign-in endpoint.
    pub login: String,
    /// Registration endpoint.
    pub register: String,
    /// Current identity endpoint.
    pub identity: String,
    /// Refresh credential exchange endpoint.
    pub token_refresh: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login/".to_string(),
            register: "/auth/register/".to_string(),
            identity: "/auth/me/".to_string(),
            token_refresh: "/auth/token/refresh/".to_string(),
        }
    }
}

/// API client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL every request path is appended to.
    pub base_url: String,
    /// Authentication endpoints.
    pub endpoints: AuthEndpoints,
    /// HTTP timeout.
    pub timeout: Duration,
    /// Upper bound on one refresh exchange. `None` waits indefinitely.
    pub refresh_timeout: Option<Duration>,
    /// Refresh credential rotation mode.
    pub refresh_rotation: RefreshRotation,
    /// Authorization header scheme.
    pub auth_scheme: String,
    /// Headers added to every request.
    pub default_headers: HashMap<String, String>,
    /// User-Agent header.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoints: AuthEndpoints::default(),
            timeout: DEFAULT_TIMEOUT,
            refresh_timeout: None,
            refresh_rotation: RefreshRotation::default(),
            auth_scheme: DEFAULT_AUTH_SCHEME.to_string(),
            default_headers: HashMap::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration from environment variables.
    ///
    /// Reads `API_BASE_URL`, `API_TIMEOUT_SECS`, `API_REFRESH_TIMEOUT_SECS`
    /// and `API_REFRESH_ROTATION`; unset variables keep their defaults.
    pub fn from_env() -> Result<Self, SessionError> {
        let mut builder = crate::builders::client_config();

        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            builder = builder.base_url(base_url);
        }
        if let Some(secs) = env_secs(ENV_TIMEOUT_SECS)? {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = env_secs(ENV_REFRESH_TIMEOUT_SECS)? {
            builder = builder.refresh_timeout(Duration::from_secs(secs));
        }
        if let Ok(mode) = std::env::var(ENV_REFRESH_ROTATION) {
            builder = builder.refresh_rotation(mode.parse()?);
        }

        builder.build()
    }

    /// Resolve a request path against the base URL.
    ///
    /// Absolute `http(s)://` paths are returned unchanged.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// URL of the refresh credential exchange endpoint.
    pub fn token_refresh_url(&self) -> String {
        self.url_for(&self.endpoints.token_refresh)
    }
}

fn env_secs(name: &str) -> Result<Option<u64>, ConfigurationError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigurationError::Environment {
                message: format!("{} must be a whole number of seconds, got {:?}", name, raw),
            }),
        Err(_) => Ok(None),
    }
}
