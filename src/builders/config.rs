//! Configuration Builder
//!
//! Fluent builder for API client configuration.

use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use crate::error::{ConfigurationError, SessionError};
use crate::types::{
    AuthEndpoints, ClientConfig, RefreshRotation, DEFAULT_AUTH_SCHEME, DEFAULT_BASE_URL,
    DEFAULT_TIMEOUT, DEFAULT_USER_AGENT,
};

/// API client configuration builder.
#[derive(Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    endpoints: AuthEndpoints,
    timeout: Option<Duration>,
    refresh_timeout: Option<Duration>,
    refresh_rotation: RefreshRotation,
    auth_scheme: Option<String>,
    default_headers: HashMap<String, String>,
    user_agent: Option<String>,
}

impl ClientConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set sign-in endpoint path.
    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.endpoints.login = path.into();
        self
    }

    /// Set registration endpoint path.
    pub fn register_path(mut self, path: impl Into<String>) -> Self {
        self.endpoints.register = path.into();
        self
    }

    /// Set current-identity endpoint path.
    pub fn identity_path(mut self, path: impl Into<String>) -> Self {
        self.endpoints.identity = path.into();
        self
    }

    /// Set exchange endpoint path (or absolute URL).
    pub fn token_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.endpoints.token_refresh = path.into();
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bound the duration of a single refresh exchange.
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }

    /// Set refresh credential rotation mode.
    pub fn refresh_rotation(mut self, rotation: RefreshRotation) -> Self {
        self.refresh_rotation = rotation;
        self
    }

    /// Set authorization header scheme.
    pub fn auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.auth_scheme = Some(scheme.into());
        self
    }

    /// Add a header sent with every request.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Set User-Agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> Result<ClientConfig, SessionError> {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let parsed = Url::parse(&base_url).map_err(|_| ConfigurationError::InvalidEndpoint {
            url: base_url.clone(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigurationError::InvalidEndpoint { url: base_url }.into());
        }

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(ConfigurationError::InvalidConfig {
                message: "timeout must be greater than zero".to_string(),
            }
            .into());
        }
        if matches!(self.refresh_timeout, Some(t) if t.is_zero()) {
            return Err(ConfigurationError::InvalidConfig {
                message: "refresh timeout must be greater than zero".to_string(),
            }
            .into());
        }

        let auth_scheme = self
            .auth_scheme
            .unwrap_or_else(|| DEFAULT_AUTH_SCHEME.to_string());
        if auth_scheme.trim().is_empty() {
            return Err(ConfigurationError::MissingField {
                field: "auth_scheme".to_string(),
            }
            .into());
        }

        for (field, value) in [
            ("endpoints.login", &self.endpoints.login),
            ("endpoints.register", &self.endpoints.register),
            ("endpoints.identity", &self.endpoints.identity),
            ("endpoints.token_refresh", &self.endpoints.token_refresh),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigurationError::MissingField {
                    field: field.to_string(),
                }
                .into());
            }
        }

        Ok(ClientConfig {
            base_url,
            endpoints: self.endpoints,
            timeout,
            refresh_timeout: self.refresh_timeout,
            refresh_rotation: self.refresh_rotation,
            auth_scheme,
            default_headers: self.default_headers,
            user_agent: self
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        })
    }
}

/// Create a new client configuration builder.
pub fn client_config() -> ClientConfigBuilder {
    ClientConfigBuilder::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = client_config().build().unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.auth_scheme, "Bearer");
    }

    #[test]
    fn test_builder_success() {
        let config = client_config()
            .base_url("https://api.example.com")
            .token_refresh_path("/oauth/refresh")
            .refresh_timeout(Duration::from_secs(5))
            .refresh_rotation(RefreshRotation::Rotate)
            .default_header("x-client", "tests")
            .build()
            .unwrap();

        assert_eq!(config.token_refresh_url(), "https://api.example.com/oauth/refresh");
        assert_eq!(config.refresh_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.refresh_rotation, RefreshRotation::Rotate);
        assert_eq!(config.default_headers.get("x-client"), Some(&"tests".to_string()));
    }

    #[test]
    fn test_builder_rejects_invalid_base_url() {
        assert!(client_config().base_url("not a url").build().is_err());
        assert!(client_config().base_url("ftp://example.com").build().is_err());
    }

    #[test]
    fn test_builder_rejects_zero_timeouts() {
        assert!(client_config().timeout(Duration::ZERO).build().is_err());
        assert!(client_config()
            .refresh_timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_builder_rejects_empty_endpoint() {
        let result = client_config().token_refresh_path("  ").build();
        assert!(matches!(
            result,
            Err(SessionError::Configuration(ConfigurationError::MissingField { .. }))
        ));
    }
}
