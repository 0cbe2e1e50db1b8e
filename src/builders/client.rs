//! Client Builder
//!
//! Fluent construction of an [`ApiClient`] with injectable components.

use std::sync::Arc;

use crate::client::ApiClient;
use crate::core::{HttpTransport, ReqwestHttpTransport, DEFAULT_MAX_RESPONSE_SIZE};
use crate::dispatch::RequestDispatcher;
use crate::error::SessionError;
use crate::refresh::{RefreshCoordinator, RefreshOptions};
use crate::session::{AuthService, NoOpSessionSink, SessionSink};
use crate::telemetry::{NoOpMetrics, SessionMetrics};
use crate::token::{CredentialStore, HttpTokenExchanger, InMemoryCredentialStore, TokenExchanger};
use crate::types::ClientConfig;

/// Builder for [`ApiClient`].
///
/// Unset components fall back to the reqwest transport, an in-memory
/// credential store, the HTTP exchange endpoint, a no-op session sink and
/// no-op metrics.
///
/// # Example
///
/// ```no_run
/// use session_auth_integration::{client_config, ApiClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = client_config().base_url("https://api.example.com/api").build()?;
/// let client = ApiClient::builder(config)
///     .session_sink(|| println!("signed out, please log in again"))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ApiClientBuilder {
    config: ClientConfig,

    // Injectable dependencies for testing
    transport: Option<Arc<dyn HttpTransport>>,
    store: Option<Arc<dyn CredentialStore>>,
    exchanger: Option<Arc<dyn TokenExchanger>>,
    sink: Option<Arc<dyn SessionSink>>,
    metrics: Option<Arc<dyn SessionMetrics>>,
}

impl ApiClientBuilder {
    /// Create a builder for the given configuration.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            store: None,
            exchanger: None,
            sink: None,
            metrics: None,
        }
    }

    /// Use a custom HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom credential store.
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom exchange endpoint.
    pub fn token_exchanger(mut self, exchanger: Arc<dyn TokenExchanger>) -> Self {
        self.exchanger = Some(exchanger);
        self
    }

    /// Receive "session ended" notifications.
    pub fn session_sink(mut self, sink: impl SessionSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Share an existing session sink.
    pub fn shared_session_sink(mut self, sink: Arc<dyn SessionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Record metrics.
    pub fn metrics(mut self, metrics: Arc<dyn SessionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the client. Must be called inside a tokio runtime.
    pub fn build(self) -> Result<ApiClient, SessionError> {
        let config = Arc::new(self.config);

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestHttpTransport::with_options(
                config.timeout,
                DEFAULT_MAX_RESPONSE_SIZE,
                Some(config.user_agent.as_str()),
            )?),
        };
        let store: Arc<dyn CredentialStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryCredentialStore::new()),
        };
        let exchanger: Arc<dyn TokenExchanger> = match self.exchanger {
            Some(exchanger) => exchanger,
            None => Arc::new(HttpTokenExchanger::from_config(&config, transport.clone())),
        };
        let sink: Arc<dyn SessionSink> = match self.sink {
            Some(sink) => sink,
            None => Arc::new(NoOpSessionSink),
        };
        let metrics: Arc<dyn SessionMetrics> = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(NoOpMetrics),
        };

        let coordinator = RefreshCoordinator::spawn(
            store.clone(),
            exchanger,
            sink,
            RefreshOptions::from(config.as_ref()),
            metrics.clone(),
        );
        let dispatcher = Arc::new(RequestDispatcher::new(
            config.clone(),
            transport,
            store.clone(),
            coordinator.clone(),
            metrics,
        ));
        let auth = Arc::new(AuthService::new(
            dispatcher.clone(),
            store.clone(),
            config.endpoints.clone(),
        ));

        Ok(ApiClient::from_parts(config, store, dispatcher, coordinator, auth))
    }
}
