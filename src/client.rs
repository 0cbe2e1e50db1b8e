//! API Client
//!
//! Facade combining the credential store, request dispatcher, refresh
//! coordinator and authentication service.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::builders::ApiClientBuilder;
use crate::core::HttpResponse;
use crate::dispatch::{ApiRequest, RequestDispatcher};
use crate::error::SessionError;
use crate::refresh::RefreshCoordinator;
use crate::session::AuthService;
use crate::token::CredentialStore;
use crate::types::ClientConfig;

/// Authenticated API client.
///
/// Clones share the same session, dispatcher and refresh coordinator.
#[derive(Clone)]
pub struct ApiClient {
    config: Arc<ClientConfig>,
    store: Arc<dyn CredentialStore>,
    dispatcher: Arc<RequestDispatcher>,
    coordinator: RefreshCoordinator,
    auth: Arc<AuthService>,
}

impl ApiClient {
    /// Create a client with default components. Must be called inside a
    /// tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self, SessionError> {
        Self::builder(config).build()
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self, SessionError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Start building a client with custom components.
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder::new(config)
    }

    pub(crate) fn from_parts(
        config: Arc<ClientConfig>,
        store: Arc<dyn CredentialStore>,
        dispatcher: Arc<RequestDispatcher>,
        coordinator: RefreshCoordinator,
        auth: Arc<AuthService>,
    ) -> Self {
        Self {
            config,
            store,
            dispatcher,
            coordinator,
            auth,
        }
    }

    /// Send a request through the authenticated dispatcher.
    pub async fn send(&self, request: ApiRequest) -> Result<HttpResponse, SessionError> {
        self.dispatcher.send(request).await
    }

    /// GET `path` and decode the JSON answer.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        self.dispatcher.send_json(ApiRequest::get(path)).await
    }

    /// POST a JSON body to `path` and decode the JSON answer.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, SessionError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.dispatcher
            .send_json(ApiRequest::post(path).json(body)?)
            .await
    }

    /// PUT a JSON body to `path` and decode the JSON answer.
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, SessionError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.dispatcher
            .send_json(ApiRequest::put(path).json(body)?)
            .await
    }

    /// PATCH `path` with a JSON body and decode the JSON answer.
    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, SessionError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.dispatcher
            .send_json(ApiRequest::patch(path).json(body)?)
            .await
    }

    /// DELETE `path`. The answer body is discarded.
    pub async fn delete(&self, path: &str) -> Result<(), SessionError> {
        self.dispatcher.send(ApiRequest::delete(path)).await?;
        Ok(())
    }

    /// Sign-in, registration and sign-out.
    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .field("authenticated", &self.store.is_authenticated())
            .field("coordinator", &self.coordinator)
            .finish()
    }
}
