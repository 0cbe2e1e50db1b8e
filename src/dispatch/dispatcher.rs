//! Request Dispatcher
//!
//! Attaches the current access credential to every request and hands
//! unauthorized answers to the refresh coordinator. A request is replayed at
//! most once; a second unauthorized answer is returned to the caller.

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::core::{HttpRequest, HttpResponse, HttpTransport};
use crate::dispatch::ApiRequest;
use crate::error::{ApiError, SessionError};
use crate::refresh::RefreshCoordinator;
use crate::telemetry::SessionMetrics;
use crate::token::CredentialStore;
use crate::types::{AccessToken, ClientConfig};

/// Authenticated request dispatcher.
pub struct RequestDispatcher {
    config: Arc<ClientConfig>,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn CredentialStore>,
    coordinator: RefreshCoordinator,
    metrics: Arc<dyn SessionMetrics>,
}

impl RequestDispatcher {
    /// Create new dispatcher.
    pub fn new(
        config: Arc<ClientConfig>,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
        coordinator: RefreshCoordinator,
        metrics: Arc<dyn SessionMetrics>,
    ) -> Self {
        Self {
            config,
            transport,
            store,
            coordinator,
            metrics,
        }
    }

    /// Send a request.
    ///
    /// 2xx/3xx answers are returned as `Ok`. Any other status is returned as
    /// [`SessionError::Api`] with the response untouched, except a first 401,
    /// which waits for a refreshed credential and replays the request.
    #[instrument(
        name = "dispatch",
        skip_all,
        fields(method = %request.method(), path = %request.path())
    )]
    pub async fn send(&self, mut request: ApiRequest) -> Result<HttpResponse, SessionError> {
        let mut access = self.store.access_token();

        loop {
            let response = self
                .transport
                .send(self.build_http_request(&request, access.as_ref()))
                .await?;

            debug!(status = response.status, replayed = request.is_replayed(), "response received");
            self.metrics
                .record_request(request.method().as_str(), response.status);
            if request.is_replayed() {
                self.metrics.record_replay(response.status);
            }

            if !response.is_unauthorized() || request.skips_refresh() {
                return into_outcome(response);
            }

            if request.is_replayed() {
                warn!("replayed request rejected again; not refreshing");
                return Err(ApiError::from(response).into());
            }

            request.mark_replayed();
            access = Some(self.coordinator.refreshed_access().await?);
        }
    }

    /// Send a request and deserialize the JSON answer.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, SessionError> {
        self.send(request).await?.parse_json()
    }

    /// Coordinator used for refreshes.
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    fn build_http_request(&self, request: &ApiRequest, access: Option<&AccessToken>) -> HttpRequest {
        let mut headers: HashMap<String, String> = self.config.default_headers.clone();
        headers.insert("accept".to_string(), "application/json".to_string());
        headers.insert("user-agent".to_string(), self.config.user_agent.clone());
        for (name, value) in request.headers() {
            headers.insert(name.clone(), value.clone());
        }

        headers.retain(|name, _| !name.eq_ignore_ascii_case("authorization"));
        if let Some(access) = access {
            headers.insert(
                "authorization".to_string(),
                access.authorization_header(&self.config.auth_scheme),
            );
        }

        HttpRequest {
            method: request.method(),
            url: self.config.url_for(request.path()),
            headers,
            body: request.body_str().map(str::to_string),
            timeout: Some(request.request_timeout().unwrap_or(self.config.timeout)),
        }
    }
}

fn into_outcome(response: HttpResponse) -> Result<HttpResponse, SessionError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ApiError::from(response).into())
    }
}
