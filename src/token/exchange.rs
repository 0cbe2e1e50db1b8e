//! Exchange Endpoint
//!
//! Trades a refresh credential for a new access credential. The call goes
//! straight to the transport, never through the request dispatcher, so an
//! unauthorized answer here cannot trigger another refresh.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

use crate::core::{HttpMethod, HttpRequest, HttpTransport};
use crate::error::{ApiError, ProtocolError, SessionError};
use crate::types::{ClientConfig, ExchangeResponse, ExchangedCredentials, RefreshToken};

/// Exchange endpoint interface.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Trade the refresh credential for a new access credential.
    async fn exchange(&self, refresh: &RefreshToken) -> Result<ExchangedCredentials, SessionError>;
}

#[derive(Serialize)]
struct ExchangeRequestBody<'a> {
    refresh: &'a str,
}

/// HTTP exchange endpoint client.
pub struct HttpTokenExchanger {
    transport: Arc<dyn HttpTransport>,
    url: String,
    timeout: Duration,
    user_agent: String,
}

impl HttpTokenExchanger {
    /// Create new exchanger posting to `url`.
    pub fn new(transport: Arc<dyn HttpTransport>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport,
            url: url.into(),
            timeout,
            user_agent: crate::types::DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Create exchanger for the configured refresh endpoint.
    pub fn from_config(config: &ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            url: config.token_refresh_url(),
            timeout: config.timeout,
            user_agent: config.user_agent.clone(),
        }
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_request_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert("accept".to_string(), "application/json".to_string());
        headers.insert("user-agent".to_string(), self.user_agent.clone());
        headers
    }
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    #[instrument(name = "token_exchange", skip_all)]
    async fn exchange(&self, refresh: &RefreshToken) -> Result<ExchangedCredentials, SessionError> {
        let body = serde_json::to_string(&ExchangeRequestBody {
            refresh: refresh.secret(),
        })
        .map_err(|e| {
            SessionError::Protocol(ProtocolError::InvalidJson {
                message: e.to_string(),
            })
        })?;

        let request = HttpRequest {
            method: HttpMethod::Post,
            url: self.url.clone(),
            headers: self.build_request_headers(),
            body: Some(body),
            timeout: Some(self.timeout),
        };

        let response = self.transport.send(request).await?;
        debug!(url = %self.url, status = response.status, "exchange endpoint answered");

        if !(200..300).contains(&response.status) {
            return Err(ApiError::from(response).into());
        }

        let parsed: ExchangeResponse = response.parse_json()?;
        if parsed.access.is_empty() {
            return Err(SessionError::Protocol(ProtocolError::InvalidResponse {
                message: "exchange response carried an empty access credential".to_string(),
            }));
        }

        Ok(parsed.into())
    }
}

/// Holds scripted exchanges until opened.
#[derive(Clone)]
pub struct ExchangeGate {
    semaphore: Arc<Semaphore>,
}

impl ExchangeGate {
    /// Let every held and future exchange proceed.
    pub fn open(&self) {
        self.semaphore.close();
    }
}

/// Mock exchange endpoint for testing.
///
/// Results are consumed in FIFO order; once the queue is empty every call
/// succeeds with `refreshed-access-<n>`.
#[derive(Default)]
pub struct MockTokenExchanger {
    results: Mutex<VecDeque<Result<ExchangedCredentials, SessionError>>>,
    refresh_history: Mutex<Vec<String>>,
    calls: AtomicUsize,
    gate: Mutex<Option<ExchangeGate>>,
}

impl MockTokenExchanger {
    /// Create new mock exchanger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful exchange.
    pub fn queue_success(&self, access: &str, refresh: Option<&str>) -> &Self {
        self.results.lock().push_back(Ok(ExchangedCredentials {
            access: crate::types::AccessToken::new(access),
            refresh: refresh.map(RefreshToken::new),
        }));
        self
    }

    /// Queue a failed exchange.
    pub fn queue_error(&self, error: SessionError) -> &Self {
        self.results.lock().push_back(Err(error));
        self
    }

    /// Suspend exchanges until the returned gate is opened.
    pub fn hold(&self) -> ExchangeGate {
        let gate = ExchangeGate {
            semaphore: Arc::new(Semaphore::new(0)),
        };
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    /// Number of exchange calls started.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Refresh credentials presented, in call order.
    pub fn get_refresh_tokens(&self) -> Vec<String> {
        self.refresh_history.lock().clone()
    }
}

#[async_trait]
impl TokenExchanger for MockTokenExchanger {
    async fn exchange(&self, refresh: &RefreshToken) -> Result<ExchangedCredentials, SessionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.refresh_history.lock().push(refresh.secret().to_string());

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            // Closed semaphore means the gate was opened.
            if let Ok(permit) = gate.semaphore.acquire().await {
                permit.forget();
            }
        }

        let scripted = self.results.lock().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(ExchangedCredentials {
                access: crate::types::AccessToken::new(format!("refreshed-access-{}", call)),
                refresh: None,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HttpResponse, MockHttpTransport};

    fn exchanger(transport: Arc<MockHttpTransport>) -> HttpTokenExchanger {
        HttpTokenExchanger::new(
            transport,
            "https://api.example.com/auth/token/refresh/",
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_exchange_posts_refresh_without_authorization() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &serde_json::json!({"access": "a2"}));

        let creds = exchanger(transport.clone())
            .exchange(&RefreshToken::new("r1"))
            .await
            .unwrap();

        assert_eq!(creds.access.secret(), "a2");
        assert!(creds.refresh.is_none());

        let request = transport.get_last_request().unwrap();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "https://api.example.com/auth/token/refresh/");
        assert!(request.header("authorization").is_none());
        let body: serde_json::Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({"refresh": "r1"}));
    }

    #[tokio::test]
    async fn test_exchange_returns_rotated_refresh() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &serde_json::json!({"access": "a2", "refresh": "r2"}));

        let creds = exchanger(transport)
            .exchange(&RefreshToken::new("r1"))
            .await
            .unwrap();
        assert_eq!(creds.refresh.unwrap().secret(), "r2");
    }

    #[tokio::test]
    async fn test_exchange_rejected_is_api_error() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(
            401,
            &serde_json::json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
        );

        let err = exchanger(transport)
            .exchange(&RefreshToken::new("r1"))
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_exchange_malformed_body() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_response(HttpResponse::new(200, "<html>"));

        let err = exchanger(transport)
            .exchange(&RefreshToken::new("r1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Protocol(ProtocolError::InvalidJson { .. })));
    }

    #[tokio::test]
    async fn test_mock_exchanger_script_and_default() {
        let mock = MockTokenExchanger::new();
        mock.queue_success("scripted", Some("r2"));

        let first = mock.exchange(&RefreshToken::new("r1")).await.unwrap();
        let second = mock.exchange(&RefreshToken::new("r2")).await.unwrap();

        assert_eq!(first.access.secret(), "scripted");
        assert_eq!(second.access.secret(), "refreshed-access-2");
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.get_refresh_tokens(), vec!["r1", "r2"]);
    }

    #[tokio::test]
    async fn test_mock_exchanger_gate() {
        let mock = Arc::new(MockTokenExchanger::new());
        let gate = mock.hold();

        let task = {
            let mock = mock.clone();
            tokio::spawn(async move { mock.exchange(&RefreshToken::new("r1")).await })
        };

        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        gate.open();
        let creds = task.await.unwrap().unwrap();
        assert_eq!(creds.access.secret(), "refreshed-access-1");
    }
}
