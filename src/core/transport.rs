//! HTTP Transport
//!
//! HTTP client interface and implementations for API requests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::error::{ConfigurationError, NetworkError, ProtocolError, SessionError};

/// Status the server uses to reject an access credential.
pub const UNAUTHORIZED_STATUS: u16 = 401;

/// Default maximum accepted response body (10MB).
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// HTTP request definition.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Request URL.
    pub url: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: Option<String>,
    /// Request timeout.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP response definition.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Status text.
    pub status_text: String,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: String,
}

impl HttpResponse {
    /// Create a response with a raw body.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: canonical_reason(status).to_string(),
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Create a JSON response.
    pub fn json<T: serde::Serialize>(status: u16, body: &T) -> Self {
        let mut response = Self::new(status, serde_json::to_string(body).unwrap_or_default());
        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        response
    }

    /// Add a header (name is lower-cased).
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// 2xx or 3xx.
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    /// Check if the server rejected the access credential.
    pub fn is_unauthorized(&self) -> bool {
        self.status == UNAUTHORIZED_STATUS
    }

    /// Deserialize the body as JSON.
    pub fn parse_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, SessionError> {
        serde_json::from_str(&self.body).map_err(|e| {
            SessionError::Protocol(ProtocolError::InvalidJson {
                message: e.to_string(),
            })
        })
    }
}

fn canonical_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// HTTP transport interface (for dependency injection).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send an HTTP request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SessionError>;
}

/// Default reqwest-based HTTP transport.
pub struct ReqwestHttpTransport {
    client: reqwest::Client,
    default_timeout: Duration,
    max_response_size: usize,
}

impl ReqwestHttpTransport {
    /// Create new transport with default settings.
    pub fn new() -> Result<Self, SessionError> {
        Self::with_options(Duration::from_secs(30), DEFAULT_MAX_RESPONSE_SIZE, None)
    }

    /// Create transport with custom options.
    pub fn with_options(
        timeout: Duration,
        max_response_size: usize,
        user_agent: Option<&str>,
    ) -> Result<Self, SessionError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(agent) = user_agent {
            builder = builder.user_agent(agent);
        }
        let client = builder.build().map_err(|e| {
            SessionError::Configuration(ConfigurationError::InvalidConfig {
                message: format!("failed to create HTTP client: {}", e),
            })
        })?;

        Ok(Self {
            client,
            default_timeout: timeout,
            max_response_size,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestHttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SessionError> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        let mut req_builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Put => self.client.put(&request.url),
            HttpMethod::Patch => self.client.patch(&request.url),
            HttpMethod::Delete => self.client.delete(&request.url),
        };

        for (key, value) in &request.headers {
            req_builder = req_builder.header(key, value);
        }

        if let Some(body) = request.body {
            req_builder = req_builder.body(body);
        }

        req_builder = req_builder.timeout(timeout);

        let response = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SessionError::Network(NetworkError::Timeout { timeout })
            } else {
                SessionError::Network(NetworkError::ConnectionFailed {
                    message: e.to_string(),
                })
            }
        })?;

        let status = response.status().as_u16();
        let status_text = response
            .status()
            .canonical_reason()
            .unwrap_or("")
            .to_string();

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.to_string().to_lowercase(), v.to_string());
            }
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_response_size {
                return Err(SessionError::Protocol(ProtocolError::ResponseTooLarge {
                    size: len as usize,
                }));
            }
        }

        let body = response.text().await.map_err(|e| {
            SessionError::Protocol(ProtocolError::InvalidResponse {
                message: e.to_string(),
            })
        })?;

        if body.len() > self.max_response_size {
            return Err(SessionError::Protocol(ProtocolError::ResponseTooLarge {
                size: body.len(),
            }));
        }

        Ok(HttpResponse {
            status,
            status_text,
            headers,
            body,
        })
    }
}

type ResponseHandler = Box<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

/// Mock HTTP transport for testing.
///
/// Responses come from the FIFO queue first, then from the handler, then
/// from the default response.
#[derive(Default)]
pub struct MockHttpTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    request_history: Mutex<Vec<HttpRequest>>,
    default_response: Mutex<Option<HttpResponse>>,
    handler: Mutex<Option<ResponseHandler>>,
}

impl MockHttpTransport {
    /// Create new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response to return.
    pub fn queue_response(&self, response: HttpResponse) -> &Self {
        self.responses.lock().push_back(response);
        self
    }

    /// Queue a JSON response.
    pub fn queue_json_response<T: serde::Serialize>(&self, status: u16, body: &T) -> &Self {
        self.queue_response(HttpResponse::json(status, body))
    }

    /// Answer every unqueued request with the given function.
    pub fn set_handler<F>(&self, handler: F) -> &Self
    where
        F: Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
    {
        *self.handler.lock() = Some(Box::new(handler));
        self
    }

    /// Set default response when queue is empty and no handler is set.
    pub fn set_default_response(&self, response: HttpResponse) -> &Self {
        *self.default_response.lock() = Some(response);
        self
    }

    /// Get request history.
    pub fn get_requests(&self) -> Vec<HttpRequest> {
        self.request_history.lock().clone()
    }

    /// Get last request.
    pub fn get_last_request(&self) -> Option<HttpRequest> {
        self.request_history.lock().last().cloned()
    }

    /// Number of requests sent so far.
    pub fn request_count(&self) -> usize {
        self.request_history.lock().len()
    }

    /// Clear request history.
    pub fn clear_history(&self) {
        self.request_history.lock().clear();
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SessionError> {
        let queued = self.responses.lock().pop_front();
        let response = queued
            .or_else(|| self.handler.lock().as_ref().map(|h| h(&request)))
            .or_else(|| self.default_response.lock().clone());

        self.request_history.lock().push(request);

        response.ok_or_else(|| {
            SessionError::Network(NetworkError::ConnectionFailed {
                message: "No mock response available".to_string(),
            })
        })
    }
}
