//! API Request
//!
//! Caller-supplied request description, resent unmodified on replay except
//! for its credential header.

use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::core::HttpMethod;
use crate::error::{ProtocolError, SessionError};

/// Outgoing API request.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    method: HttpMethod,
    path: String,
    body: Option<String>,
    headers: HashMap<String, String>,
    timeout: Option<Duration>,
    replayed: bool,
    skip_refresh: bool,
}

impl ApiRequest {
    /// Create a request for `path`, relative to the configured base URL.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HashMap::new(),
            timeout: None,
            replayed: false,
            skip_refresh: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Set a JSON body and content type.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, SessionError> {
        let encoded = serde_json::to_string(body).map_err(|e| {
            SessionError::Protocol(ProtocolError::InvalidJson {
                message: e.to_string(),
            })
        })?;
        self.body = Some(encoded);
        self.headers
            .insert("content-type".to_string(), "application/json".to_string());
        Ok(self)
    }

    /// Set a raw body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Override the configured timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Surface an unauthorized answer directly instead of refreshing.
    ///
    /// Used for sign-in, where 401 means wrong credentials.
    pub fn without_refresh(mut self) -> Self {
        self.skip_refresh = true;
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body_str(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Already resent once after a refresh.
    pub fn is_replayed(&self) -> bool {
        self.replayed
    }

    pub fn skips_refresh(&self) -> bool {
        self.skip_refresh
    }

    pub(crate) fn mark_replayed(&mut self) {
        self.replayed = true;
    }
}
