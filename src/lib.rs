//! Session Auth Integration
//!
//! Authenticated request dispatch for a token-protected REST API, with
//! single-flight refresh of expired access credentials.
//!
//! # Features
//!
//! - Bearer credential attached to every outgoing request
//! - One refresh exchange per expiry, however many requests fail at once
//! - Waiting requests replayed (or rejected) in arrival order
//! - At most one replay per request; a second 401 is surfaced unchanged
//! - Session cleared and the application notified once when refresh fails
//! - Sign-in, registration, sign-out and identity lookup
//!
//! # Example
//!
//! ```rust,ignore
//! use session_auth_integration::{client_config, ApiClient, RefreshRotation};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = client_config()
//!         .base_url("https://api.example.com/api")
//!         .refresh_rotation(RefreshRotation::Rotate)
//!         .build()?;
//!
//!     let client = ApiClient::builder(config)
//!         .session_sink(|| eprintln!("session ended, please sign in again"))
//!         .build()?;
//!
//!     client.auth().login("ada", "correct horse battery staple").await?;
//!
//!     // Expired access credentials are renewed transparently.
//!     let tasks: serde_json::Value = client.get("/tasks/").await?;
//!     println!("{}", tasks);
//!
//!     client.auth().logout();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: configuration and credential data structures
//! - `error`: error hierarchy and classification helpers
//! - `core`: HTTP transport abstraction
//! - `token`: credential store and the refresh exchange endpoint
//! - `refresh`: single-flight refresh coordinator
//! - `dispatch`: authenticated request dispatcher
//! - `session`: session sink and sign-in/sign-out service
//! - `telemetry`: metrics
//! - `builders`: fluent builders for configuration and the client
//! - `client`: high-level client combining all components

pub mod builders;
pub mod client;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod refresh;
pub mod session;
pub mod telemetry;
pub mod token;
pub mod types;

// Re-export main client
pub use client::ApiClient;

// Re-export builders
pub use builders::{client_config, ApiClientBuilder, ClientConfigBuilder};

// Re-export errors
pub use error::{
    get_user_message, ApiError, AuthenticationError, ConfigurationError, NetworkError,
    ProtocolError, SessionError, SessionExpiry, SessionResult,
};

// Re-export types
pub use types::{
    // Config
    AuthEndpoints, ClientConfig, RefreshRotation,
    // Token
    AccessToken, AuthResponse, CredentialPair, ExchangeResponse, ExchangedCredentials, Identity,
    RefreshToken, Session,
};

// Re-export core components
pub use core::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, MockHttpTransport, ReqwestHttpTransport,
};

// Re-export token components
pub use token::{
    CredentialStore, ExchangeGate, HttpTokenExchanger, InMemoryCredentialStore,
    MockCredentialStore, MockTokenExchanger, StoreOperation, TokenExchanger,
};

// Re-export refresh, dispatch and session components
pub use dispatch::{ApiRequest, RequestDispatcher};
pub use refresh::{CoordinatorSnapshot, RefreshCoordinator, RefreshOptions, RefreshPhase};
pub use session::{AuthService, MockSessionSink, NoOpSessionSink, RegisterParams, SessionSink};

// Re-export telemetry
pub use telemetry::{InMemoryMetrics, NoOpMetrics, SessionMetrics};
