//! Token Management
//!
//! Credential storage and the refresh credential exchange.
//!
//! - **Credential Store**: synchronous holder of the current session
//! - **Exchange Endpoint**: trades a refresh credential for a new access credential

pub mod exchange;
pub mod store;

// Credential Store
pub use store::{CredentialStore, InMemoryCredentialStore, MockCredentialStore, StoreOperation};

// Exchange Endpoint
pub use exchange::{ExchangeGate, HttpTokenExchanger, MockTokenExchanger, TokenExchanger};
