//! Builders
//!
//! Fluent builders for configuration and the client.

pub mod client;
pub mod config;

pub use client::ApiClientBuilder;
pub use config::{client_config, ClientConfigBuilder};
