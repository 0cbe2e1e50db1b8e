//! Session Lifecycle
//!
//! Session sink notification and the sign-in/sign-out operations.

pub mod service;
pub mod sink;

pub use service::{AuthService, RegisterParams};
pub use sink::{MockSessionSink, NoOpSessionSink, SessionSink};
