//! Core Components
//!
//! Transport infrastructure shared by the dispatcher and the exchange endpoint.

pub mod transport;

pub use transport::*;
