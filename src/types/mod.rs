//! Session Types
//!
//! Configuration and credential data structures.

pub mod config;
pub mod token;

pub use config::*;
pub use token::*;
