//! Credential Refresh
//!
//! Single-flight coordination of access credential renewal.

pub mod coordinator;

pub use coordinator::{CoordinatorSnapshot, RefreshCoordinator, RefreshOptions, RefreshPhase};
