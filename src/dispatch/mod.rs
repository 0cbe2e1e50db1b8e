//! Request Dispatch
//!
//! Authenticated sending of API requests with replay after refresh.

pub mod dispatcher;
pub mod request;

pub use dispatcher::RequestDispatcher;
pub use request::ApiRequest;
