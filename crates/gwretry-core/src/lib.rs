//! Deadline-bounded exponential backoff for calls to an external gateway.

pub mod config;
pub mod logging;
pub mod retry;

pub use retry::{
    with_coordination_gateway_retry, BackoffPolicy, ErrorClassifier, GatewayBackoff, GatewayError,
    RetryError,
};
