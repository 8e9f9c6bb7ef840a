//! Retry and backoff for gateway calls.
//!
//! This module encapsulates error classification (transient vs permanent,
//! decided from the gateway's error text) and deadline-bounded exponential
//! backoff so that callers wrapping remote gateway calls share one policy.

mod classify;
mod error;
mod jitter;
mod policy;
mod run;

pub use classify::{
    ErrorClassifier, MarkerSet, DEFAULT_NON_TRANSIENT_MARKERS, DEFAULT_TRANSIENT_MARKERS,
};
pub use error::{
    gateway_timeout_message, GatewayError, GatewayFailure, GatewayTimeout, RetryError,
};
pub use jitter::{FixedJitter, JitterSource, ThreadRngJitter};
pub use policy::{duration_from_secs, BackoffPolicy, BackoffPolicyBuilder, PolicyError};
pub use run::{with_coordination_gateway_retry, GatewayBackoff};
