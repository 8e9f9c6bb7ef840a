//! Gateway error kind and the errors produced by the backoff coordinator.

use std::fmt;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure reported by a remote gateway call.
///
/// The message is the only channel the classifier sees; keep it as the remote
/// side reported it.
#[derive(Debug)]
pub struct GatewayError {
    message: String,
    source: Option<BoxError>,
}

impl GatewayError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Gateway error that keeps the lower-level failure (socket, protocol) as its cause.
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Errors the coordinator can inspect for a gateway failure.
///
/// Anything that returns `None` here is a different error kind: it is never
/// classified and is handed back to the caller on first occurrence.
pub trait GatewayFailure {
    fn as_gateway_error(&self) -> Option<&GatewayError>;
}

impl GatewayFailure for GatewayError {
    fn as_gateway_error(&self) -> Option<&GatewayError> {
        Some(self)
    }
}

impl GatewayFailure for anyhow::Error {
    fn as_gateway_error(&self) -> Option<&GatewayError> {
        self.downcast_ref::<GatewayError>()
    }
}

/// Format the budget as whole seconds, or whole minutes from 120 s upwards.
fn format_budget(budget: Duration) -> String {
    let secs = budget.as_secs();
    if secs >= 120 {
        format!("{} minutes", secs / 60)
    } else {
        format!("{} seconds", secs)
    }
}

/// Message used when the deadline elapses after a transient failure.
pub fn gateway_timeout_message(
    budget: Duration,
    context: &str,
    last_error: &dyn fmt::Display,
) -> String {
    format!(
        "Gateway unreachable after {} ({} timeout). Last error: {}",
        format_budget(budget),
        context,
        last_error
    )
}

/// The deadline elapsed while the operation kept failing transiently.
#[derive(Debug)]
pub struct GatewayTimeout<E> {
    message: String,
    budget: Duration,
    context: String,
    last_error: E,
}

impl<E> GatewayTimeout<E> {
    pub(crate) fn new(
        budget: Duration,
        context: &str,
        last_message: &str,
        last_error: E,
    ) -> Self {
        Self {
            message: gateway_timeout_message(budget, context, &last_message),
            budget,
            context: context.to_string(),
            last_error,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The configured budget that ran out.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn last_error(&self) -> &E {
        &self.last_error
    }

    pub fn into_last_error(self) -> E {
        self.last_error
    }
}

impl<E> fmt::Display for GatewayTimeout<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl<E> std::error::Error for GatewayTimeout<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last_error)
    }
}

/// Terminal failure of a coordinated run.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Non-transient failure, exactly as the operation returned it.
    Permanent(E),
    /// Budget exhausted; wraps the last transient failure.
    Timeout(GatewayTimeout<E>),
}

impl<E> RetryError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RetryError::Timeout(_))
    }

    /// The underlying operation error, whichever way the run ended.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Permanent(e) => e,
            RetryError::Timeout(t) => t.into_last_error(),
        }
    }
}

impl RetryError<anyhow::Error> {
    /// Flatten into an `anyhow::Error`, keeping the last transient failure as the cause of a timeout.
    pub fn into_anyhow(self) -> anyhow::Error {
        match self {
            RetryError::Permanent(e) => e,
            RetryError::Timeout(t) => {
                let message = t.message.clone();
                t.into_last_error().context(message)
            }
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Permanent(e) => write!(f, "{}", e),
            RetryError::Timeout(t) => write!(f, "{}", t),
        }
    }
}

impl<E> std::error::Error for RetryError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetryError::Permanent(e) => e.source(),
            RetryError::Timeout(t) => Some(t.last_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn budget_below_two_minutes_is_in_seconds() {
        let msg =
            gateway_timeout_message(Duration::from_secs(45), "gateway coordination", &"boom");
        assert_eq!(
            msg,
            "Gateway unreachable after 45 seconds (gateway coordination timeout). Last error: boom"
        );
    }

    #[test]
    fn budget_from_two_minutes_is_in_whole_minutes() {
        let msg = gateway_timeout_message(Duration::from_secs(125), "ctx", &"connection reset");
        assert_eq!(
            msg,
            "Gateway unreachable after 2 minutes (ctx timeout). Last error: connection reset"
        );
        let exact = gateway_timeout_message(Duration::from_secs(120), "ctx", &"x");
        assert!(exact.contains("after 2 minutes"));
    }

    #[test]
    fn fractional_budget_is_truncated() {
        let msg = gateway_timeout_message(Duration::from_millis(119_900), "ctx", &"x");
        assert!(msg.contains("after 119 seconds"));
    }

    #[test]
    fn timeout_keeps_last_error_as_source() {
        let last = GatewayError::new("connection reset");
        let timeout = GatewayTimeout::new(Duration::from_secs(1), "ctx", "connection reset", last);
        let err: RetryError<GatewayError> = RetryError::Timeout(timeout);
        assert!(err.is_timeout());
        let source = err.source().expect("timeout has a cause");
        assert_eq!(source.to_string(), "connection reset");
    }

    #[test]
    fn permanent_displays_original_message() {
        let err = RetryError::Permanent(GatewayError::new("401 unauthorized"));
        assert_eq!(err.to_string(), "401 unauthorized");
        assert_eq!(err.into_inner().message(), "401 unauthorized");
    }

    #[test]
    fn anyhow_downcast_finds_gateway_error() {
        let err = anyhow::Error::new(GatewayError::new("timed out"));
        assert_eq!(err.as_gateway_error().map(|g| g.message()), Some("timed out"));
        let other = anyhow::anyhow!("503 websocket");
        assert!(other.as_gateway_error().is_none());
    }

    #[test]
    fn into_anyhow_wraps_timeout_with_cause() {
        let last = anyhow::Error::new(GatewayError::new("connection reset"));
        let err = RetryError::Timeout(GatewayTimeout::new(
            Duration::from_secs(5),
            "ctx",
            "connection reset",
            last,
        ));
        let flat = err.into_anyhow();
        assert_eq!(
            flat.to_string(),
            "Gateway unreachable after 5 seconds (ctx timeout). Last error: connection reset"
        );
        assert!(flat.downcast_ref::<GatewayError>().is_some());
    }
}
