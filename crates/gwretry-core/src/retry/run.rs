//! Retry loop: run an async gateway call until it succeeds, fails permanently,
//! or the deadline passes.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::classify::ErrorClassifier;
use super::error::{GatewayFailure, GatewayTimeout, RetryError};
use super::jitter::{JitterSource, ThreadRngJitter};
use super::policy::BackoffPolicy;

/// Exponential backoff with jitter for transient gateway errors.
///
/// The current delay is state of the instance: it doubles after each transient
/// failure (capped at the policy's `max_delay`) and drops back to `base_delay`
/// only after a success. `run` takes `&mut self`, so one instance drives one
/// sequence at a time; use separate instances for independent call flows.
#[derive(Debug, Clone)]
pub struct GatewayBackoff<J = ThreadRngJitter> {
    policy: BackoffPolicy,
    classifier: ErrorClassifier,
    jitter: J,
    current_delay: Duration,
}

impl GatewayBackoff<ThreadRngJitter> {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self::with_jitter(policy, ThreadRngJitter)
    }
}

impl Default for GatewayBackoff<ThreadRngJitter> {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

impl<J: JitterSource> GatewayBackoff<J> {
    pub fn with_jitter(policy: BackoffPolicy, jitter: J) -> Self {
        let current_delay = policy.base_delay();
        Self {
            policy,
            classifier: ErrorClassifier::default(),
            jitter,
            current_delay,
        }
    }

    /// Use a custom marker configuration.
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Nominal delay before the next retry.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn reset(&mut self) {
        self.current_delay = self.policy.base_delay();
    }

    /// Call `op` until it returns `Ok`, a non-transient error, or the policy's
    /// timeout elapses.
    ///
    /// Non-transient errors (including any error that is not a gateway error)
    /// come back as [`RetryError::Permanent`] on first occurrence. When the
    /// budget runs out after a transient failure the result is
    /// [`RetryError::Timeout`] wrapping that failure. Dropping the returned
    /// future cancels the run at whichever await it is parked on.
    pub async fn run<T, E, F, Fut>(&mut self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: GatewayFailure,
    {
        let started = Instant::now();
        let mut attempt = 1u32;

        loop {
            let (last_message, remaining) = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "gateway call succeeded after retries");
                    }
                    self.reset();
                    return Ok(value);
                }
                Err(err) => self.check_failure(err, started.elapsed(), attempt)?,
            };

            let sleep_for = self.jittered_sleep(remaining);
            tracing::debug!(
                attempt,
                delay = ?self.current_delay,
                sleep = ?sleep_for,
                remaining = ?remaining,
                error = %last_message,
                "transient gateway error, backing off"
            );
            tokio::time::sleep(sleep_for).await;

            self.current_delay = self.policy.next_delay(self.current_delay);
            attempt += 1;
        }
    }

    /// Classify a failed attempt. Returns the transient error text and the
    /// budget left, or the terminal error when the run must stop.
    fn check_failure<E: GatewayFailure>(
        &self,
        err: E,
        elapsed: Duration,
        attempt: u32,
    ) -> Result<(String, Duration), RetryError<E>> {
        let transient = err
            .as_gateway_error()
            .filter(|gw| self.classifier.is_transient_message(gw.message()))
            .map(|gw| gw.message().to_string());
        let Some(last_message) = transient else {
            tracing::debug!(attempt, "gateway call failed permanently");
            return Err(RetryError::Permanent(err));
        };

        let timeout = self.policy.timeout();
        let remaining = timeout.saturating_sub(elapsed);
        if remaining.is_zero() {
            let context = self.policy.timeout_context();
            tracing::warn!(
                attempt,
                context,
                error = %last_message,
                "gateway retry budget of {:?} exhausted",
                timeout
            );
            return Err(RetryError::Timeout(GatewayTimeout::new(
                timeout,
                context,
                &last_message,
                err,
            )));
        }
        Ok((last_message, remaining))
    }

    /// `min(current_delay, remaining)` scaled by `1 + U(-j, j)`, clamped to `[0, remaining]`.
    /// Draws outside `[-j, j]` from the jitter source are clamped back into it.
    fn jittered_sleep(&mut self, remaining: Duration) -> Duration {
        let nominal = self.current_delay.min(remaining);
        let j = self.policy.jitter();
        if j <= 0.0 {
            return nominal;
        }
        let u = self.jitter.uniform(-j, j);
        if u == 0.0 || !u.is_finite() {
            return nominal;
        }
        let u = u.clamp(-j, j);
        let secs = (nominal.as_secs_f64() * (1.0 + u)).max(0.0);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(remaining)
            .min(remaining)
    }
}

/// Run a gateway call under the coordination retry policy.
pub async fn with_coordination_gateway_retry<T, E, F, Fut>(op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: GatewayFailure,
{
    GatewayBackoff::new(BackoffPolicy::coordination()).run(op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::error::GatewayError;
    use crate::retry::jitter::FixedJitter;
    use std::cell::Cell;
    use std::io;
    use std::sync::{Arc, Mutex};

    fn policy(timeout_ms: u64, base_ms: u64, max_ms: u64, jitter: f64) -> BackoffPolicy {
        BackoffPolicy::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .base_delay(Duration::from_millis(base_ms))
            .max_delay(Duration::from_millis(max_ms))
            .jitter(jitter)
            .timeout_context("test")
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt_does_not_sleep() {
        let mut backoff =
            GatewayBackoff::with_jitter(policy(1_000, 10, 100, 0.0), FixedJitter(0.0));
        let start = Instant::now();
        let value = backoff
            .run(|| async { Ok::<_, GatewayError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_grows_across_failures_and_resets_on_success() {
        let mut backoff =
            GatewayBackoff::with_jitter(policy(10_000, 10, 40, 0.0), FixedJitter(0.0));
        let calls = Cell::new(0u32);
        let value = backoff
            .run(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n <= 4 {
                        Err(GatewayError::new("connection refused"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 5);
        assert_eq!(backoff.current_delay(), Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_kept_after_timeout() {
        let mut backoff =
            GatewayBackoff::with_jitter(policy(35, 10, 80, 0.0), FixedJitter(0.0));
        let err = backoff
            .run(|| async { Err::<(), _>(GatewayError::new("timed out")) })
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        // Slept 10 + 20, then 5 (clamped to remaining); the delay doubled three times.
        assert_eq!(backoff.current_delay(), Duration::from_millis(80));
        backoff.reset();
        assert_eq!(backoff.current_delay(), Duration::from_millis(10));
    }

    #[test]
    fn jittered_sleep_stays_within_bounds() {
        let mut backoff = GatewayBackoff::new(policy(60_000, 1_000, 8_000, 0.25));
        let remaining = Duration::from_secs(60);
        for _ in 0..500 {
            let s = backoff.jittered_sleep(remaining);
            assert!(s >= Duration::from_millis(750), "{s:?} below lower bound");
            assert!(s <= Duration::from_millis(1_250), "{s:?} above upper bound");
        }
    }

    #[test]
    fn jittered_sleep_never_exceeds_remaining() {
        let mut backoff =
            GatewayBackoff::with_jitter(policy(60_000, 1_000, 8_000, 0.5), FixedJitter(0.5));
        assert_eq!(
            backoff.jittered_sleep(Duration::from_millis(1_200)),
            Duration::from_millis(1_200)
        );
        assert_eq!(
            backoff.jittered_sleep(Duration::from_millis(400)),
            Duration::from_millis(400)
        );
        let s = backoff.jittered_sleep(Duration::from_secs(10));
        assert!((s.as_secs_f64() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn jittered_sleep_can_shorten() {
        let mut backoff =
            GatewayBackoff::with_jitter(policy(60_000, 1_000, 8_000, 0.2), FixedJitter(-0.2));
        let s = backoff.jittered_sleep(Duration::from_secs(10));
        assert!((s.as_secs_f64() - 0.8).abs() < 1e-6);
    }

    /// Ignores the requested range.
    struct Unbounded(f64);

    impl JitterSource for Unbounded {
        fn uniform(&mut self, _low: f64, _high: f64) -> f64 {
            self.0
        }
    }

    #[test]
    fn out_of_range_draws_are_clamped_to_jitter_fraction() {
        let mut high =
            GatewayBackoff::with_jitter(policy(60_000, 100, 1_000, 0.1), Unbounded(3.0));
        let s = high.jittered_sleep(Duration::from_secs(10));
        assert!((s.as_secs_f64() - 0.11).abs() < 1e-6, "{s:?}");

        let mut low =
            GatewayBackoff::with_jitter(policy(60_000, 100, 1_000, 0.1), Unbounded(-5.0));
        let s = low.jittered_sleep(Duration::from_secs(10));
        assert!((s.as_secs_f64() - 0.09).abs() < 1e-6, "{s:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_source_keeps_realized_sleep_in_bounds() {
        let mut backoff =
            GatewayBackoff::with_jitter(policy(60_000, 100, 1_000, 0.1), Unbounded(3.0));
        let calls = Cell::new(0u32);
        let start = Instant::now();
        backoff
            .run(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n == 1 {
                        Err(GatewayError::new("connection reset"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(90) && elapsed <= Duration::from_millis(111),
            "slept {elapsed:?}"
        );
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_event_records_durations() {
        let captured = Captured::default();
        let sink = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || sink.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut backoff =
            GatewayBackoff::with_jitter(policy(1_000, 10, 100, 0.0), FixedJitter(0.0));
        let calls = Cell::new(0u32);
        backoff
            .run(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n == 1 {
                        Err(GatewayError::new("connection reset"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();

        let out = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(out.contains("delay=10ms"), "{out}");
        assert!(out.contains("sleep=10ms"), "{out}");
        assert!(out.contains("remaining=1s"), "{out}");
    }

    #[tokio::test(start_paused = true)]
    async fn coordination_preset_passes_value_through() {
        let out = with_coordination_gateway_retry(|| async { Ok::<_, GatewayError>("ok") })
            .await
            .unwrap();
        assert_eq!(out, "ok");
    }
}
