use std::time::Duration;

use thiserror::Error;

/// Rejected backoff configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("base delay must be greater than zero")]
    ZeroBaseDelay,
    #[error("max delay {max:?} is below base delay {base:?}")]
    MaxBelowBase { base: Duration, max: Duration },
    #[error("jitter fraction {0} is outside [0, 1)")]
    JitterOutOfRange(f64),
    #[error("{field} must be a finite, non-negative number of seconds (got {value})")]
    InvalidSeconds { field: &'static str, value: f64 },
}

/// Immutable retry budget and backoff shape for one call class.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    timeout: Duration,
    base_delay: Duration,
    max_delay: Duration,
    jitter: f64,
    timeout_context: String,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10 * 60),
            base_delay: Duration::from_millis(750),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
            timeout_context: "gateway operation".to_string(),
        }
    }
}

impl BackoffPolicy {
    /// Policy for coordination calls: short budget, quick retries.
    pub fn coordination() -> Self {
        Self {
            timeout: Duration::from_secs(45),
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter: 0.15,
            timeout_context: "gateway coordination".to_string(),
        }
    }

    /// Start from the default policy.
    pub fn builder() -> BackoffPolicyBuilder {
        BackoffPolicyBuilder {
            policy: Self::default(),
        }
    }

    /// Start from an existing policy, e.g. a preset with one field changed.
    pub fn to_builder(&self) -> BackoffPolicyBuilder {
        BackoffPolicyBuilder {
            policy: self.clone(),
        }
    }

    /// Total wall-clock budget for one run.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Symmetric jitter fraction in `[0, 1)`.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Label embedded in timeout messages.
    pub fn timeout_context(&self) -> &str {
        &self.timeout_context
    }

    /// Delay that follows `current` after another transient failure: doubled, capped at `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }

    fn validate(&self) -> Result<(), PolicyError> {
        if self.base_delay.is_zero() {
            return Err(PolicyError::ZeroBaseDelay);
        }
        if self.max_delay < self.base_delay {
            return Err(PolicyError::MaxBelowBase {
                base: self.base_delay,
                max: self.max_delay,
            });
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(PolicyError::JitterOutOfRange(self.jitter));
        }
        Ok(())
    }
}

/// Builder that validates on `build`.
#[derive(Debug, Clone)]
pub struct BackoffPolicyBuilder {
    policy: BackoffPolicy,
}

impl BackoffPolicyBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.policy.timeout = timeout;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.policy.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    pub fn jitter(mut self, fraction: f64) -> Self {
        self.policy.jitter = fraction;
        self
    }

    pub fn timeout_context(mut self, context: impl Into<String>) -> Self {
        self.policy.timeout_context = context.into();
        self
    }

    pub fn build(self) -> Result<BackoffPolicy, PolicyError> {
        self.policy.validate()?;
        Ok(self.policy)
    }
}

/// Convert a seconds value from configuration into a `Duration`.
pub fn duration_from_secs(field: &'static str, value: f64) -> Result<Duration, PolicyError> {
    if !value.is_finite() || value < 0.0 {
        return Err(PolicyError::InvalidSeconds { field, value });
    }
    Duration::try_from_secs_f64(value).map_err(|_| PolicyError::InvalidSeconds { field, value })
}
