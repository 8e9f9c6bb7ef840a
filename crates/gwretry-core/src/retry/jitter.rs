//! Random source for backoff jitter.

use rand::Rng;

/// Source of uniformly distributed jitter factors.
pub trait JitterSource {
    /// Uniform float in `[low, high]`.
    fn uniform(&mut self, low: f64, high: f64) -> f64;
}

/// Jitter drawn from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if low >= high {
            return low;
        }
        rand::thread_rng().gen_range(low..=high)
    }
}

/// Always returns the same value, clamped into the requested range.
///
/// Lets tests pin the realized sleep: `FixedJitter(0.0)` sleeps exactly the nominal delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        self.0.clamp(low, high)
    }
}
