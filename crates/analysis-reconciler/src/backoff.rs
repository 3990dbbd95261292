//! Exponential backoff with a ceiling and multiplicative jitter.
//!
//! `delay(n) = min(base * 2^n, max_delay) * U[1 - jitter, 1 + jitter]`
//!
//! The result is a duration to wait *before* the next attempt; callers turn
//! it into a "not before" requeue rather than sleeping on it.

use std::time::Duration;

use rand::Rng;

/// Default jitter fraction (±10%).
pub const DEFAULT_JITTER: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    base: Duration,
    max_delay: Duration,
    jitter: f64,
}

impl BackoffPolicy {
    /// Create a policy with the default ±10% jitter.
    ///
    /// A `max_delay` below `base` is raised to `base`.
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self {
            base,
            max_delay: max_delay.max(base),
            jitter: DEFAULT_JITTER,
        }
    }

    /// Override the jitter fraction, clamped to `[0.0, DEFAULT_JITTER]` so
    /// delays stay within `max_delay * 1.1`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, DEFAULT_JITTER)
        } else {
            0.0
        };
        self
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Upper bound of any delay this policy can produce.
    pub fn ceiling(&self) -> Duration {
        self.max_delay.mul_f64(1.0 + self.jitter)
    }

    /// Delay before retry `attempt` (0-based), jittered with the thread RNG.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        self.compute_delay_with(attempt, &mut rand::thread_rng())
    }

    /// Delay before retry `attempt`, jittered with the supplied RNG.
    pub fn compute_delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let capped = self.capped(attempt);
        if self.jitter <= 0.0 {
            return capped;
        }
        let factor = rng.gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        capped.mul_f64(factor)
    }

    /// Un-jittered delay: `base * 2^attempt`, saturating at `max_delay`.
    pub fn capped(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|multiplier| self.base.checked_mul(multiplier))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300))
    }
}
