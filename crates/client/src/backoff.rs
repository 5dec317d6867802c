//! Reconnect delays: exponential with a cap, jittered per attempt.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
    /// Fractional spread applied to each delay, e.g. `0.2` for ±20%.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(10),
            multiplier: 2,
            jitter: 0.2,
        }
    }
}

/// Attempt counter over a [`BackoffPolicy`]. Reset it on every successful open.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Capped delay for the current attempt, before jitter.
    pub fn base_delay(&self) -> Duration {
        let factor = self.policy.multiplier.saturating_pow(self.attempt);
        self.policy
            .initial
            .saturating_mul(factor)
            .min(self.policy.max)
    }

    /// Delay before the next reconnect; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.base_delay();
        self.attempt = self.attempt.saturating_add(1);
        apply_jitter(base, self.policy.jitter, &mut rand::thread_rng())
    }
}

fn apply_jitter(base: Duration, ratio: f64, rng: &mut impl Rng) -> Duration {
    if ratio <= 0.0 || base.is_zero() {
        return base;
    }
    let factor = rng.gen_range((1.0 - ratio)..=(1.0 + ratio));
    base.mul_f64(factor.max(0.0))
}
