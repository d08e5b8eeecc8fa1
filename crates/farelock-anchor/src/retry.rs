//! Bounded exponential backoff with jitter for chain RPC calls.

use std::time::Duration;

use rand::Rng;

/// Backoff policy applied to transient chain failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for the exponential schedule.
    pub base_delay: Duration,

    /// Ceiling on any single delay.
    pub max_delay: Duration,

    /// Jitter fraction (0.0 to 1.0) applied around each delay.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given 1-based attempt, jittered.
    ///
    /// Attempt 1 carries no delay. Later attempts double the base delay
    /// each step, capped at `max_delay`, with ±`jitter_factor`
    /// randomization to spread concurrent retriers.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(2).min(20);
        let multiplier = 2_u32.saturating_pow(exponent);
        let capped = std::cmp::min(self.base_delay * multiplier, self.max_delay);
        std::cmp::min(apply_jitter(capped, self.jitter_factor), self.max_delay)
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Randomizes a delay by ±`jitter_factor` to avoid thundering herds.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }
    let clamped = jitter_factor.clamp(0.0, 1.0);

    let mut rng = rand::thread_rng();
    let range = duration.as_secs_f64() * clamped;
    let offset = rng.gen_range(-range..=range);
    Duration::from_secs_f64((duration.as_secs_f64() + offset).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_has_no_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::ZERO);
    }

    #[test]
    fn delays_grow_exponentially_within_jitter_bounds() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(600),
            jitter_factor: 0.25,
        };

        for (attempt, nominal) in [(2u32, 4.0f64), (3, 8.0), (4, 16.0), (5, 32.0)] {
            let delay = policy.delay_before(attempt).as_secs_f64();
            assert!(
                delay >= nominal * 0.75 && delay <= nominal * 1.25,
                "attempt {attempt}: {delay}s outside ±25% of {nominal}s"
            );
        }
    }

    #[test]
    fn delay_never_exceeds_the_ceiling() {
        let policy = RetryPolicy {
            max_attempts: 30,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(64),
            jitter_factor: 0.5,
        };

        for attempt in 2..30 {
            assert!(policy.delay_before(attempt) <= Duration::from_secs(64));
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(600),
            jitter_factor: 0.0,
        };

        assert_eq!(policy.delay_before(2), Duration::from_secs(2));
        assert_eq!(policy.delay_before(3), Duration::from_secs(4));
        assert_eq!(policy.delay_before(4), Duration::from_secs(8));
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = RetryPolicy { max_attempts: 3, ..RetryPolicy::default() };
        assert!(policy.allows(1));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
    }
}
