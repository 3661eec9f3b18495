//! Backoff policy for transient fetch failures

use rand::Rng;
use std::time::Duration;

/// Retry budget and backoff base for one source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(0, Duration::from_millis(1))
    }

    /// Delay before retry number `attempt` (zero-based), with random jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.0..1.0);
        backoff_delay(self.retry_delay, attempt, jitter)
    }

    /// The full delay schedule for this policy, one entry per retry
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_retries).map(|a| self.delay_for(a)).collect()
    }
}

/// Exponential backoff with bounded jitter
///
/// `base * 2^attempt` plus up to half of that again, scaled by `jitter` in
/// `[0, 1)`. Consecutive delays therefore never overlap and the schedule is
/// strictly increasing for any positive base.
pub fn backoff_delay(base: Duration, attempt: u32, jitter: f64) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt.min(16)));
    let jitter = jitter.clamp(0.0, 0.999);
    exp + exp.mul_f64(jitter / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_without_jitter_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0, 0.0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1, 0.0), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3, 0.0), Duration::from_millis(800));
    }

    #[test]
    fn test_worst_case_jitter_stays_below_next_step() {
        let base = Duration::from_millis(100);
        for attempt in 0..8 {
            let high = backoff_delay(base, attempt, 0.999);
            let next_low = backoff_delay(base, attempt + 1, 0.0);
            assert!(high < next_low, "attempt {} overlaps the next", attempt);
        }
    }

    #[test]
    fn test_schedule_strictly_increasing() {
        let policy = RetryPolicy::new(5, Duration::from_millis(50));
        let schedule = policy.schedule();
        assert_eq!(schedule.len(), 5);
        assert!(schedule.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_none_policy_has_no_retries() {
        assert!(RetryPolicy::none().schedule().is_empty());
    }
}
