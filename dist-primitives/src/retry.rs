//! Exponential backoff with jitter for the optimistic retry loops.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryPolicy;

/// Tracks one retry loop's progress through a [`RetryPolicy`].
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            current: policy.initial_backoff,
            policy,
            attempts: 0,
        }
    }

    /// Failed attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Records a failed attempt and returns how long to wait before the next.
    ///
    /// Returns `None` once the policy's `max_attempts` is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        if let Some(max) = self.policy.max_attempts {
            if self.attempts >= max {
                return None;
            }
        }

        let ceiling = self.current.min(self.policy.max_backoff);
        self.current = ceiling.saturating_mul(2).min(self.policy.max_backoff);
        Some(jitter(ceiling))
    }
}

/// Picks a delay uniformly from `[ceiling / 2, ceiling]`.
fn jitter(ceiling: Duration) -> Duration {
    let high = ceiling.as_micros() as u64;
    if high == 0 {
        return Duration::ZERO;
    }
    let low = high / 2;
    Duration::from_micros(rand::thread_rng().gen_range(low..=high))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: Option<u32>) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(4),
            max_backoff: Duration::from_millis(16),
            max_attempts,
        }
    }

    #[test]
    fn delays_grow_and_stay_capped() {
        let mut backoff = Backoff::new(policy(None));
        let ceilings = [4, 8, 16, 16, 16];
        for ceiling in ceilings {
            let delay = backoff.next_delay().expect("unbounded policy");
            let ceiling = Duration::from_millis(ceiling);
            assert!(delay <= ceiling, "{delay:?} above {ceiling:?}");
            assert!(delay >= ceiling / 2, "{delay:?} below half of {ceiling:?}");
        }
        assert_eq!(backoff.attempts(), 5);
    }

    #[test]
    fn bounded_policy_runs_out() {
        let mut backoff = Backoff::new(policy(Some(3)));
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.attempts(), 3);
    }

    #[test]
    fn zero_backoff_never_sleeps() {
        let mut backoff = Backoff::new(RetryPolicy {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            max_attempts: None,
        });
        assert_eq!(backoff.next_delay(), Some(Duration::ZERO));
    }
}
