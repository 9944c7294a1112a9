//! Retry policy: attempt budget plus exponential or fixed backoff.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backoff {
    /// `base_delay_ms * 2^(failures - 1)`.
    Exponential { base_delay_ms: u64 },
    /// Same delay after every failure.
    Fixed { delay_ms: u64 },
}

/// Per-job retry policy. Stored with the job so a policy change does not
/// affect jobs already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total delivery attempts, including the first one.
    pub attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Backoff::Exponential { base_delay_ms: 1_000 },
        }
    }
}

impl RetryPolicy {
    pub fn exponential(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts,
            backoff: Backoff::Exponential {
                base_delay_ms: base_delay.as_millis() as u64,
            },
        }
    }

    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            backoff: Backoff::Fixed {
                delay_ms: delay.as_millis() as u64,
            },
        }
    }

    /// Delay to wait after the `failures`-th failed attempt (1-based), or
    /// `None` once the attempt budget is spent.
    pub fn delay_after(&self, failures: u32) -> Option<Duration> {
        if failures == 0 || failures >= self.attempts {
            return None;
        }
        let ms = match self.backoff {
            Backoff::Exponential { base_delay_ms } => {
                let factor = 1u64.checked_shl(failures - 1).unwrap_or(u64::MAX);
                base_delay_ms.saturating_mul(factor)
            }
            Backoff::Fixed { delay_ms } => delay_ms,
        };
        Some(Duration::from_millis(ms))
    }

    /// Returns `true` if another attempt is allowed after `failures` failures.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (1..=4)
            .map(|n| policy.delay_after(n).unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000]);
        // Fifth failure exhausts the budget.
        assert!(policy.delay_after(5).is_none());
    }

    #[test]
    fn delays_never_decrease() {
        let policy = RetryPolicy::exponential(40, Duration::from_millis(3));
        let mut prev = Duration::ZERO;
        for n in 1..40 {
            let d = policy.delay_after(n).unwrap();
            assert!(d >= prev, "attempt {n}: {d:?} < {prev:?}");
            prev = d;
        }
    }

    #[test]
    fn fixed_backoff() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(250));
        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(250)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_millis(250)));
        assert_eq!(policy.delay_after(3), None);
    }

    #[test]
    fn should_retry_boundary() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }
}
