//! Deterministic retry/backoff engine
//!
//! Computes the delay before a retry attempt: exponential growth from a base
//! value up to a cap, with jitter derived from a SHA-256 hash of a stable
//! seed and the attempt number. The same (seed, attempt) pair always yields
//! the same delay, so tests can reproduce exact delay sequences. The engine
//! is stateless; the caller owns sleeping and scheduling.

use crate::domain::{CaravanError, Result};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Backoff policy parameters
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Ceiling on any single delay
    pub max_delay: Duration,
    /// Total attempt budget (first attempt included)
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Computes the delay before the given retry attempt
    ///
    /// `attempt` is 1-indexed: attempt 1 is the first retry. The raw delay
    /// doubles per attempt from `base_delay`; jitter places the result in
    /// the upper half of the raw window, keyed by `seed` (typically the job
    /// id), then the cap is applied. Delays are non-decreasing in `attempt`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `attempt` is zero.
    pub fn next_delay(&self, seed: &str, attempt: u32) -> Result<Duration> {
        if attempt == 0 {
            return Err(CaravanError::Validation(
                "retry attempt numbers are 1-indexed".to_string(),
            ));
        }

        let base_ms = self.base_delay.as_millis().max(1);
        let raw_ms = base_ms.saturating_mul(1u128 << (attempt - 1).min(63));

        // Jitter in [raw/2, raw), keyed by (seed, attempt). The lower bound
        // of attempt n+1 equals the upper bound of attempt n, which keeps
        // the sequence non-decreasing even across the cap boundary.
        let fraction = jitter_fraction(seed, attempt);
        let jittered = raw_ms / 2 + ((raw_ms / 2) as f64 * fraction) as u128;

        let capped = jittered.min(self.max_delay.as_millis());
        Ok(Duration::from_millis(capped as u64))
    }

    /// Whether another retry fits in the attempt budget
    ///
    /// `attempts_made` counts every attempt so far, the initial one included.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// Deterministic fraction in [0, 1) from a hash of (seed, attempt)
fn jitter_fraction(seed: &str, attempt: u32) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b":");
    hasher.update(attempt.to_be_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) as f64 / (u64::MAX as f64 + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_attempts: 6,
        }
    }

    #[test]
    fn test_same_inputs_same_delay() {
        let policy = policy();
        let a = policy.next_delay("job-123", 3).unwrap();
        let b = policy.next_delay("job-123", 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seeds_differ() {
        let policy = policy();
        let a = policy.next_delay("job-123", 3).unwrap();
        let b = policy.next_delay("job-456", 3).unwrap();
        // Not guaranteed for every pair, but these two differ
        assert_ne!(a, b);
    }

    #[test]
    fn test_delays_are_non_decreasing() {
        let policy = policy();
        let mut previous = Duration::ZERO;
        for attempt in 1..=20 {
            let delay = policy.next_delay("job-123", attempt).unwrap();
            assert!(
                delay >= previous,
                "attempt {attempt}: {delay:?} < {previous:?}"
            );
            previous = delay;
        }
    }

    #[test]
    fn test_delay_respects_cap() {
        let policy = policy();
        for attempt in 1..=40 {
            let delay = policy.next_delay("job-123", attempt).unwrap();
            assert!(delay <= policy.max_delay);
        }
        // Far past the cap the delay saturates at exactly the cap
        assert_eq!(
            policy.next_delay("job-123", 30).unwrap(),
            policy.max_delay
        );
    }

    #[test]
    fn test_first_delay_within_raw_window() {
        let policy = policy();
        let delay = policy.next_delay("job-123", 1).unwrap();
        assert!(delay >= Duration::from_millis(50));
        assert!(delay < Duration::from_millis(100));
    }

    #[test]
    fn test_attempt_zero_is_an_input_error() {
        let err = policy().next_delay("job-123", 0).unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn test_attempt_budget() {
        let policy = policy();
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(5));
        assert!(!policy.allows_retry(6));
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = policy();
        let delay = policy.next_delay("job-123", u32::MAX).unwrap();
        assert_eq!(delay, policy.max_delay);
    }
}
