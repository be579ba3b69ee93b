//! Attempt-level retry policy
//!
//! The only place that decides whether a failed attempt is retried. Nothing
//! below it (adapter, poll loop, checker) retries on its own.

use std::time::Duration;

/// Bounded fixed-backoff retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first
    pub max_attempts: u32,

    /// Fixed wait before the next attempt begins
    pub backoff: Duration,
}

/// What to do after an attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Begin a new attempt after the backoff
    RetryAfter(Duration),

    /// The failed attempt was the last one allowed
    Exhausted,

    /// The failure is not transient; retrying cannot help
    GiveUp,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Decides the follow-up for a failed attempt
    ///
    /// `attempt` is 1-based and counts the attempt that just failed.
    pub fn decide(&self, attempt: u32, transient: bool) -> RetryDecision {
        if !transient {
            RetryDecision::GiveUp
        } else if attempt >= self.max_attempts {
            RetryDecision::Exhausted
        } else {
            RetryDecision::RetryAfter(self.backoff)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff, Duration::from_secs(10));
    }

    #[test]
    fn test_fifth_failure_exhausts_default_policy() {
        let policy = RetryPolicy::default();
        for attempt in 1..5 {
            assert_eq!(
                policy.decide(attempt, true),
                RetryDecision::RetryAfter(Duration::from_secs(10))
            );
        }
        assert_eq!(policy.decide(5, true), RetryDecision::Exhausted);
    }

    #[test]
    fn test_permanent_failure_is_never_retried() {
        assert_eq!(RetryPolicy::default().decide(1, false), RetryDecision::GiveUp);
    }

    #[test]
    fn test_single_attempt_policy() {
        let policy = RetryPolicy::new(1, Duration::from_secs(1));
        assert_eq!(policy.decide(1, true), RetryDecision::Exhausted);
    }

    #[test]
    fn test_zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    proptest! {
        #[test]
        fn prop_retries_stop_exactly_at_the_limit(max in 1u32..20, attempt in 1u32..40) {
            let policy = RetryPolicy::new(max, Duration::from_secs(10));
            let decision = policy.decide(attempt, true);
            if attempt < max {
                prop_assert_eq!(decision, RetryDecision::RetryAfter(Duration::from_secs(10)));
            } else {
                prop_assert_eq!(decision, RetryDecision::Exhausted);
            }
        }
    }
}
