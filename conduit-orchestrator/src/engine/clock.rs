//! Time source for the engine
//!
//! Every wake time the engine persists is computed from a [`Clock`], so tests
//! can drive suspensions without sleeping.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Source of "now" for the engine and scheduler
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Adds a std duration to a timestamp
pub fn after(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    at + chrono::Duration::milliseconds(duration.as_millis() as i64)
}

#[cfg(test)]
pub use manual::ManualClock;

#[cfg(test)]
mod manual {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock that only moves when a test advances it
    pub struct ManualClock {
        base: DateTime<Utc>,
        elapsed_ms: AtomicU64,
    }

    impl ManualClock {
        pub fn new(base: DateTime<Utc>) -> Self {
            Self {
                base,
                elapsed_ms: AtomicU64::new(0),
            }
        }

        pub fn advance(&self, duration: Duration) {
            self.elapsed_ms
                .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new(Utc::now())
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            let elapsed = self.elapsed_ms.load(Ordering::Relaxed);
            self.base + chrono::Duration::milliseconds(elapsed as i64)
        }
    }
}
