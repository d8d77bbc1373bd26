//! Wall-clock abstraction.
//!
//! Staleness checks compare against persisted unix timestamps, so they need
//! wall-clock time rather than `tokio::time::Instant`. Tests substitute a
//! mocked clock.

use chrono::Utc;

/// Source of unix time in seconds.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        Utc::now().timestamp()
    }
}
