//! Deterministic clock abstraction for testable time-dependent logic.
//!
//! All protocol timestamps are UTC epoch milliseconds; the trait exposes
//! both `chrono` and millisecond views so token expiry and skew checks
//! share one time source.

use chrono::{DateTime, Utc};
#[cfg(any(test, feature = "test-seams"))]
use chrono::TimeZone;

/// Clock trait for deterministic time in tests.
pub trait Clock: Send + Sync {
    /// Get the current UTC time.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current time as UTC epoch milliseconds.
    fn now_millis(&self) -> i64 {
        self.now_utc().timestamp_millis()
    }
}

/// System clock using actual wall time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for deterministic testing.
///
/// Holds the instant as atomic epoch milliseconds so tests can advance a
/// clock that is already shared behind `Arc<dyn Clock>`.
#[cfg(any(test, feature = "test-seams"))]
#[derive(Debug, Default)]
pub struct MockClock {
    millis: std::sync::atomic::AtomicI64,
}

#[cfg(any(test, feature = "test-seams"))]
impl MockClock {
    /// Create a mock clock frozen at the given time.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            millis: std::sync::atomic::AtomicI64::new(now.timestamp_millis()),
        }
    }

    /// Create a mock clock from an RFC 3339 string.
    pub fn from_rfc3339(s: &str) -> Self {
        let now = DateTime::parse_from_rfc3339(s)
            .expect("valid RFC 3339")
            .with_timezone(&Utc);
        Self::new(now)
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: chrono::Duration) {
        self.millis.fetch_add(
            duration.num_milliseconds(),
            std::sync::atomic::Ordering::SeqCst,
        );
    }
}

#[cfg(any(test, feature = "test-seams"))]
impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        let millis = self.millis.load(std::sync::atomic::Ordering::SeqCst);
        Utc.timestamp_millis_opt(millis)
            .single()
            .expect("mock clock millis in range")
    }
}
