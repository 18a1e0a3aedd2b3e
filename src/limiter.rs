//! Sliding-window rate limiting over an atomic counter store.
//!
//! Each named policy scopes its own counter per key; the first increment
//! in a window sets the TTL, and the count is compared after the
//! increment, so there is no separate check step to race against.
//!
//! Failure semantics differ by caller: general traffic fails open (allow
//! and log) because availability wins for reads; purchase traffic fails
//! closed because that endpoint gates entitlement grants.

use crate::clock::Clock;
use crate::store::{CounterStore, StoreError};
use crate::TrustgateError;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A named rate-limit policy: at most `max` requests per `window`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    /// Policy name, used to scope counter keys.
    pub name: &'static str,
    /// Maximum requests per window.
    pub max: u64,
    /// Window length.
    pub window: Duration,
}

/// Global per-key policy applied to every request.
pub const GLOBAL: RateLimitPolicy = RateLimitPolicy {
    name: "global",
    max: 30,
    window: Duration::from_secs(60),
};

/// Burst policy for purchase verification.
pub const PURCHASE_BURST: RateLimitPolicy = RateLimitPolicy {
    name: "purchase_burst",
    max: 5,
    window: Duration::from_secs(5 * 60),
};

/// Sustained policy for purchase verification.
pub const PURCHASE_SUSTAINED: RateLimitPolicy = RateLimitPolicy {
    name: "purchase_sustained",
    max: 10,
    window: Duration::from_secs(60 * 60),
};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Seconds until the window expires (the `Retry-After` hint).
    pub retry_after_secs: u64,
}

/// Per-key rate limiter over an atomic counter store.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter over the given counter store.
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Atomically increment the counter for `key` under `policy` and
    /// decide whether the request is allowed.
    pub fn check_and_increment(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
    ) -> Result<Decision, StoreError> {
        let scoped_key = format!("{}:{}", policy.name, key);
        let snapshot = self
            .store
            .incr(&scoped_key, policy.window, self.clock.now_utc())?;

        // Round a sub-second remainder up so a rejection near the window
        // end never advertises `Retry-After: 0`.
        let mut retry_after_secs = snapshot.ttl_remaining.as_secs();
        if snapshot.ttl_remaining.subsec_nanos() > 0 {
            retry_after_secs += 1;
        }

        Ok(Decision {
            allowed: snapshot.count <= policy.max,
            retry_after_secs,
        })
    }

    /// Global check for general traffic. A store outage fails open.
    pub fn check_general(&self, key: &str) -> Result<(), TrustgateError> {
        match self.check_and_increment(key, &GLOBAL) {
            Ok(decision) if decision.allowed => Ok(()),
            Ok(decision) => Err(TrustgateError::RateLimited {
                retry_after_secs: decision.retry_after_secs,
            }),
            Err(e) => {
                warn!(key, error = %e, "counter store unavailable, allowing general request");
                Ok(())
            }
        }
    }

    /// Burst + sustained check for purchase verification. Both policies
    /// must pass, and a store outage fails closed.
    pub fn check_purchase(&self, key: &str) -> Result<(), TrustgateError> {
        for policy in [&PURCHASE_BURST, &PURCHASE_SUSTAINED] {
            let decision = self
                .check_and_increment(key, policy)
                .map_err(|_| TrustgateError::RateLimiterUnavailable)?;
            if !decision.allowed {
                return Err(TrustgateError::RateLimited {
                    retry_after_secs: decision.retry_after_secs,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::store::memory::MemoryCounterStore;
    use crate::store::CounterSnapshot;
    use chrono::{DateTime, Utc};

    struct UnreachableCounters;

    impl CounterStore for UnreachableCounters {
        fn incr(
            &self,
            _key: &str,
            _ttl: Duration,
            _now: DateTime<Utc>,
        ) -> Result<CounterSnapshot, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    fn limiter() -> (RateLimiter, Arc<MockClock>) {
        let clock = Arc::new(MockClock::from_rfc3339("2025-06-01T12:00:00Z"));
        let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::new()), clock.clone());
        (limiter, clock)
    }

    #[test]
    fn allows_up_to_max_then_rejects() {
        let (limiter, _clock) = limiter();
        let policy = RateLimitPolicy {
            name: "test",
            max: 3,
            window: Duration::from_secs(60),
        };

        for _ in 0..3 {
            assert!(limiter.check_and_increment("k", &policy).unwrap().allowed);
        }
        let decision = limiter.check_and_increment("k", &policy).unwrap();
        assert!(!decision.allowed);
        assert!(decision.retry_after_secs > 0 && decision.retry_after_secs <= 60);
    }

    #[test]
    fn window_elapse_resets_counter() {
        let (limiter, clock) = limiter();
        let policy = RateLimitPolicy {
            name: "test",
            max: 1,
            window: Duration::from_secs(60),
        };

        assert!(limiter.check_and_increment("k", &policy).unwrap().allowed);
        assert!(!limiter.check_and_increment("k", &policy).unwrap().allowed);

        clock.advance(chrono::Duration::seconds(61));
        let decision = limiter.check_and_increment("k", &policy).unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.retry_after_secs, 60);
    }

    #[test]
    fn retry_after_rounds_subsecond_remainder_up() {
        let (limiter, clock) = limiter();
        let policy = RateLimitPolicy {
            name: "test",
            max: 1,
            window: Duration::from_secs(60),
        };

        assert!(limiter.check_and_increment("k", &policy).unwrap().allowed);
        clock.advance(chrono::Duration::milliseconds(59_900));

        // 100ms left in the window: the hint must not truncate to zero.
        let decision = limiter.check_and_increment("k", &policy).unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after_secs, 1);
    }

    #[test]
    fn policies_count_independently_for_same_key() {
        let (limiter, _clock) = limiter();
        for _ in 0..GLOBAL.max {
            assert!(limiter.check_general("k").is_ok());
        }
        assert!(limiter.check_general("k").is_err());

        // Purchase policies have their own counters for the same key.
        assert!(limiter.check_purchase("k").is_ok());
    }

    #[test]
    fn purchase_burst_limit_enforced() {
        let (limiter, _clock) = limiter();
        for _ in 0..PURCHASE_BURST.max {
            assert!(limiter.check_purchase("dev-1").is_ok());
        }
        let result = limiter.check_purchase("dev-1");
        assert!(matches!(result, Err(TrustgateError::RateLimited { .. })));
    }

    #[test]
    fn purchase_sustained_limit_enforced_across_burst_windows() {
        let (limiter, clock) = limiter();
        // Two burst windows of 5, then the sustained 10/hour cap trips.
        for _ in 0..5 {
            limiter.check_purchase("dev-1").unwrap();
        }
        clock.advance(chrono::Duration::minutes(6));
        for _ in 0..5 {
            limiter.check_purchase("dev-1").unwrap();
        }
        clock.advance(chrono::Duration::minutes(6));
        let result = limiter.check_purchase("dev-1");
        assert!(matches!(result, Err(TrustgateError::RateLimited { .. })));
    }

    #[test]
    fn general_traffic_fails_open_on_store_outage() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-06-01T12:00:00Z"));
        let limiter = RateLimiter::new(Arc::new(UnreachableCounters), clock);
        assert!(limiter.check_general("k").is_ok());
    }

    #[test]
    fn purchase_traffic_fails_closed_on_store_outage() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-06-01T12:00:00Z"));
        let limiter = RateLimiter::new(Arc::new(UnreachableCounters), clock);
        assert!(matches!(
            limiter.check_purchase("k"),
            Err(TrustgateError::RateLimiterUnavailable)
        ));
    }
}
