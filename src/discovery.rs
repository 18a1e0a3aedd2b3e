//! Short-TTL discovery cache.
//!
//! Holds deployment data that changes rarely (the product catalog) and is
//! independent of the trust protocol: refreshed on a fixed interval and
//! stale-tolerant, so a refresh failure degrades to the last good value
//! instead of failing requests.

use crate::clock::Clock;
use crate::TrustgateError;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

struct CachedValue<T> {
    value: T,
    fetched_at: DateTime<Utc>,
}

/// A single cached value with TTL-driven refresh.
pub struct DiscoveryCache<T> {
    ttl: Duration,
    state: Mutex<Option<CachedValue<T>>>,
}

impl<T: Clone> DiscoveryCache<T> {
    /// Create an empty cache with the given refresh interval.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(None),
        }
    }

    /// Get the cached value, refreshing through `refresh` when the TTL
    /// has elapsed. A failed refresh serves the stale value when one
    /// exists; only a cold cache propagates the error.
    pub fn get_or_refresh<F>(
        &self,
        clock: &dyn Clock,
        refresh: F,
    ) -> Result<T, TrustgateError>
    where
        F: FnOnce() -> Result<T, TrustgateError>,
    {
        let now = clock.now_utc();
        let mut state = self
            .state
            .lock()
            .map_err(|_| TrustgateError::ConfigError("discovery cache poisoned".into()))?;

        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_default();
        if let Some(cached) = state.as_ref() {
            if now - cached.fetched_at < ttl {
                return Ok(cached.value.clone());
            }
        }

        match refresh() {
            Ok(value) => {
                *state = Some(CachedValue {
                    value: value.clone(),
                    fetched_at: now,
                });
                Ok(value)
            }
            Err(e) => match state.as_ref() {
                Some(stale) => {
                    warn!(error = %e, "discovery refresh failed, serving stale value");
                    Ok(stale.value.clone())
                }
                None => Err(e),
            },
        }
    }

    /// Drop the cached value so the next read refreshes.
    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = None;
        }
    }
}
