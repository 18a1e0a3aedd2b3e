//! In-memory store implementations.
//!
//! Used by tests and single-instance deployments. Each store holds its map
//! behind one mutex, so increments and inserts are atomic exactly the way
//! the protocol requires of a real backing store.

use super::{
    CounterSnapshot, CounterStore, EntitlementStore, InsertOutcome, LedgerStore, SessionRecord,
    SessionStore, StoreError, UsageSnapshot,
};
use crate::catalog::Tier;
use crate::ledger::PurchaseTransaction;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// In-memory session revocation store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: Mutex<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a registered session (explicit revocation).
    pub fn revoke(&self, jti: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.remove(jti);
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn register(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("session store poisoned".into()))?;
        records.insert(record.jti.clone(), record.clone());
        Ok(())
    }

    fn is_registered(&self, jti: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("session store poisoned".into()))?;
        Ok(records
            .get(jti)
            .map(|r| r.expires_at > now)
            .unwrap_or(false))
    }
}

#[derive(Debug)]
struct CounterEntry {
    count: u64,
    expires_at: DateTime<Utc>,
}

/// In-memory counter store with TTL windows.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, CounterEntry>>,
}

impl MemoryCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryCounterStore {
    fn incr(
        &self,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<CounterSnapshot, StoreError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| StoreError::Unavailable("counter store poisoned".into()))?;

        let entry = counters.entry(key.to_string()).or_insert(CounterEntry {
            count: 0,
            expires_at: now,
        });

        // An expired window starts over; the first increment sets the TTL.
        if entry.expires_at <= now {
            entry.count = 0;
            entry.expires_at = now
                + chrono::Duration::from_std(ttl)
                    .map_err(|_| StoreError::Unavailable("ttl out of range".into()))?;
        }
        entry.count += 1;

        let ttl_remaining = (entry.expires_at - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        Ok(CounterSnapshot {
            count: entry.count,
            ttl_remaining,
        })
    }
}

/// In-memory ledger with a uniqueness constraint on transaction id.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    rows: Mutex<HashMap<String, PurchaseTransaction>>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows (test/audit helper).
    pub fn len(&self) -> usize {
        self.rows.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the ledger has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LedgerStore for MemoryLedger {
    fn insert(&self, row: &PurchaseTransaction) -> Result<InsertOutcome, StoreError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::Unavailable("ledger poisoned".into()))?;
        if rows.contains_key(&row.transaction_id) {
            return Ok(InsertOutcome::DuplicateKey);
        }
        rows.insert(row.transaction_id.clone(), row.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn get(&self, transaction_id: &str) -> Result<Option<PurchaseTransaction>, StoreError> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::Unavailable("ledger poisoned".into()))?;
        Ok(rows.get(transaction_id).cloned())
    }
}

#[derive(Debug, Default)]
struct EntitlementState {
    tiers: HashMap<String, Tier>,
    usage: HashMap<String, UsageSnapshot>,
}

/// In-memory entitlement and usage store.
#[derive(Debug, Default)]
pub struct MemoryEntitlements {
    state: Mutex<EntitlementState>,
}

impl MemoryEntitlements {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntitlementStore for MemoryEntitlements {
    fn grant(
        &self,
        device_id: &str,
        subject_id: Option<&str>,
        tier: Tier,
    ) -> Result<(), StoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StoreError::Unavailable("entitlement store poisoned".into()))?;
        let mut keys = vec![device_id.to_string()];
        if let Some(subject) = subject_id {
            keys.push(subject.to_string());
        }
        for key in keys {
            let current = state.tiers.get(&key).copied().unwrap_or(Tier::Free);
            state.tiers.insert(key, current.max(tier));
        }
        Ok(())
    }

    fn tier_for(&self, device_id: &str, subject_id: Option<&str>) -> Result<Tier, StoreError> {
        let state = self
            .state
            .lock()
            .map_err(|_| StoreError::Unavailable("entitlement store poisoned".into()))?;
        let device_tier = state.tiers.get(device_id).copied().unwrap_or(Tier::Free);
        let subject_tier = subject_id
            .and_then(|s| state.tiers.get(s).copied())
            .unwrap_or(Tier::Free);
        Ok(device_tier.max(subject_tier))
    }

    fn usage(&self, key: &str) -> Result<Option<UsageSnapshot>, StoreError> {
        let state = self
            .state
            .lock()
            .map_err(|_| StoreError::Unavailable("entitlement store poisoned".into()))?;
        Ok(state.usage.get(key).cloned())
    }

    fn set_usage(&self, key: &str, snapshot: &UsageSnapshot) -> Result<(), StoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StoreError::Unavailable("entitlement store poisoned".into()))?;
        state.usage.insert(key.to_string(), snapshot.clone());
        Ok(())
    }
}
