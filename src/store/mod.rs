//! Durable-store seams.
//!
//! All correctness-critical shared state (registered sessions, rate-limit
//! counters, ledger rows, entitlements) lives behind these traits so the
//! protocol stays stateless per instance. Implementations must make
//! [`CounterStore::incr`] and [`LedgerStore::insert`] single atomic
//! operations; the protocol never does a separate check step first.

pub mod memory;

use crate::catalog::Tier;
use crate::ledger::PurchaseTransaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A store operation failed at the storage layer.
///
/// Each caller decides whether this fails open or closed; the store itself
/// only reports the outage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or the operation failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A registered session, corroborating a signed token server-side.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// Unique token id (jti) of the issued session token.
    pub jti: String,
    /// Subject the token was issued to.
    pub subject_id: String,
    /// Device that performed the handshake.
    pub device_id: String,
    /// When the record (and token) expires.
    pub expires_at: DateTime<Utc>,
}

/// Durable record of currently-valid session tokens.
pub trait SessionStore: Send + Sync {
    /// Register a newly issued session token.
    fn register(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// True only if a record for `jti` exists and has not expired.
    fn is_registered(&self, jti: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;
}

/// Result of an atomic counter increment.
#[derive(Debug, Clone, Copy)]
pub struct CounterSnapshot {
    /// Counter value after this increment.
    pub count: u64,
    /// Time until the counter's window expires.
    pub ttl_remaining: Duration,
}

/// Keyed counters with per-window TTL, supporting atomic increment.
pub trait CounterStore: Send + Sync {
    /// Atomically increment the counter for `key`. The first increment in
    /// a window sets its expiry to `ttl` from `now`.
    fn incr(
        &self,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<CounterSnapshot, StoreError>;
}

/// Outcome of a uniquely-keyed ledger insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row was inserted; this transaction id is new.
    Inserted,
    /// A row with this transaction id already exists.
    DuplicateKey,
}

/// Append-only, uniquely-keyed purchase transaction ledger.
pub trait LedgerStore: Send + Sync {
    /// Insert a row, relying on a uniqueness constraint on transaction id.
    /// A constraint violation is reported as [`InsertOutcome::DuplicateKey`],
    /// distinct from any other storage error.
    fn insert(&self, row: &PurchaseTransaction) -> Result<InsertOutcome, StoreError>;

    /// Fetch a row for auditing or administrative replay.
    fn get(&self, transaction_id: &str) -> Result<Option<PurchaseTransaction>, StoreError>;
}

/// Usage snapshot synced by clients between devices.
///
/// Fields default to zero on the wire so older clients that omit newer
/// counters still sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageSnapshot {
    /// Operations performed today.
    pub operations_today: u32,
    /// AI document analyses this week.
    pub ai_docs_this_week: u32,
    /// AI document analyses this month.
    pub ai_docs_this_month: u32,
    /// Prepaid AI pack credits remaining.
    pub ai_pack_credits: u32,
    /// Epoch millis of the last daily reset.
    pub last_operation_reset: i64,
    /// Whether the one-time signup bonus was granted.
    pub has_received_bonus: bool,
}

/// Entitlement tiers and usage snapshots, keyed by device and/or subject.
pub trait EntitlementStore: Send + Sync {
    /// Record a tier grant. Implementations must never downgrade: the
    /// stored tier is the max of the existing and granted tiers.
    fn grant(
        &self,
        device_id: &str,
        subject_id: Option<&str>,
        tier: Tier,
    ) -> Result<(), StoreError>;

    /// Current tier for a device/subject pair (Free when unknown).
    fn tier_for(&self, device_id: &str, subject_id: Option<&str>) -> Result<Tier, StoreError>;

    /// Fetch the usage snapshot for a key, if one was ever synced.
    fn usage(&self, key: &str) -> Result<Option<UsageSnapshot>, StoreError>;

    /// Overwrite the usage snapshot for a key.
    fn set_usage(&self, key: &str, snapshot: &UsageSnapshot) -> Result<(), StoreError>;
}
