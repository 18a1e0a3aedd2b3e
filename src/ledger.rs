//! Purchase ledger: append-only transaction rows and idempotent grants.
//!
//! Deduplication is insert-first: the store's uniqueness constraint on
//! transaction id is the only authority, and a constraint violation is the
//! signal "already processed". There is no select-then-insert — checking
//! for existence first would open a race where two concurrent requests
//! both observe "not found" and both grant.
//!
//! The entitlement grant runs only after the `Success` row is durable.
//! "Credited but unaudited" is therefore impossible; the converse (a
//! committed row whose grant failed) is tolerated and recoverable through
//! [`PurchaseLedger::replay_grant`].

use crate::catalog::{ProductCatalog, Tier};
use crate::clock::Clock;
use crate::store::{EntitlementStore, InsertOutcome, LedgerStore};
use crate::TrustgateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

/// Processing status of a ledger row.
///
/// The verification pipeline persists only `Success` rows: a rejected
/// purchase leaves no row, so the same transaction id can commit once the
/// authority accepts it. `Pending` and `Failed` exist for store backends
/// and administrative tooling that stage or annotate rows out of band;
/// [`PurchaseLedger::replay_grant`] refuses anything but `Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Recorded but not yet verified.
    Pending,
    /// Verified and granted.
    Success,
    /// Verification failed; recorded for auditing.
    Failed,
}

/// Immutable ledger row, keyed by caller-supplied transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseTransaction {
    /// Unique transaction id from the billing flow.
    pub transaction_id: String,
    /// Device that submitted the purchase.
    pub device_id: String,
    /// Verified identity, when the session was authenticated.
    pub subject_id: Option<String>,
    /// Store product id.
    pub product_id: String,
    /// Opaque purchase token handed to the oracle.
    pub purchase_token: String,
    /// Row status.
    pub status: TransactionStatus,
    /// When verification completed.
    pub verified_at: DateTime<Utc>,
}

/// Typed outcome of a commit attempt.
///
/// Replaces error-as-control-flow: a duplicate is not an error path, and
/// a real storage failure is never mistaken for one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The row was inserted and the grant applied.
    Committed,
    /// A row for this transaction id already existed; no new grant.
    AlreadyProcessed,
    /// The insert failed for a reason other than duplication.
    Failed(String),
}

/// Append-only purchase ledger with grant-after-commit ordering.
pub struct PurchaseLedger {
    store: Arc<dyn LedgerStore>,
    entitlements: Arc<dyn EntitlementStore>,
    clock: Arc<dyn Clock>,
}

impl PurchaseLedger {
    /// Create a ledger over its backing stores.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        entitlements: Arc<dyn EntitlementStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            entitlements,
            clock,
        }
    }

    /// Build a `Success` row stamped with the current time.
    pub fn success_row(
        &self,
        transaction_id: &str,
        device_id: &str,
        subject_id: Option<&str>,
        product_id: &str,
        purchase_token: &str,
    ) -> PurchaseTransaction {
        PurchaseTransaction {
            transaction_id: transaction_id.to_string(),
            device_id: device_id.to_string(),
            subject_id: subject_id.map(str::to_string),
            product_id: product_id.to_string(),
            purchase_token: purchase_token.to_string(),
            status: TransactionStatus::Success,
            verified_at: self.clock.now_utc(),
        }
    }

    /// Commit a row and, if it is new, apply the entitlement grant.
    pub fn commit_and_grant(&self, row: &PurchaseTransaction, tier: Tier) -> CommitOutcome {
        match self.store.insert(row) {
            Ok(InsertOutcome::Inserted) => {
                if let Err(e) = self.entitlements.grant(
                    &row.device_id,
                    row.subject_id.as_deref(),
                    tier,
                ) {
                    // The audit row is durable; the grant is recoverable
                    // through replay_grant.
                    error!(
                        transaction_id = %row.transaction_id,
                        error = %e,
                        "entitlement grant failed after ledger commit"
                    );
                }
                CommitOutcome::Committed
            }
            Ok(InsertOutcome::DuplicateKey) => CommitOutcome::AlreadyProcessed,
            Err(e) => CommitOutcome::Failed(e.to_string()),
        }
    }

    /// Administrative replay: re-apply the grant for a committed
    /// `Success` row whose original grant step failed.
    pub fn replay_grant(
        &self,
        transaction_id: &str,
        catalog: &ProductCatalog,
    ) -> Result<Tier, TrustgateError> {
        let row = self
            .store
            .get(transaction_id)
            .map_err(|e| TrustgateError::LedgerWriteError(e.to_string()))?
            .ok_or_else(|| {
                TrustgateError::LedgerWriteError(format!(
                    "no ledger row for transaction {}",
                    transaction_id
                ))
            })?;

        if row.status != TransactionStatus::Success {
            return Err(TrustgateError::LedgerWriteError(format!(
                "transaction {} is not a success row",
                transaction_id
            )));
        }

        let tier = catalog
            .lookup(&row.product_id)
            .map(|p| p.tier)
            .ok_or_else(|| {
                TrustgateError::ConfigError(format!("unknown product {}", row.product_id))
            })?;

        self.entitlements
            .grant(&row.device_id, row.subject_id.as_deref(), tier)
            .map_err(|e| TrustgateError::LedgerWriteError(e.to_string()))?;

        Ok(tier)
    }
}
