//! Trustgate error types.
//!
//! Every gate in the request pipeline owns its own error mapping; the
//! variants here carry enough structure for the gateway to produce a
//! machine-readable wire code, an HTTP status, and a `Retry-After` hint
//! without leaking internals.

use thiserror::Error;

/// Errors that can occur inside the trust boundary.
#[derive(Debug, Error)]
pub enum TrustgateError {
    /// Required secret or credential is missing or malformed (always fatal).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Session or CSRF token is missing, malformed, expired, or unregistered.
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Request origin is not on the allow-list.
    #[error("Origin rejected")]
    OriginRejected,

    /// HTTP method the endpoint does not serve.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// CSRF token missing, mismatched subject, or failed verification.
    #[error("CSRF verification failed: {0}")]
    CsrfRejected(String),

    /// Rate limit exceeded; retryable once the window elapses.
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the current window expires.
        retry_after_secs: u64,
    },

    /// Counter store unreachable on a fail-closed path.
    #[error("Rate limiter unavailable")]
    RateLimiterUnavailable,

    /// Billing authority rejected the purchase (non-retryable).
    #[error("Entitlement verification failed: {0}")]
    EntitlementInvalid(String),

    /// Billing authority unreachable or timed out (fail closed).
    #[error("Entitlement oracle unavailable: {0}")]
    EntitlementOracleUnavailable(String),

    /// Backing store unreachable on a read/write path with no fail-open rule.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Transaction id already processed (idempotent no-op, not a failure).
    #[error("Transaction already processed: {transaction_id}")]
    DuplicateTransaction {
        /// The transaction id that already has a ledger row.
        transaction_id: String,
    },

    /// Ledger insert failed for a reason other than duplication.
    #[error("Ledger write error: {0}")]
    LedgerWriteError(String),
}

impl TrustgateError {
    /// HTTP status code for this error on the wire.
    pub fn status(&self) -> u16 {
        match self {
            Self::ConfigError(_) => 500,
            Self::AuthError(_) => 401,
            Self::OriginRejected => 403,
            Self::MethodNotAllowed => 405,
            Self::CsrfRejected(_) => 403,
            Self::RateLimited { .. } => 429,
            Self::RateLimiterUnavailable => 503,
            // Oracle outage is indistinguishable from rejection to callers
            // (fail closed); only logs tell them apart.
            Self::EntitlementInvalid(_) => 402,
            Self::EntitlementOracleUnavailable(_) => 402,
            Self::StoreUnavailable(_) => 503,
            Self::DuplicateTransaction { .. } => 409,
            Self::LedgerWriteError(_) => 500,
        }
    }

    /// Stable machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "config_error",
            Self::AuthError(_) => "unauthorized",
            Self::OriginRejected => "origin_rejected",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::CsrfRejected(_) => "csrf_rejected",
            Self::RateLimited { .. } => "rate_limited",
            Self::RateLimiterUnavailable => "rate_limiter_unavailable",
            Self::EntitlementInvalid(_) => "entitlement_invalid",
            Self::EntitlementOracleUnavailable(_) => "entitlement_invalid",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::DuplicateTransaction { .. } => "duplicate_transaction",
            Self::LedgerWriteError(_) => "ledger_write_error",
        }
    }

    /// Seconds for a `Retry-After` header, when the error is retryable.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            Self::RateLimiterUnavailable => Some(1),
            Self::StoreUnavailable(_) => Some(1),
            _ => None,
        }
    }
}
