//! # Trustgate
//!
//! **Server-side trust boundary for untrusted document-tooling clients.**
//!
//! Trustgate decides what a client may do: it issues and verifies HMAC-signed
//! session and CSRF tokens, rate-limits traffic, reconciles purchases with an
//! external billing authority, and records every verified purchase in an
//! idempotent ledger before any entitlement is granted.
//!
//! ## Features
//!
//! - **Corroborated sessions** — a signed token is accepted only while its
//!   registration is still present server-side; a store outage fails closed
//! - **CSRF purpose binding** — session tokens can never stand in for CSRF
//!   tokens, and CSRF tokens are bound to the session's subject
//! - **Layered rate limits** — a global per-device window for all traffic,
//!   plus burst and sustained windows on purchase verification
//! - **Oracle-verified purchases** — every purchase is re-verified against the
//!   billing authority under a hard timeout; unreachable means unverified
//! - **Idempotent ledger** — insert-first deduplication on transaction id;
//!   entitlements are granted only after the audit row commits
//! - **Signed webhooks** — billing events carry an Ed25519 signature over the
//!   exact raw body
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//! use trustgate::clock::SystemClock;
//! use trustgate::gateway::{Gateway, GatewayStores};
//! use trustgate::store::memory::{
//!     MemoryCounterStore, MemoryEntitlements, MemoryLedger, MemorySessionStore,
//! };
//! use trustgate::TrustgateConfig;
//!
//! fn main() -> Result<(), trustgate::TrustgateError> {
//!     let mut config = TrustgateConfig::new(
//!         std::env::var("SESSION_SECRET").unwrap_or_default(),
//!         "ag-proto-v1",
//!     );
//!     config.allowed_origins = vec!["https://app.example.com".to_string()];
//!
//!     let stores = GatewayStores {
//!         sessions: Arc::new(MemorySessionStore::new()),
//!         counters: Arc::new(MemoryCounterStore::new()),
//!         ledger: Arc::new(MemoryLedger::new()),
//!         entitlements: Arc::new(MemoryEntitlements::new()),
//!     };
//!     let gateway = Gateway::new(config, stores, Arc::new(SystemClock))?;
//!     // Map your HTTP framework's requests into gateway.handle(..).
//!     let _ = gateway;
//!     Ok(())
//! }
//! ```
//!
//! ## Threat Model
//!
//! Trustgate protects against:
//! - **Token forgery** — payload or signature tampering fails constant-time
//!   HMAC verification
//! - **Replayed sessions** — a revoked or expired registration rejects an
//!   otherwise valid token
//! - **Cross-site request forgery** — state-changing routes require a
//!   subject-bound, purpose-marked CSRF token
//! - **Fabricated purchases** — entitlements exist only for transactions the
//!   billing authority confirmed and the ledger committed
//! - **Spoofed webhooks** — unsigned or altered bodies are rejected
//!
//! Trustgate does not prevent a client from lying about its own local state;
//! it only guarantees that server-side grants and audit rows are earned.

#![deny(warnings)]
#![deny(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Tokens and sessions
pub mod session;
pub mod token;

// Durable-store seams
pub mod store;

// Request gates
pub mod limiter;

// Purchase reconciliation
pub mod catalog;
pub mod ledger;
pub mod oracle;

// External authorities
pub mod identity;
pub mod webhook;

// Deployment data
pub mod discovery;

// Orchestrator (main public API)
pub mod gateway;

// Re-exports for public API
pub use catalog::{ProductCatalog, Tier};
pub use clock::{Clock, SystemClock};
pub use config::{Environment, TrustgateConfig};
pub use errors::TrustgateError;
pub use gateway::request::{ApiRequest, ApiResponse};
pub use gateway::{Gateway, GatewayStores};
pub use ledger::CommitOutcome;
pub use session::SessionManager;

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
