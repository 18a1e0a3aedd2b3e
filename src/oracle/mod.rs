//! Entitlement oracle: the external billing authority that is the sole
//! source of truth for purchase validity.

pub mod client;
pub mod policy;

use crate::catalog::ProductKind;
use crate::TrustgateError;

/// Confirms whether a purchase token legitimately grants an entitlement.
///
/// Implementations are bounded by a hard timeout and fail closed: an
/// unreachable authority means "not verified", never "assumed valid".
pub trait EntitlementOracle: Send + Sync {
    /// Verify a purchase token for a product.
    fn verify(
        &self,
        kind: ProductKind,
        product_id: &str,
        purchase_token: &str,
    ) -> Result<bool, TrustgateError>;
}
