//! Product catalog: which products exist, what kind they are, and the
//! tier each one grants.

use serde::{Deserialize, Serialize};

/// Entitlement tier granted to a device or identity.
///
/// Ordered so that grants never downgrade: a lifetime entitlement is not
/// overwritten by a later monthly purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// No paid entitlement.
    Free,
    /// Recurring paid entitlement.
    Pro,
    /// One-time permanent entitlement.
    Lifetime,
}

impl Tier {
    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Lifetime => "lifetime",
        }
    }
}

/// How the billing authority models a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductKind {
    /// Auto-renewing subscription.
    Recurring,
    /// One-time purchase.
    OneTime,
}

/// A purchasable product.
#[derive(Debug, Clone)]
pub struct Product {
    /// Store product id.
    pub product_id: String,
    /// Recurring or one-time.
    pub kind: ProductKind,
    /// Tier granted on successful verification.
    pub tier: Tier,
}

/// The set of products this deployment sells.
#[derive(Debug, Clone)]
pub struct ProductCatalog {
    products: Vec<Product>,
}

impl ProductCatalog {
    /// Build a catalog from an explicit product list.
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    /// The standard two-product catalog: a monthly subscription and a
    /// lifetime unlock.
    pub fn standard() -> Self {
        Self::new(vec![
            Product {
                product_id: "ag_pro_monthly".to_string(),
                kind: ProductKind::Recurring,
                tier: Tier::Pro,
            },
            Product {
                product_id: "ag_lifetime_unlock".to_string(),
                kind: ProductKind::OneTime,
                tier: Tier::Lifetime,
            },
        ])
    }

    /// Look up a product by store id.
    pub fn lookup(&self, product_id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.product_id == product_id)
    }

    /// All products in the catalog.
    pub fn products(&self) -> &[Product] {
        &self.products
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ordering_prevents_downgrades() {
        assert!(Tier::Lifetime > Tier::Pro);
        assert!(Tier::Pro > Tier::Free);
        assert_eq!(Tier::Pro.max(Tier::Lifetime), Tier::Lifetime);
    }

    #[test]
    fn standard_catalog_resolves_known_products() {
        let catalog = ProductCatalog::standard();
        let sub = catalog.lookup("ag_pro_monthly").unwrap();
        assert_eq!(sub.kind, ProductKind::Recurring);
        assert_eq!(sub.tier, Tier::Pro);

        let unlock = catalog.lookup("ag_lifetime_unlock").unwrap();
        assert_eq!(unlock.kind, ProductKind::OneTime);
        assert_eq!(unlock.tier, Tier::Lifetime);
    }

    #[test]
    fn unknown_product_is_none() {
        assert!(ProductCatalog::standard().lookup("ag_unknown").is_none());
    }

    #[test]
    fn tier_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Tier::Pro).unwrap(), "\"pro\"");
        assert_eq!(Tier::Lifetime.as_str(), "lifetime");
    }
}
