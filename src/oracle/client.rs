//! Blocking HTTP client for the billing authority.
//!
//! The underlying HTTP handle is built lazily on first use and reused for
//! the life of the client; construction is idempotent, so a failed build
//! is simply retried on the next call. Every request is bounded by a hard
//! timeout, after which the call is aborted and treated as failure.

use crate::catalog::ProductKind;
use crate::clock::Clock;
use crate::config::OracleConfig;
use crate::oracle::policy::{one_time_is_active, recurring_is_active, OneTimeRecord, RecurringRecord};
use crate::oracle::EntitlementOracle;
use crate::TrustgateError;
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Hard bound on any oracle call.
pub const ORACLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Billing authority client.
pub struct BillingClient {
    config: OracleConfig,
    require_acknowledgment: bool,
    clock: Arc<dyn Clock>,
    handle: OnceCell<Client>,
}

impl BillingClient {
    /// Create a client. No network or TLS work happens until first use.
    pub fn new(
        config: OracleConfig,
        require_acknowledgment: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            require_acknowledgment,
            clock,
            handle: OnceCell::new(),
        }
    }

    fn client(&self) -> Result<&Client, TrustgateError> {
        self.handle.get_or_try_init(|| {
            Client::builder()
                .timeout(ORACLE_TIMEOUT)
                .build()
                .map_err(|e| {
                    TrustgateError::EntitlementOracleUnavailable(format!(
                        "client construction failed: {}",
                        e
                    ))
                })
        })
    }

    fn purchase_url(&self, kind: ProductKind, product_id: &str, purchase_token: &str) -> String {
        let resource = match kind {
            ProductKind::Recurring => "subscriptions",
            ProductKind::OneTime => "products",
        };
        format!(
            "{}/applications/{}/purchases/{}/{}/tokens/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.package_name,
            resource,
            product_id,
            purchase_token
        )
    }

    fn fetch(&self, url: &str) -> Result<reqwest::blocking::Response, TrustgateError> {
        let response = self
            .client()?
            .get(url)
            .bearer_auth(&self.config.access_token)
            .send()
            .map_err(|e| {
                TrustgateError::EntitlementOracleUnavailable(format!("request failed: {}", e))
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(TrustgateError::EntitlementOracleUnavailable(format!(
                "authority returned {}",
                status
            )));
        }
        if !status.is_success() {
            // 4xx means the token/product pair does not check out.
            return Err(TrustgateError::EntitlementInvalid(format!(
                "authority rejected purchase ({})",
                status
            )));
        }
        Ok(response)
    }
}

impl EntitlementOracle for BillingClient {
    fn verify(
        &self,
        kind: ProductKind,
        product_id: &str,
        purchase_token: &str,
    ) -> Result<bool, TrustgateError> {
        let url = self.purchase_url(kind, product_id, purchase_token);
        let response = self.fetch(&url)?;

        let active = match kind {
            ProductKind::Recurring => {
                let record: RecurringRecord = response.json().map_err(|e| {
                    TrustgateError::EntitlementOracleUnavailable(format!("bad response: {}", e))
                })?;
                recurring_is_active(&record, self.require_acknowledgment, self.clock.now_millis())
            }
            ProductKind::OneTime => {
                let record: OneTimeRecord = response.json().map_err(|e| {
                    TrustgateError::EntitlementOracleUnavailable(format!("bad response: {}", e))
                })?;
                one_time_is_active(&record)
            }
        };

        debug!(product_id, active, "oracle verification completed");
        Ok(active)
    }
}
