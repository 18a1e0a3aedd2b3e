//! The trust-boundary orchestrator.
//!
//! Every inbound request passes a fixed pipeline of gates; each gate
//! either passes the request on or short-circuits with an error, and no
//! later side effect runs after a failed gate.
//!
//! ```text
//! ORIGIN_CHECK -> WEBHOOK_PATH                          (signed server events)
//!              -> RATE_LIMIT(global) -> AUTH -> ROUTE   (client protocol)
//! ```
//!
//! The purchase route adds its own gates in order: burst + sustained rate
//! limits, CSRF, timestamp freshness, oracle verification, ledger commit,
//! grant.

pub mod origin;
pub mod request;

use crate::catalog::ProductCatalog;
use crate::clock::Clock;
use crate::config::TrustgateConfig;
use crate::discovery::DiscoveryCache;
use crate::gateway::origin::OriginPolicy;
use crate::gateway::request::{
    ApiRequest, ApiResponse, BillingEvent, RequestBody, HEADER_CSRF_TOKEN, HEADER_DEVICE_ID,
    HEADER_PROTOCOL_SIGNATURE, HEADER_TIMESTAMP, HEADER_WEBHOOK_SIGNATURE, WEBHOOK_PATH,
};
use crate::identity::IdentityVerifier;
use crate::ledger::{CommitOutcome, PurchaseLedger};
use crate::limiter::RateLimiter;
use crate::oracle::client::BillingClient;
use crate::oracle::EntitlementOracle;
use crate::session::SessionManager;
use crate::store::{
    CounterStore, EntitlementStore, LedgerStore, SessionStore, UsageSnapshot,
};
use crate::webhook::WebhookAuthenticator;
use crate::TrustgateError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Maximum client clock skew tolerated on purchase requests.
pub const MAX_TIMESTAMP_SKEW_MILLIS: i64 = 5 * 60 * 1000;

/// Product catalog refresh interval.
const CATALOG_TTL: Duration = Duration::from_secs(600);

/// Source of the current product catalog.
pub type CatalogSource = Arc<dyn Fn() -> Result<ProductCatalog, TrustgateError> + Send + Sync>;

/// The durable stores the gateway runs over.
pub struct GatewayStores {
    /// Registered-session corroboration store.
    pub sessions: Arc<dyn SessionStore>,
    /// Rate-limit counter store.
    pub counters: Arc<dyn CounterStore>,
    /// Purchase transaction ledger.
    pub ledger: Arc<dyn LedgerStore>,
    /// Entitlement tiers and usage snapshots.
    pub entitlements: Arc<dyn EntitlementStore>,
}

/// Request orchestrator for the whole trust boundary.
pub struct Gateway {
    config: TrustgateConfig,
    origin: OriginPolicy,
    sessions: SessionManager,
    limiter: RateLimiter,
    ledger: PurchaseLedger,
    entitlements: Arc<dyn EntitlementStore>,
    webhook: WebhookAuthenticator,
    oracle: Option<Arc<dyn EntitlementOracle>>,
    identity: Option<Arc<dyn IdentityVerifier>>,
    catalog_cache: DiscoveryCache<ProductCatalog>,
    catalog_source: CatalogSource,
    clock: Arc<dyn Clock>,
}

impl Gateway {
    /// Build a gateway over the given stores. Fails fast on invalid
    /// configuration (including a malformed webhook key). When billing
    /// credentials are configured the oracle client is built from them;
    /// [`Gateway::with_oracle`] overrides it.
    pub fn new(
        config: TrustgateConfig,
        stores: GatewayStores,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TrustgateError> {
        config.validate()?;

        let webhook = WebhookAuthenticator::new(&config)?;
        let oracle = config.oracle.clone().map(|credentials| {
            Arc::new(BillingClient::new(
                credentials,
                config.require_acknowledgment,
                clock.clone(),
            )) as Arc<dyn EntitlementOracle>
        });

        Ok(Self {
            origin: OriginPolicy::new(&config),
            sessions: SessionManager::new(&config, stores.sessions, clock.clone()),
            limiter: RateLimiter::new(stores.counters, clock.clone()),
            ledger: PurchaseLedger::new(
                stores.ledger,
                stores.entitlements.clone(),
                clock.clone(),
            ),
            entitlements: stores.entitlements,
            webhook,
            oracle,
            identity: None,
            catalog_cache: DiscoveryCache::new(CATALOG_TTL),
            catalog_source: Arc::new(|| Ok(ProductCatalog::standard())),
            config,
            clock,
        })
    }

    /// Replace the entitlement oracle (tests, alternative authorities).
    pub fn with_oracle(mut self, oracle: Arc<dyn EntitlementOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Enable identity-credential verification at handshake.
    pub fn with_identity_verifier(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.identity = Some(verifier);
        self
    }

    /// Replace the product catalog source.
    pub fn with_catalog_source(mut self, source: CatalogSource) -> Self {
        self.catalog_source = source;
        self.catalog_cache.reset();
        self
    }

    /// Handle one request end to end. Never panics; every failure maps
    /// to a wire error with browser security headers attached.
    pub fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let mut response = match self.dispatch(request) {
            Ok(response) => response,
            Err(e) => {
                debug!(code = e.code(), status = e.status(), "request rejected");
                ApiResponse::from_error(&e)
            }
        };
        self.origin
            .apply_headers(&mut response, request.origin.as_deref());
        response
    }

    fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, TrustgateError> {
        self.origin.check(request.origin.as_deref())?;

        if request.method == "OPTIONS" {
            return Ok(ApiResponse::ok(json!({})));
        }
        if request.method != "POST" {
            return Err(TrustgateError::MethodNotAllowed);
        }

        if request.path == WEBHOOK_PATH {
            return self.handle_webhook(request);
        }

        let rate_key = request.header(HEADER_DEVICE_ID).unwrap_or("anonymous");
        self.limiter.check_general(rate_key)?;

        match RequestBody::parse(&request.body)? {
            RequestBody::SessionInit { id_token } => self.handle_session_init(request, id_token),
            RequestBody::ServerTime => Ok(ApiResponse::ok(json!({
                "serverTime": self.clock.now_millis(),
            }))),
            RequestBody::CheckSubscriptionStatus => self.handle_subscription_status(request),
            RequestBody::UsageFetch => self.handle_usage_fetch(request),
            RequestBody::UsageSync { usage } => self.handle_usage_sync(request, &usage),
            RequestBody::VerifyPurchase {
                purchase_token,
                product_id,
                transaction_id,
            } => self.handle_verify_purchase(
                request,
                &purchase_token,
                &product_id,
                &transaction_id,
            ),
        }
    }

    fn handle_webhook(&self, request: &ApiRequest) -> Result<ApiResponse, TrustgateError> {
        self.webhook
            .verify(&request.body, request.header(HEADER_WEBHOOK_SIGNATURE))?;

        // Parse only after the signature over the raw bytes verified.
        let event: BillingEvent = serde_json::from_slice(&request.body)
            .map_err(|e| TrustgateError::AuthError(format!("malformed webhook body: {}", e)))?;

        info!(event = %event.event, "billing event received");
        Ok(ApiResponse::ok(json!({ "received": true })))
    }

    fn handle_session_init(
        &self,
        request: &ApiRequest,
        id_token: Option<String>,
    ) -> Result<ApiResponse, TrustgateError> {
        let signature = request
            .header(HEADER_PROTOCOL_SIGNATURE)
            .ok_or_else(|| TrustgateError::AuthError("missing protocol signature".into()))?;
        if signature != self.config.protocol_signature {
            return Err(TrustgateError::AuthError(
                "protocol signature mismatch".into(),
            ));
        }

        let device_id = self.require_device_id(request)?;
        let (subject, is_authenticated, email) = match id_token {
            Some(credential) => {
                let verifier = self.identity.as_ref().ok_or_else(|| {
                    TrustgateError::AuthError("identity verification not configured".into())
                })?;
                let identity = verifier.verify(&credential)?;
                (identity.subject, true, identity.email)
            }
            None => (device_id.to_string(), false, None),
        };

        let tokens = self
            .sessions
            .issue_pair(&subject, is_authenticated, email, device_id)?;
        info!(authenticated = is_authenticated, "session issued");

        Ok(ApiResponse::ok(json!({
            "sessionToken": tokens.session_token,
            "csrfToken": tokens.csrf_token,
            "expiresAt": tokens.claims.exp,
        })))
    }

    fn handle_subscription_status(
        &self,
        request: &ApiRequest,
    ) -> Result<ApiResponse, TrustgateError> {
        let device_id = self.require_device_id(request)?;
        // Public route: a session is optional, an invalid one is ignored.
        let session = request
            .bearer_token()
            .and_then(|token| self.sessions.verify_session(token).ok());
        let subject = session
            .as_ref()
            .filter(|claims| claims.is_authenticated)
            .map(|claims| claims.sub.as_str());

        // Availability wins for this read: an unreachable store reports
        // the free tier rather than an error.
        let tier = match self.entitlements.tier_for(device_id, subject) {
            Ok(tier) => tier,
            Err(e) => {
                warn!(error = %e, "entitlement store unavailable, reporting free tier");
                crate::catalog::Tier::Free
            }
        };

        let catalog = self.catalog()?;
        let products: Vec<&str> = catalog
            .products()
            .iter()
            .map(|p| p.product_id.as_str())
            .collect();

        Ok(ApiResponse::ok(json!({
            "tier": tier.as_str(),
            "isSubscribed": tier > crate::catalog::Tier::Free,
            "products": products,
        })))
    }

    fn handle_usage_fetch(&self, request: &ApiRequest) -> Result<ApiResponse, TrustgateError> {
        let key = self.usage_key(request)?;
        let snapshot = self
            .entitlements
            .usage(&key)
            .map_err(|e| TrustgateError::StoreUnavailable(e.to_string()))?
            .unwrap_or_default();
        Ok(ApiResponse::ok(json!({ "usage": snapshot })))
    }

    fn handle_usage_sync(
        &self,
        request: &ApiRequest,
        snapshot: &UsageSnapshot,
    ) -> Result<ApiResponse, TrustgateError> {
        // Public route, keyed the same way the read is: session subject
        // when a valid token is presented, device id otherwise.
        let key = self.usage_key(request)?;
        self.entitlements
            .set_usage(&key, snapshot)
            .map_err(|e| TrustgateError::StoreUnavailable(e.to_string()))?;
        Ok(ApiResponse::ok(json!({ "synced": true })))
    }

    fn handle_verify_purchase(
        &self,
        request: &ApiRequest,
        purchase_token: &str,
        product_id: &str,
        transaction_id: &str,
    ) -> Result<ApiResponse, TrustgateError> {
        let token = request
            .bearer_token()
            .ok_or_else(|| TrustgateError::AuthError("missing session token".into()))?;
        let session = self.sessions.verify_session(token)?;
        let device_id = self.require_device_id(request)?;

        self.limiter.check_purchase(device_id)?;

        let csrf = request
            .header(HEADER_CSRF_TOKEN)
            .ok_or_else(|| TrustgateError::CsrfRejected("missing CSRF token".into()))?;
        self.sessions.verify_csrf(csrf, &session.sub)?;

        self.check_timestamp(request.header(HEADER_TIMESTAMP))?;

        let catalog = self.catalog()?;
        let product = catalog.lookup(product_id).ok_or_else(|| {
            TrustgateError::EntitlementInvalid(format!("unknown product {}", product_id))
        })?;

        let oracle = self.oracle.as_ref().ok_or_else(|| {
            TrustgateError::EntitlementOracleUnavailable(
                "billing authority credentials not configured".into(),
            )
        })?;
        let active = oracle.verify(product.kind, product_id, purchase_token)?;
        if !active {
            return Err(TrustgateError::EntitlementInvalid(
                "purchase is not active".into(),
            ));
        }

        let subject = if session.is_authenticated {
            Some(session.sub.as_str())
        } else {
            None
        };
        let row = self.ledger.success_row(
            transaction_id,
            device_id,
            subject,
            product_id,
            purchase_token,
        );
        match self.ledger.commit_and_grant(&row, product.tier) {
            CommitOutcome::Committed => Ok(ApiResponse::ok(json!({
                "verified": true,
                "tier": product.tier.as_str(),
                "transactionId": transaction_id,
            }))),
            CommitOutcome::AlreadyProcessed => Err(TrustgateError::DuplicateTransaction {
                transaction_id: transaction_id.to_string(),
            }),
            CommitOutcome::Failed(reason) => Err(TrustgateError::LedgerWriteError(reason)),
        }
    }

    fn require_device_id<'a>(&self, request: &'a ApiRequest) -> Result<&'a str, TrustgateError> {
        request
            .header(HEADER_DEVICE_ID)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| TrustgateError::AuthError("missing device id".into()))
    }

    /// Usage rows are keyed by the authenticated subject when a valid
    /// session is presented, otherwise by device id.
    fn usage_key(&self, request: &ApiRequest) -> Result<String, TrustgateError> {
        if let Some(token) = request.bearer_token() {
            if let Ok(session) = self.sessions.verify_session(token) {
                return Ok(session.sub);
            }
        }
        self.require_device_id(request).map(str::to_string)
    }

    fn check_timestamp(&self, header: Option<&str>) -> Result<(), TrustgateError> {
        let raw = header
            .ok_or_else(|| TrustgateError::AuthError("missing request timestamp".into()))?;
        let stamp: i64 = raw
            .trim()
            .parse()
            .map_err(|_| TrustgateError::AuthError("malformed request timestamp".into()))?;

        let skew = (self.clock.now_millis() - stamp).abs();
        if skew > MAX_TIMESTAMP_SKEW_MILLIS {
            return Err(TrustgateError::AuthError(
                "request timestamp outside tolerance".into(),
            ));
        }
        Ok(())
    }

    fn catalog(&self) -> Result<ProductCatalog, TrustgateError> {
        self.catalog_cache
            .get_or_refresh(self.clock.as_ref(), || (self.catalog_source)())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProductKind;
    use crate::clock::MockClock;
    use crate::store::memory::{
        MemoryCounterStore, MemoryEntitlements, MemoryLedger, MemorySessionStore,
    };
    use crate::gateway::request::GATEWAY_PATH;

    struct AlwaysActiveOracle;

    impl EntitlementOracle for AlwaysActiveOracle {
        fn verify(
            &self,
            _kind: ProductKind,
            _product_id: &str,
            _purchase_token: &str,
        ) -> Result<bool, TrustgateError> {
            Ok(true)
        }
    }

    fn gateway() -> (Gateway, Arc<MockClock>) {
        let clock = Arc::new(MockClock::from_rfc3339("2025-06-01T12:00:00Z"));
        let mut config = TrustgateConfig::new("a-secret-long-enough-for-hmac", "ag-proto-v1");
        config.allowed_origins = vec!["https://app.example.com".to_string()];

        let stores = GatewayStores {
            sessions: Arc::new(MemorySessionStore::new()),
            counters: Arc::new(MemoryCounterStore::new()),
            ledger: Arc::new(MemoryLedger::new()),
            entitlements: Arc::new(MemoryEntitlements::new()),
        };
        let gateway = Gateway::new(config, stores, clock.clone())
            .unwrap()
            .with_oracle(Arc::new(AlwaysActiveOracle));
        (gateway, clock)
    }

    fn handshake(gateway: &Gateway) -> (String, String) {
        let request = ApiRequest::new("POST", GATEWAY_PATH)
            .with_header(HEADER_PROTOCOL_SIGNATURE, "ag-proto-v1")
            .with_header(HEADER_DEVICE_ID, "dev-1")
            .with_json_body(&serde_json::json!({ "type": "session_init" }))
            .unwrap();
        let response = gateway.handle(&request);
        assert_eq!(response.status, 200, "handshake failed: {}", response.body);
        (
            response.body["sessionToken"].as_str().unwrap().to_string(),
            response.body["csrfToken"].as_str().unwrap().to_string(),
        )
    }

    fn purchase_request(
        session: &str,
        csrf: &str,
        timestamp: i64,
        transaction_id: &str,
    ) -> ApiRequest {
        ApiRequest::new("POST", GATEWAY_PATH)
            .with_header(HEADER_DEVICE_ID, "dev-1")
            .with_header("Authorization", format!("Bearer {}", session))
            .with_header(HEADER_CSRF_TOKEN, csrf)
            .with_header(HEADER_TIMESTAMP, timestamp.to_string())
            .with_json_body(&serde_json::json!({
                "type": "verify_purchase",
                "purchaseToken": "ptok",
                "productId": "ag_pro_monthly",
                "transactionId": transaction_id,
            }))
            .unwrap()
    }

    #[test]
    fn preflight_gets_cors_and_security_headers() {
        let (gateway, _clock) = gateway();
        let request =
            ApiRequest::new("OPTIONS", GATEWAY_PATH).with_origin("https://app.example.com");
        let response = gateway.handle(&request);

        assert_eq!(response.status, 200);
        assert_eq!(
            response.header("access-control-allow-origin"),
            Some("https://app.example.com")
        );
        assert_eq!(response.header("x-content-type-options"), Some("nosniff"));
    }

    #[test]
    fn unlisted_origin_rejected_before_anything_else() {
        let (gateway, _clock) = gateway();
        let request = ApiRequest::new("POST", GATEWAY_PATH)
            .with_origin("https://evil.example.com")
            .with_header(HEADER_PROTOCOL_SIGNATURE, "ag-proto-v1")
            .with_header(HEADER_DEVICE_ID, "dev-1")
            .with_json_body(&serde_json::json!({ "type": "session_init" }))
            .unwrap();
        let response = gateway.handle(&request);
        assert_eq!(response.status, 403);
        assert_eq!(response.body["error"], "origin_rejected");
    }

    #[test]
    fn handshake_requires_matching_protocol_signature() {
        let (gateway, _clock) = gateway();
        let request = ApiRequest::new("POST", GATEWAY_PATH)
            .with_header(HEADER_PROTOCOL_SIGNATURE, "wrong")
            .with_header(HEADER_DEVICE_ID, "dev-1")
            .with_json_body(&serde_json::json!({ "type": "session_init" }))
            .unwrap();
        assert_eq!(gateway.handle(&request).status, 401);
    }

    #[test]
    fn handshake_issues_a_usable_pair() {
        let (gateway, _clock) = gateway();
        let (session, _csrf) = handshake(&gateway);
        let claims = gateway.sessions.verify_session(&session).unwrap();
        assert_eq!(claims.sub, "dev-1");
        assert!(!claims.is_authenticated);
        assert_eq!(claims.exp - claims.iat, 3_600_000);
    }

    #[test]
    fn server_time_reports_injected_clock() {
        let (gateway, clock) = gateway();
        let request = ApiRequest::new("POST", GATEWAY_PATH)
            .with_header(HEADER_DEVICE_ID, "dev-1")
            .with_json_body(&serde_json::json!({ "type": "server_time" }))
            .unwrap();
        let response = gateway.handle(&request);
        assert_eq!(response.status, 200);
        assert_eq!(
            response.body["serverTime"].as_i64().unwrap(),
            clock.now_millis()
        );
    }

    #[test]
    fn purchase_happy_path_then_duplicate_conflict() {
        let (gateway, clock) = gateway();
        let (session, csrf) = handshake(&gateway);

        let request = purchase_request(&session, &csrf, clock.now_millis(), "tx-1");
        let response = gateway.handle(&request);
        assert_eq!(response.status, 200, "{}", response.body);
        assert_eq!(response.body["tier"], "pro");

        let replay = gateway.handle(&request);
        assert_eq!(replay.status, 409);
        assert_eq!(replay.body["error"], "duplicate_transaction");
    }

    #[test]
    fn purchase_without_csrf_header_rejected() {
        let (gateway, clock) = gateway();
        let (session, _csrf) = handshake(&gateway);

        let mut request = purchase_request(&session, "x", clock.now_millis(), "tx-1");
        request.headers.remove(HEADER_CSRF_TOKEN);
        let response = gateway.handle(&request);
        assert_eq!(response.status, 403);
        assert_eq!(response.body["error"], "csrf_rejected");
    }

    #[test]
    fn purchase_with_session_token_as_csrf_rejected() {
        let (gateway, clock) = gateway();
        let (session, _csrf) = handshake(&gateway);
        let request = purchase_request(&session, &session, clock.now_millis(), "tx-1");
        assert_eq!(gateway.handle(&request).status, 403);
    }

    #[test]
    fn stale_timestamp_rejected_fresh_boundary_allowed() {
        let (gateway, clock) = gateway();
        let (session, csrf) = handshake(&gateway);

        // Exactly five minutes of skew is still within tolerance.
        let boundary = clock.now_millis() - MAX_TIMESTAMP_SKEW_MILLIS;
        let response = gateway.handle(&purchase_request(&session, &csrf, boundary, "tx-a"));
        assert_eq!(response.status, 200, "{}", response.body);

        let stale = clock.now_millis() - MAX_TIMESTAMP_SKEW_MILLIS - 1;
        let response = gateway.handle(&purchase_request(&session, &csrf, stale, "tx-b"));
        assert_eq!(response.status, 401);
    }

    #[test]
    fn future_timestamp_beyond_tolerance_rejected() {
        let (gateway, clock) = gateway();
        let (session, csrf) = handshake(&gateway);
        let future = clock.now_millis() + MAX_TIMESTAMP_SKEW_MILLIS + 1;
        let response = gateway.handle(&purchase_request(&session, &csrf, future, "tx-1"));
        assert_eq!(response.status, 401);
    }

    #[test]
    fn unknown_product_is_an_entitlement_failure() {
        let (gateway, clock) = gateway();
        let (session, csrf) = handshake(&gateway);
        let request = ApiRequest::new("POST", GATEWAY_PATH)
            .with_header(HEADER_DEVICE_ID, "dev-1")
            .with_header("Authorization", format!("Bearer {}", session))
            .with_header(HEADER_CSRF_TOKEN, csrf)
            .with_header(HEADER_TIMESTAMP, clock.now_millis().to_string())
            .with_json_body(&serde_json::json!({
                "type": "verify_purchase",
                "purchaseToken": "ptok",
                "productId": "ag_unknown",
                "transactionId": "tx-1",
            }))
            .unwrap();
        let response = gateway.handle(&request);
        assert_eq!(response.status, 402);
        assert_eq!(response.body["error"], "entitlement_invalid");
    }

    #[test]
    fn subscription_status_reflects_grant_after_purchase() {
        let (gateway, clock) = gateway();
        let (session, csrf) = handshake(&gateway);
        let status_request = ApiRequest::new("POST", GATEWAY_PATH)
            .with_header(HEADER_DEVICE_ID, "dev-1")
            .with_json_body(&serde_json::json!({ "type": "check_subscription_status" }))
            .unwrap();

        let before = gateway.handle(&status_request);
        assert_eq!(before.body["tier"], "free");
        assert_eq!(before.body["isSubscribed"], false);

        let purchase = purchase_request(&session, &csrf, clock.now_millis(), "tx-1");
        assert_eq!(gateway.handle(&purchase).status, 200);

        let after = gateway.handle(&status_request);
        assert_eq!(after.body["tier"], "pro");
        assert_eq!(after.body["isSubscribed"], true);
    }

    #[test]
    fn usage_sync_is_public_and_device_keyed_without_session() {
        let (gateway, _clock) = gateway();

        let snapshot = serde_json::json!({
            "type": "usage_sync",
            "usage": {
                "operationsToday": 4,
                "aiDocsThisWeek": 1,
                "aiDocsThisMonth": 2,
                "aiPackCredits": 10,
                "lastOperationReset": 1,
                "hasReceivedBonus": true,
            },
        });

        // No session: the write lands under the device key.
        let sync = ApiRequest::new("POST", GATEWAY_PATH)
            .with_header(HEADER_DEVICE_ID, "dev-1")
            .with_json_body(&snapshot)
            .unwrap();
        assert_eq!(gateway.handle(&sync).status, 200);

        let fetch = ApiRequest::new("POST", GATEWAY_PATH)
            .with_header(HEADER_DEVICE_ID, "dev-1")
            .with_json_body(&serde_json::json!({ "type": "usage_fetch" }))
            .unwrap();
        let response = gateway.handle(&fetch);
        assert_eq!(response.status, 200);
        assert_eq!(response.body["usage"]["aiPackCredits"], 10);

        // A different device does not see it.
        let other = ApiRequest::new("POST", GATEWAY_PATH)
            .with_header(HEADER_DEVICE_ID, "dev-2")
            .with_json_body(&serde_json::json!({ "type": "usage_fetch" }))
            .unwrap();
        assert_eq!(gateway.handle(&other).body["usage"]["aiPackCredits"], 0);
    }

    #[test]
    fn usage_sync_without_session_or_device_id_rejected() {
        let (gateway, _clock) = gateway();
        let sync = ApiRequest::new("POST", GATEWAY_PATH)
            .with_json_body(&serde_json::json!({
                "type": "usage_sync",
                "usage": { "operationsToday": 1 },
            }))
            .unwrap();
        assert_eq!(gateway.handle(&sync).status, 401);
    }

    #[test]
    fn non_post_methods_rejected() {
        let (gateway, _clock) = gateway();
        for method in ["GET", "PUT", "DELETE"] {
            let request = ApiRequest::new(method, GATEWAY_PATH)
                .with_header(HEADER_DEVICE_ID, "dev-1")
                .with_json_body(&serde_json::json!({ "type": "server_time" }))
                .unwrap();
            let response = gateway.handle(&request);
            assert_eq!(response.status, 405, "method {}", method);
            assert_eq!(response.body["error"], "method_not_allowed");
        }
    }

    #[test]
    fn global_limit_trips_on_excess_traffic() {
        let (gateway, _clock) = gateway();
        let request = ApiRequest::new("POST", GATEWAY_PATH)
            .with_header(HEADER_DEVICE_ID, "dev-1")
            .with_json_body(&serde_json::json!({ "type": "server_time" }))
            .unwrap();

        for _ in 0..30 {
            assert_eq!(gateway.handle(&request).status, 200);
        }
        let response = gateway.handle(&request);
        assert_eq!(response.status, 429);
        assert!(response.header("retry-after").is_some());
    }
}
