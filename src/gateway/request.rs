//! Wire-level request and response types.
//!
//! The gateway is transport-agnostic: an HTTP front end maps its request
//! into [`ApiRequest`] (raw body bytes preserved for webhook signature
//! verification) and maps [`ApiResponse`] back out.

use crate::store::UsageSnapshot;
use crate::TrustgateError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Static protocol signature presented at handshake.
pub const HEADER_PROTOCOL_SIGNATURE: &str = "x-ag-signature";
/// Stable device identifier chosen by the client.
pub const HEADER_DEVICE_ID: &str = "x-ag-device-id";
/// CSRF token on state-changing requests.
pub const HEADER_CSRF_TOKEN: &str = "x-csrf-token";
/// Client-stamped epoch-millis timestamp on purchase requests.
pub const HEADER_TIMESTAMP: &str = "x-ag-timestamp";
/// Bearer session token.
pub const HEADER_AUTHORIZATION: &str = "authorization";
/// Base64 Ed25519 signature on webhook bodies.
pub const HEADER_WEBHOOK_SIGNATURE: &str = "x-webhook-signature";

/// Path serving the client-facing protocol routes.
pub const GATEWAY_PATH: &str = "/api/gateway";
/// Path receiving billing-authority webhooks.
pub const WEBHOOK_PATH: &str = "/api/billing-events";

/// A request as seen at the trust boundary.
///
/// Header names are stored lowercase; `body` keeps the exact bytes so
/// signature checks cover what was actually received.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method, uppercase.
    pub method: String,
    /// Request path.
    pub path: String,
    /// `Origin` header, when the request came from a browser context.
    pub origin: Option<String>,
    /// Remaining headers, lowercase names.
    pub headers: HashMap<String, String>,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl ApiRequest {
    /// A bodyless request for `method` and `path`.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            path: path.into(),
            origin: None,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Set the `Origin` header.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Set a header (name lowercased).
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_lowercase(), value.into());
        self
    }

    /// Serialize `body` as the JSON request body.
    pub fn with_json_body<T: serde::Serialize>(
        mut self,
        body: &T,
    ) -> Result<Self, TrustgateError> {
        self.body = serde_json::to_vec(body)
            .map_err(|e| TrustgateError::ConfigError(format!("body serialization: {}", e)))?;
        Ok(self)
    }

    /// Fetch a header by lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// The bearer token from `Authorization`, if present.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header(HEADER_AUTHORIZATION)
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Client-facing route bodies, discriminated by the `type` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestBody {
    /// Handshake: exchange the static signature for a token pair.
    #[serde(rename_all = "camelCase")]
    SessionInit {
        /// Optional identity-provider credential.
        #[serde(default)]
        id_token: Option<String>,
    },

    /// Authoritative epoch-millis time for client skew correction.
    ServerTime,

    /// Currently granted tier for this device or identity.
    CheckSubscriptionStatus,

    /// Read the synced usage snapshot.
    UsageFetch,

    /// Overwrite the synced usage snapshot.
    #[serde(rename_all = "camelCase")]
    UsageSync {
        /// The snapshot to store.
        usage: UsageSnapshot,
    },

    /// Verify a purchase with the billing authority and grant.
    #[serde(rename_all = "camelCase")]
    VerifyPurchase {
        /// Opaque purchase token from the store client.
        purchase_token: String,
        /// Store product id.
        product_id: String,
        /// Caller-supplied unique transaction id.
        transaction_id: String,
    },
}

impl RequestBody {
    /// Parse a request body; malformed JSON is an ordinary auth failure.
    pub fn parse(raw: &[u8]) -> Result<Self, TrustgateError> {
        serde_json::from_slice(raw)
            .map_err(|e| TrustgateError::AuthError(format!("malformed request body: {}", e)))
    }
}

/// Billing-authority webhook body, parsed only after signature
/// verification passes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingEvent {
    /// Event name, e.g. `subscription_canceled`.
    pub event: String,
    /// Transaction the event refers to, when applicable.
    #[serde(default)]
    pub transaction_id: Option<String>,
}

/// Response handed back to the transport layer.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers in insertion order.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: Value,
}

impl ApiResponse {
    /// A 200 response with the given body.
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }

    /// Map an error to its wire form: status, stable code, details, and
    /// a `Retry-After` hint where the error is retryable.
    pub fn from_error(error: &TrustgateError) -> Self {
        let mut headers = Vec::new();
        if let Some(secs) = error.retry_after() {
            headers.push(("Retry-After".to_string(), secs.to_string()));
        }
        Self {
            status: error.status(),
            headers,
            body: json!({
                "error": error.code(),
                "details": error.to_string(),
            }),
        }
    }

    /// Append a header.
    pub fn push_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// First value of a header, by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
