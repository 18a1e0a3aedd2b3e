//! Trustgate configuration.

use std::time::Duration;

/// Deployment environment.
///
/// Production enforces the strict paths (origin rejection, webhook key
/// requirement); development relaxes only what the protocol explicitly
/// allows to be relaxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Strict enforcement of every gate.
    Production,
    /// Local/test deployments without a full credential set.
    Development,
}

/// Credentials for the external billing authority.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Base URL of the billing authority API.
    pub api_base: String,

    /// Application package name the purchases belong to.
    pub package_name: String,

    /// Bearer token for the billing authority.
    pub access_token: String,
}

/// Configuration for the trust boundary.
///
/// Secrets come from the deployment environment, so fields are owned
/// strings rather than statics.
#[derive(Debug, Clone)]
pub struct TrustgateConfig {
    /// Deployment environment.
    pub environment: Environment,

    /// Shared secret for HMAC-signed session and CSRF tokens.
    pub session_secret: String,

    /// Static protocol signature clients present at handshake
    /// (`x-ag-signature` header).
    pub protocol_signature: String,

    /// Origins allowed to receive `Access-Control-Allow-Origin`.
    /// Localhost origins are always allowed in addition to this list.
    pub allowed_origins: Vec<String>,

    /// Ed25519 public key (hex, 64 chars) for webhook verification.
    /// Optional only in development; a configured key is always enforced.
    pub webhook_public_key_hex: Option<String>,

    /// Billing authority credentials. Absent credentials make every
    /// purchase verification fail closed.
    pub oracle: Option<OracleConfig>,

    /// Whether recurring purchases must be acknowledged to count as paid.
    pub require_acknowledgment: bool,

    /// Accept previously issued CSRF tokens that predate the purpose
    /// marker. Newly issued tokens always carry the marker.
    pub allow_legacy_csrf: bool,

    /// Session token lifetime.
    pub session_ttl: Duration,

    /// CSRF token lifetime.
    pub csrf_ttl: Duration,
}

impl TrustgateConfig {
    /// Create a configuration with protocol defaults (one-hour tokens,
    /// production enforcement, acknowledgment required).
    pub fn new(session_secret: impl Into<String>, protocol_signature: impl Into<String>) -> Self {
        Self {
            environment: Environment::Production,
            session_secret: session_secret.into(),
            protocol_signature: protocol_signature.into(),
            allowed_origins: Vec::new(),
            webhook_public_key_hex: None,
            oracle: None,
            require_acknowledgment: true,
            allow_legacy_csrf: false,
            session_ttl: Duration::from_secs(60 * 60),
            csrf_ttl: Duration::from_secs(60 * 60),
        }
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), crate::TrustgateError> {
        if self.session_secret.len() < 16 {
            return Err(crate::TrustgateError::ConfigError(
                "session_secret must be at least 16 bytes".to_string(),
            ));
        }
        if self.protocol_signature.is_empty() {
            return Err(crate::TrustgateError::ConfigError(
                "protocol_signature cannot be empty".to_string(),
            ));
        }
        if let Some(key) = &self.webhook_public_key_hex {
            if key.len() != 64 {
                return Err(crate::TrustgateError::ConfigError(format!(
                    "webhook_public_key_hex must be 64 hex characters, got {}",
                    key.len()
                )));
            }
        }
        if self.session_ttl.is_zero() || self.csrf_ttl.is_zero() {
            return Err(crate::TrustgateError::ConfigError(
                "token lifetimes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
