//! Ed25519 verification of inbound billing-authority webhooks.
//!
//! Webhooks are server-to-server notifications signed by the authority's
//! private key; verification covers the exact raw request body, so any
//! post-signing alteration fails. Only development deployments without a
//! configured key may skip verification — a configured key is always
//! enforced, and a missing signature fails closed.

use crate::config::{Environment, TrustgateConfig};
use crate::TrustgateError;
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

/// Decode a hex-encoded Ed25519 public key.
pub fn decode_public_key(hex_key: &str) -> Result<VerifyingKey, TrustgateError> {
    let bytes = hex::decode(hex_key)
        .map_err(|e| TrustgateError::ConfigError(format!("Invalid public key hex: {}", e)))?;

    let key_array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| TrustgateError::ConfigError("Public key must be 32 bytes".to_string()))?;

    VerifyingKey::from_bytes(&key_array)
        .map_err(|e| TrustgateError::ConfigError(format!("Invalid Ed25519 public key: {}", e)))
}

/// Verifies asymmetric signatures on inbound webhook bodies.
pub struct WebhookAuthenticator {
    key: Option<VerifyingKey>,
    environment: Environment,
}

impl WebhookAuthenticator {
    /// Build from config, decoding the configured key eagerly so a
    /// malformed key is a startup error rather than a runtime skip.
    pub fn new(config: &TrustgateConfig) -> Result<Self, TrustgateError> {
        let key = config
            .webhook_public_key_hex
            .as_deref()
            .map(decode_public_key)
            .transpose()?;
        Ok(Self {
            key,
            environment: config.environment,
        })
    }

    /// Verify a signature over the exact raw body.
    pub fn verify(
        &self,
        raw_body: &[u8],
        signature_b64: Option<&str>,
    ) -> Result<(), TrustgateError> {
        let key = match &self.key {
            Some(key) => key,
            // Skippable only where no key exists AND we are not in
            // production; never a silent skip elsewhere.
            None if self.environment == Environment::Development => return Ok(()),
            None => {
                return Err(TrustgateError::AuthError(
                    "webhook verification key not configured".into(),
                ))
            }
        };

        let signature_b64 = signature_b64.ok_or_else(|| {
            TrustgateError::AuthError("missing webhook signature".into())
        })?;

        let sig_bytes = STANDARD
            .decode(signature_b64)
            .map_err(|_| TrustgateError::AuthError("malformed webhook signature".into()))?;

        let sig_array: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| TrustgateError::AuthError("malformed webhook signature".into()))?;

        key.verify(raw_body, &Signature::from_bytes(&sig_array))
            .map_err(|_| TrustgateError::AuthError("webhook signature mismatch".into()))
    }
}
