//! External identity-credential verification.
//!
//! At handshake a client may present an identity provider's token to bind
//! the session to a verified identity. The verifier is a seam: production
//! uses the provider's tokeninfo endpoint, tests substitute a fake.

use crate::TrustgateError;
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

/// Identity confirmed by the external provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Stable subject id from the provider.
    pub subject: String,
    /// Verified email, when the provider reports one.
    pub email: Option<String>,
}

/// Verifies identity credentials against an external provider.
pub trait IdentityVerifier: Send + Sync {
    /// Verify a credential; invalid credentials are an auth failure.
    fn verify(&self, credential: &str) -> Result<VerifiedIdentity, TrustgateError>;
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    aud: Option<String>,
}

/// Verifier backed by the provider's tokeninfo endpoint.
pub struct TokenInfoVerifier {
    endpoint: String,
    expected_audience: Option<String>,
    handle: OnceCell<Client>,
}

impl TokenInfoVerifier {
    /// Create a verifier for the given tokeninfo endpoint.
    pub fn new(endpoint: impl Into<String>, expected_audience: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            expected_audience,
            handle: OnceCell::new(),
        }
    }

    fn client(&self) -> Result<&Client, TrustgateError> {
        self.handle.get_or_try_init(|| {
            Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .map_err(|e| {
                    TrustgateError::AuthError(format!("identity client construction failed: {}", e))
                })
        })
    }
}

impl IdentityVerifier for TokenInfoVerifier {
    fn verify(&self, credential: &str) -> Result<VerifiedIdentity, TrustgateError> {
        let response = self
            .client()?
            .get(&self.endpoint)
            .query(&[("id_token", credential)])
            .send()
            .map_err(|e| TrustgateError::AuthError(format!("identity lookup failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(TrustgateError::AuthError(
                "identity credential rejected".into(),
            ));
        }

        let info: TokenInfo = response
            .json()
            .map_err(|e| TrustgateError::AuthError(format!("bad tokeninfo response: {}", e)))?;

        if let Some(expected) = &self.expected_audience {
            if info.aud.as_deref() != Some(expected.as_str()) {
                return Err(TrustgateError::AuthError(
                    "identity credential audience mismatch".into(),
                ));
            }
        }

        Ok(VerifiedIdentity {
            subject: info.sub,
            email: info.email,
        })
    }
}
