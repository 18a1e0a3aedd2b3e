//! HMAC-SHA256 signed token codec.
//!
//! Wire format: `base64(json(claims)) + "." + hex(hmac_sha256(secret, json_bytes))`.
//! The MAC is computed over the exact serialized payload bytes, and
//! verification recomputes it over the exact decoded bytes, so any byte
//! difference invalidates the signature.

use crate::clock::Clock;
use crate::token::claims::Claims;
use crate::TrustgateError;
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies compact signed tokens with a shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The secret never appears in logs or debug output.
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec from the shared signing secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Serialize claims and sign them.
    pub fn issue<T: Serialize>(&self, claims: &T) -> Result<String, TrustgateError> {
        let payload = serde_json::to_vec(claims)
            .map_err(|e| TrustgateError::ConfigError(format!("claims serialization: {}", e)))?;
        let tag = self.sign(&payload)?;
        Ok(format!("{}.{}", STANDARD.encode(&payload), hex::encode(tag)))
    }

    /// Verify a token's signature and expiry, returning its claims.
    ///
    /// Malformed input is an ordinary [`TrustgateError::AuthError`], never
    /// a panic: a forged or truncated token is just another invalid token.
    pub fn verify<T>(&self, token: &str, clock: &dyn Clock) -> Result<T, TrustgateError>
    where
        T: DeserializeOwned + Claims,
    {
        let (payload_b64, signature_hex) = token
            .split_once('.')
            .ok_or_else(|| TrustgateError::AuthError("malformed token".into()))?;

        let payload = STANDARD
            .decode(payload_b64)
            .map_err(|_| TrustgateError::AuthError("malformed token payload".into()))?;

        let provided = hex::decode(signature_hex)
            .map_err(|_| TrustgateError::AuthError("malformed token signature".into()))?;

        let expected = self.sign(&payload)?;

        // Constant-time equality. Unequal lengths reject without scanning
        // any bytes; equal lengths compare every byte unconditionally.
        if expected.ct_eq(provided.as_slice()).unwrap_u8() != 1 {
            return Err(TrustgateError::AuthError("signature mismatch".into()));
        }

        let claims: T = serde_json::from_slice(&payload)
            .map_err(|_| TrustgateError::AuthError("malformed token claims".into()))?;

        if clock.now_millis() > claims.expires_at_millis() {
            return Err(TrustgateError::AuthError("token expired".into()));
        }

        Ok(claims)
    }

    fn sign(&self, payload: &[u8]) -> Result<[u8; 32], TrustgateError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| TrustgateError::ConfigError("invalid HMAC secret".into()))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::token::claims::{CsrfClaims, SessionClaims};
    use std::time::Duration;

    fn codec() -> TokenCodec {
        TokenCodec::new("a-secret-long-enough-for-hmac")
    }

    fn clock() -> MockClock {
        MockClock::from_rfc3339("2025-06-01T12:00:00Z")
    }

    fn session_claims(clock: &MockClock) -> SessionClaims {
        SessionClaims::new("dev-1", false, None, clock, Duration::from_secs(3600))
    }

    #[test]
    fn round_trip_returns_original_claims() {
        let clock = clock();
        let claims = session_claims(&clock);
        let token = codec().issue(&claims).unwrap();
        let decoded: SessionClaims = codec().verify(&token, &clock).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn csrf_round_trip_preserves_marker() {
        let clock = clock();
        let claims = CsrfClaims::new("u1", &clock, Duration::from_secs(3600));
        let token = codec().issue(&claims).unwrap();
        let decoded: CsrfClaims = codec().verify(&token, &clock).unwrap();
        assert!(decoded.has_purpose_marker());
    }

    #[test]
    fn expired_token_rejected() {
        let clock = clock();
        let claims = session_claims(&clock);
        let token = codec().issue(&claims).unwrap();

        clock.advance(chrono::Duration::hours(2));
        let result: Result<SessionClaims, _> = codec().verify(&token, &clock);
        assert!(matches!(result, Err(TrustgateError::AuthError(_))));
    }

    #[test]
    fn single_bit_signature_mutation_rejected() {
        let clock = clock();
        let token = codec().issue(&session_claims(&clock)).unwrap();

        let (payload, sig) = token.split_once('.').unwrap();
        let mut sig_bytes = hex::decode(sig).unwrap();
        for byte_idx in 0..sig_bytes.len() {
            for bit in 0..8 {
                sig_bytes[byte_idx] ^= 1 << bit;
                let mutated = format!("{}.{}", payload, hex::encode(&sig_bytes));
                let result: Result<SessionClaims, _> = codec().verify(&mutated, &clock);
                assert!(result.is_err(), "bit {} of byte {} accepted", bit, byte_idx);
                sig_bytes[byte_idx] ^= 1 << bit;
            }
        }
    }

    #[test]
    fn payload_tampering_rejected() {
        let clock = clock();
        let token = codec().issue(&session_claims(&clock)).unwrap();
        let (_, sig) = token.split_once('.').unwrap();

        // Re-sign nothing: swap in a payload claiming authentication.
        let forged_payload = STANDARD.encode(
            br#"{"sub":"dev-1","is_authenticated":true,"iat":0,"exp":9999999999999,"jti":"x"}"#,
        );
        let forged = format!("{}.{}", forged_payload, sig);
        let result: Result<SessionClaims, _> = codec().verify(&forged, &clock);
        assert!(matches!(result, Err(TrustgateError::AuthError(_))));
    }

    #[test]
    fn truncated_signature_rejected() {
        let clock = clock();
        let token = codec().issue(&session_claims(&clock)).unwrap();
        let (payload, sig) = token.split_once('.').unwrap();
        let truncated = format!("{}.{}", payload, &sig[..sig.len() - 2]);
        let result: Result<SessionClaims, _> = codec().verify(&truncated, &clock);
        assert!(result.is_err());
    }

    #[test]
    fn malformed_inputs_are_invalid_not_panics() {
        let clock = clock();
        for garbage in ["", ".", "no-dot", "!!!.abc", "YQ==.zz", "YQ==."] {
            let result: Result<SessionClaims, _> = codec().verify(garbage, &clock);
            assert!(result.is_err(), "accepted {:?}", garbage);
        }
    }

    #[test]
    fn different_secret_rejects() {
        let clock = clock();
        let token = codec().issue(&session_claims(&clock)).unwrap();
        let other = TokenCodec::new("another-secret-entirely-here");
        let result: Result<SessionClaims, _> = other.verify(&token, &clock);
        assert!(matches!(result, Err(TrustgateError::AuthError(_))));
    }
}
