//! Session issuance and verification.
//!
//! A session token is accepted only when its signature verifies, it is
//! unexpired, and its jti is still registered server-side. The store
//! lookup closes the gap signature-only sessions leave open: a token that
//! looks valid but was invalidated by a backend-state change. A store
//! outage therefore fails the verification — never the other way around.

use crate::clock::Clock;
use crate::config::TrustgateConfig;
use crate::store::{SessionRecord, SessionStore};
use crate::token::claims::{CsrfClaims, SessionClaims};
use crate::token::codec::TokenCodec;
use crate::TrustgateError;
use chrono::TimeZone;
use std::sync::Arc;
use std::time::Duration;

/// Session + CSRF token pair issued at handshake.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    /// The signed session token.
    pub session_token: String,
    /// The signed CSRF token bound to the same subject.
    pub csrf_token: String,
    /// Claims inside the session token.
    pub claims: SessionClaims,
}

/// Issues and verifies session and CSRF tokens.
pub struct SessionManager {
    codec: TokenCodec,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    session_ttl: Duration,
    csrf_ttl: Duration,
    allow_legacy_csrf: bool,
}

impl SessionManager {
    /// Create a manager from config plus the revocation store and clock.
    pub fn new(
        config: &TrustgateConfig,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            codec: TokenCodec::new(&config.session_secret),
            store,
            clock,
            session_ttl: config.session_ttl,
            csrf_ttl: config.csrf_ttl,
            allow_legacy_csrf: config.allow_legacy_csrf,
        }
    }

    /// Issue a session + CSRF pair for a subject and register the session.
    pub fn issue_pair(
        &self,
        subject: &str,
        is_authenticated: bool,
        email: Option<String>,
        device_id: &str,
    ) -> Result<IssuedTokens, TrustgateError> {
        let claims = SessionClaims::new(
            subject,
            is_authenticated,
            email,
            self.clock.as_ref(),
            self.session_ttl,
        );
        let csrf_claims = CsrfClaims::new(subject, self.clock.as_ref(), self.csrf_ttl);

        let session_token = self.codec.issue(&claims)?;
        let csrf_token = self.codec.issue(&csrf_claims)?;

        let expires_at = chrono::Utc
            .timestamp_millis_opt(claims.exp)
            .single()
            .ok_or_else(|| TrustgateError::ConfigError("session expiry out of range".into()))?;

        self.store
            .register(&SessionRecord {
                jti: claims.jti.clone(),
                subject_id: subject.to_string(),
                device_id: device_id.to_string(),
                expires_at,
            })
            .map_err(|e| TrustgateError::AuthError(format!("session registration failed: {}", e)))?;

        Ok(IssuedTokens {
            session_token,
            csrf_token,
            claims,
        })
    }

    /// Verify a session token: signature, expiry, and registration.
    pub fn verify_session(&self, token: &str) -> Result<SessionClaims, TrustgateError> {
        let claims: SessionClaims = self.codec.verify(token, self.clock.as_ref())?;

        // Fail closed: an unreachable store means unverified, not trusted.
        let registered = self
            .store
            .is_registered(&claims.jti, self.clock.now_utc())
            .map_err(|e| TrustgateError::AuthError(format!("session store unavailable: {}", e)))?;

        if !registered {
            return Err(TrustgateError::AuthError("session not registered".into()));
        }

        Ok(claims)
    }

    /// Verify a CSRF token against the session's subject.
    pub fn verify_csrf(
        &self,
        token: &str,
        session_subject: &str,
    ) -> Result<CsrfClaims, TrustgateError> {
        let claims: CsrfClaims = self
            .codec
            .verify(token, self.clock.as_ref())
            .map_err(|_| TrustgateError::CsrfRejected("invalid CSRF token".into()))?;

        if !claims.has_purpose_marker() && !self.allow_legacy_csrf {
            return Err(TrustgateError::CsrfRejected(
                "CSRF token missing purpose marker".into(),
            ));
        }

        if claims.sub != session_subject {
            return Err(TrustgateError::CsrfRejected(
                "CSRF token subject mismatch".into(),
            ));
        }

        Ok(claims)
    }

    /// The codec, for components that issue tokens directly in tests.
    #[cfg(any(test, feature = "test-seams"))]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }
}
