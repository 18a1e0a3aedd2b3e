//! Session and CSRF claim payloads.
//!
//! Timestamps are UTC epoch milliseconds to match the wire protocol
//! (`x-ag-timestamp` and client-side expiry checks use the same unit).

use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Purpose marker distinguishing CSRF tokens from session tokens.
pub const CSRF_PURPOSE: &str = "csrf";

/// Claims carried by a token, enough for the codec to enforce expiry.
pub trait Claims {
    /// Expiry as UTC epoch milliseconds.
    fn expires_at_millis(&self) -> i64;

    /// Unique token id.
    fn token_id(&self) -> &str;
}

/// Payload of a session token: an identity for up to one hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject id: device id, or verified identity id when authenticated.
    pub sub: String,

    /// Whether the subject proved an external identity at handshake.
    pub is_authenticated: bool,

    /// Verified email, when an identity credential was presented.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Issued-at, epoch milliseconds.
    pub iat: i64,

    /// Expires-at, epoch milliseconds.
    pub exp: i64,

    /// Unique token id.
    pub jti: String,
}

impl SessionClaims {
    /// Create claims expiring `ttl` from now with a fresh jti.
    pub fn new(
        sub: impl Into<String>,
        is_authenticated: bool,
        email: Option<String>,
        clock: &dyn Clock,
        ttl: Duration,
    ) -> Self {
        let now = clock.now_millis();
        Self {
            sub: sub.into(),
            is_authenticated,
            email,
            iat: now,
            exp: now + ttl.as_millis() as i64,
            jti: Uuid::new_v4().to_string(),
        }
    }
}

impl Claims for SessionClaims {
    fn expires_at_millis(&self) -> i64 {
        self.exp
    }

    fn token_id(&self) -> &str {
        &self.jti
    }
}

/// Payload of a CSRF token: proof of a fresh server-issued grant, bound
/// to the session's subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfClaims {
    /// Subject id; must match the session token's subject.
    pub sub: String,

    /// Purpose marker. Absent only on tokens issued before the marker
    /// existed; new tokens always carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    /// Issued-at, epoch milliseconds.
    pub iat: i64,

    /// Expires-at, epoch milliseconds.
    pub exp: i64,

    /// Unique token id.
    pub jti: String,
}

impl CsrfClaims {
    /// Create claims expiring `ttl` from now, always with the purpose marker.
    pub fn new(sub: impl Into<String>, clock: &dyn Clock, ttl: Duration) -> Self {
        let now = clock.now_millis();
        Self {
            sub: sub.into(),
            purpose: Some(CSRF_PURPOSE.to_string()),
            iat: now,
            exp: now + ttl.as_millis() as i64,
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Whether this token carries the CSRF purpose marker.
    pub fn has_purpose_marker(&self) -> bool {
        self.purpose.as_deref() == Some(CSRF_PURPOSE)
    }
}

impl Claims for CsrfClaims {
    fn expires_at_millis(&self) -> i64 {
        self.exp
    }

    fn token_id(&self) -> &str {
        &self.jti
    }
}
