//! Origin allow-list and browser security headers.
//!
//! An explicit allow-list plus any localhost origin; everything else is
//! rejected in production. Requests without an `Origin` header are
//! server-to-server and pass the check (webhooks carry no origin).

use crate::config::{Environment, TrustgateConfig};
use crate::gateway::request::ApiResponse;
use crate::TrustgateError;

/// Decides which origins may cross the boundary.
pub struct OriginPolicy {
    allowed: Vec<String>,
    environment: Environment,
}

fn is_localhost(origin: &str) -> bool {
    let rest = match origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
    {
        Some(rest) => rest,
        None => return false,
    };
    let host = rest.split(|c| c == ':' || c == '/').next().unwrap_or("");
    host == "localhost" || host == "127.0.0.1" || host == "[::1]"
}

impl OriginPolicy {
    /// Build the policy from config.
    pub fn new(config: &TrustgateConfig) -> Self {
        Self {
            allowed: config.allowed_origins.clone(),
            environment: config.environment,
        }
    }

    /// Whether `origin` is on the allow-list or is a localhost origin.
    pub fn is_allowed(&self, origin: &str) -> bool {
        is_localhost(origin) || self.allowed.iter().any(|a| a == origin)
    }

    /// Gate a request's origin. Absent origins pass; unlisted origins
    /// are rejected in production and tolerated in development.
    pub fn check(&self, origin: Option<&str>) -> Result<(), TrustgateError> {
        match origin {
            None => Ok(()),
            Some(origin) if self.is_allowed(origin) => Ok(()),
            Some(_) if self.environment == Environment::Development => Ok(()),
            Some(_) => Err(TrustgateError::OriginRejected),
        }
    }

    /// Attach CORS and browser security headers to a response.
    pub fn apply_headers(&self, response: &mut ApiResponse, origin: Option<&str>) {
        if let Some(origin) = origin {
            if self.is_allowed(origin) {
                response.push_header("Access-Control-Allow-Origin", origin);
                response.push_header("Vary", "Origin");
            }
        }
        response.push_header("Access-Control-Allow-Methods", "POST, OPTIONS");
        response.push_header(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization, x-ag-signature, x-ag-device-id, x-ag-timestamp, x-csrf-token",
        );
        response.push_header(
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains",
        );
        response.push_header("X-Content-Type-Options", "nosniff");
        response.push_header("X-Frame-Options", "DENY");
    }
}
