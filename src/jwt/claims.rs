//! Bearer token claims.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Claims carried by every issued token and SSO cookie.
///
/// `profile` is an opaque JSON object supplied by the tenant's provider
/// script; it is stored and re-emitted verbatim, never validated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payload {
    /// Issuer
    pub iss: String,
    /// Subject
    pub sub: String,
    /// Expiry (unix seconds)
    pub exp: i64,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Audience; the tenant name
    pub aud: String,
    /// Tenant name
    pub tenant: String,
    /// Hash of the responsible domain, checked on interceptor renewal
    pub responsibility: String,
    /// Role assigned by the provider script
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Login name the subject authenticated with
    pub user: String,
    /// Space-joined granted scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Opaque profile object from the provider script
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub profile: serde_json::Value,
}

impl Payload {
    /// Whether the expiry has passed.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.exp <= now
    }

    /// Seconds until expiry, clamped at zero.
    #[must_use]
    pub fn remaining(&self, now: i64) -> i64 {
        (self.exp - now).max(0)
    }

    /// Copy with fresh `iat`/`exp`; everything else is carried over. This is
    /// how access tokens are re-issued from a stored session snapshot.
    #[must_use]
    pub fn reissued(&self, lifetime: Duration) -> Self {
        let now = Utc::now().timestamp();
        Self {
            iat: now,
            exp: now + lifetime.as_secs() as i64,
            ..self.clone()
        }
    }

    /// Copy with the scope claim replaced by the given grant set.
    #[must_use]
    pub fn with_scope(mut self, granted: &[String]) -> Self {
        self.scope = (!granted.is_empty()).then(|| granted.join(" "));
        self
    }

    /// Hash of a responsible domain as stored in `responsibility`.
    #[must_use]
    pub fn responsibility_for(domain: &str) -> String {
        let digest = Sha256::digest(domain.to_ascii_lowercase().as_bytes());
        hex_encode(&digest)
    }

    #[cfg(test)]
    pub(crate) fn empty_for_tests(tenant: &str, subject: &str) -> Self {
        let now = Utc::now().timestamp();
        Self {
            iss: "auth-gateway".to_string(),
            sub: subject.to_string(),
            exp: now + 3600,
            iat: now,
            aud: tenant.to_string(),
            tenant: tenant.to_string(),
            responsibility: Self::responsibility_for("localhost"),
            role: None,
            user: subject.to_string(),
            scope: None,
            profile: serde_json::Value::Null,
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
