//! Authorization code and session storage.
//!
//! Sessions are short-lived, TTL-bounded records keyed by `(kind, code)`.
//! Code- and refresh-kind sessions are consume-once: a successful read
//! deletes the entry atomically.

pub mod memory;
pub mod redis;

pub use memory::MemorySessionStore;
pub use redis::RedisSessionStore;

use crate::error::GatewayError;
use crate::jwt::Payload;
use crate::pkce::CodeChallengeMethod;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifetime of a login ticket in seconds.
pub const LOGIN_SESSION_TTL: u64 = 120;

/// Kind of a stored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Single-use authorization code
    Code,
    /// Rotating refresh token
    Refresh,
    /// Device authorization handle
    Device,
    /// Login ticket binding
    Login,
}

impl SessionKind {
    /// Key-scheme segment for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Refresh => "refresh",
            Self::Device => "device",
            Self::Login => "login",
        }
    }

    /// Whether a read consumes the entry.
    #[must_use]
    pub const fn consume_on_read(self) -> bool {
        matches!(self, Self::Code | Self::Refresh)
    }
}

/// A stored auth session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// Session kind
    #[serde(rename = "type")]
    pub kind: SessionKind,
    /// Owning tenant
    pub tenant_name: String,
    /// Authenticated subject
    pub subject: String,
    /// Opaque urlsafe code, unique per `(kind, code)`
    pub code: String,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Claims snapshot tokens are re-issued from
    pub payload: Payload,
    /// Redirect URL the code was bound to
    pub redirect: String,
    /// Lifetime in seconds
    pub ttl: u64,
    /// Unix timestamp of creation
    pub generated: i64,
    /// PKCE challenge, when the flow carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    /// PKCE challenge method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<CodeChallengeMethod>,
    /// Login ticket the session was minted from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_id: Option<Uuid>,
}

impl AuthSession {
    /// Whether the session has outlived its TTL.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.generated + self.ttl as i64
    }

    /// Seconds until expiry, clamped at zero.
    #[must_use]
    pub fn remaining(&self, now: i64) -> u64 {
        (self.generated + self.ttl as i64 - now).max(0) as u64
    }
}

/// A login ticket proving the following authorize redirect originated at
/// our own login page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSession {
    /// Ticket identifier
    pub login_id: Uuid,
    /// Lifetime in seconds
    pub ttl: u64,
    /// Unix timestamp of creation
    pub generated: i64,
}

impl LoginSession {
    /// Create a fresh ticket with the default TTL.
    #[must_use]
    pub fn new() -> Self {
        Self {
            login_id: Uuid::new_v4(),
            ttl: LOGIN_SESSION_TTL,
            generated: Utc::now().timestamp(),
        }
    }

    /// Whether the ticket has outlived its TTL.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.generated + self.ttl as i64
    }
}

impl Default for LoginSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Session store capability set.
///
/// Two variants exist: an in-memory map with a background sweeper and a
/// Redis-backed store using native key expiry.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a session. Fails on a duplicate `(kind, code)`.
    async fn put(&self, session: AuthSession) -> Result<(), GatewayError>;

    /// Fetch a session. Consume-once kinds are deleted on read; expired
    /// entries are never returned.
    async fn get(&self, kind: SessionKind, code: &str) -> Result<Option<AuthSession>, GatewayError>;

    /// Delete a session if present.
    async fn delete(&self, kind: SessionKind, code: &str) -> Result<(), GatewayError>;

    /// Count sessions, optionally restricted to a kind.
    async fn count(&self, kind: Option<SessionKind>) -> Result<usize, GatewayError>;

    /// Count a tenant's sessions, optionally restricted to a kind.
    async fn count_for_tenant(
        &self,
        tenant: &str,
        kind: Option<SessionKind>,
    ) -> Result<usize, GatewayError>;

    /// Delete every session matching `(tenant, subject)`.
    async fn wipe(&self, tenant: &str, subject: &str) -> Result<(), GatewayError>;

    /// Store a login ticket.
    async fn put_login(&self, login: LoginSession) -> Result<(), GatewayError>;

    /// Consume a login ticket; true when it existed and was unexpired.
    async fn consume_login(&self, login_id: Uuid) -> Result<bool, GatewayError>;

    /// Whether the backing store answers round trips.
    async fn healthy(&self) -> bool {
        true
    }
}

/// Generates opaque urlsafe codes.
pub struct CodeGenerator;

const URLSAFE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

impl CodeGenerator {
    /// Generate a code of the given length from the urlsafe alphabet.
    #[must_use]
    pub fn generate(length: usize) -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        (0..length)
            .map(|_| URLSAFE[rng.gen_range(0..URLSAFE.len())] as char)
            .collect()
    }
}
