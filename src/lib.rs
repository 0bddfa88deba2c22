//! Multi-tenant OAuth 2.0 / OpenID Connect authorization server and
//! forward-auth interceptor.
//!
//! Tenants bring their own credential back-ends as sandboxed provider
//! scripts; the gateway issues signed bearer tokens and decides whether
//! proxied upstream requests are admitted.

#![forbid(unsafe_code)]

pub mod client_info;
pub mod config;
pub mod entities;
pub mod error;
pub mod http;
pub mod jwt;
pub mod keys;
pub mod loaders;
pub mod metrics;
pub mod pkce;
pub mod providers;
pub mod scopes;
pub mod sessions;
pub mod shutdown;
pub mod state;
pub mod templates;

// Re-exports for convenience
pub use config::Config;
pub use error::{ErrorKind, GatewayError};
pub use state::{AppState, SharedState};
