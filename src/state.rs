//! Shared application state.
//!
//! Built once at startup and handed to every handler; no process-wide
//! mutable statics.

use crate::config::Config;
use crate::entities::EntityStore;
use crate::jwt::TokenSigner;
use crate::keys::KeyManager;
use crate::providers::ProviderHost;
use crate::sessions::SessionStore;
use crate::templates::TemplateRenderer;
use std::sync::Arc;

/// Everything request handlers need.
pub struct AppState {
    /// Validated configuration
    pub config: Config,
    /// Tenant/client store
    pub entities: Arc<EntityStore>,
    /// Auth code and session store
    pub sessions: Arc<dyn SessionStore>,
    /// Key ring lifecycle
    pub keys: Arc<KeyManager>,
    /// Token signing and verification
    pub signer: Arc<TokenSigner>,
    /// Provider script host
    pub providers: Arc<ProviderHost>,
    /// Page renderer
    pub templates: Arc<dyn TemplateRenderer>,
}

/// Shared handle used as the axum state.
pub type SharedState = Arc<AppState>;
