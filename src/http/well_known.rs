//! OpenID Connect discovery and JWKS documents.

use crate::client_info::ClientInfo;
use crate::error::{ErrorKind, GatewayError};
use crate::state::SharedState;
use axum::extract::State;
use axum::http::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct DiscoveryDocument {
    issuer: String,
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
    jwks_uri: String,
    revocation_endpoint: String,
    end_session_endpoint: String,
    response_types_supported: Vec<&'static str>,
    grant_types_supported: Vec<String>,
    token_endpoint_auth_methods_supported: Vec<&'static str>,
    code_challenge_methods_supported: Vec<&'static str>,
    scopes_supported: Vec<String>,
}

/// `GET /.well-known/openid-configuration` — per-tenant metadata.
pub async fn openid_configuration(
    State(state): State<SharedState>,
    Extension(info): Extension<ClientInfo>,
) -> Response {
    let Some(tenant) = info.tenant.as_ref() else {
        return GatewayError::from(ErrorKind::NoTenant).into_response();
    };

    let snapshot = state.entities.snapshot();
    let clients = snapshot.clients_for(&tenant.name);

    let mut grant_types: Vec<String> = Vec::new();
    let mut scopes: Vec<String> = Vec::new();
    for client in clients {
        let grants = client.grant_types.as_deref().unwrap_or(&[
            crate::entities::GrantType::AuthorizationCode,
            crate::entities::GrantType::RefreshToken,
            crate::entities::GrantType::Password,
            crate::entities::GrantType::Device,
            crate::entities::GrantType::Interceptor,
        ]);
        for grant in grants {
            let name = grant.as_str().to_string();
            if !grant_types.contains(&name) {
                grant_types.push(name);
            }
        }
        for scope in &client.scopes {
            if !scopes.contains(scope) {
                scopes.push(scope.clone());
            }
        }
    }

    let base = &info.service_url;
    Json(DiscoveryDocument {
        issuer: base.clone(),
        authorization_endpoint: format!("{base}/authorize"),
        token_endpoint: format!("{base}/token"),
        userinfo_endpoint: format!("{base}/token/info"),
        jwks_uri: format!("{base}/.well-known/jwks.json"),
        revocation_endpoint: format!("{base}/revoke"),
        end_session_endpoint: format!("{base}/logout"),
        response_types_supported: vec!["code"],
        grant_types_supported: grant_types,
        token_endpoint_auth_methods_supported: vec!["client_secret_post", "none"],
        code_challenge_methods_supported: vec!["plain", "S256"],
        scopes_supported: scopes,
    })
    .into_response()
}

/// `GET /.well-known/jwks.json` — the published signing keys.
pub async fn jwks(State(state): State<SharedState>) -> Response {
    let document = state.keys.jwks();
    let mut response = Json(document).into_response();
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );
    response
}
