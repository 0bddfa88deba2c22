//! Token endpoint: grant exchange, introspection, revocation.

use crate::client_info::ClientInfo;
use crate::entities::{Client, GrantType, Tenant};
use crate::error::{ErrorKind, GatewayError};
use crate::jwt::Payload;
use crate::metrics;
use crate::pkce;
use crate::providers::{
    login::run_login, validation::run_validation, Credentials, ProviderHost, ValidationArgs,
};
use crate::scopes;
use crate::sessions::{AuthSession, CodeGenerator, SessionKind};
use crate::state::SharedState;
use axum::extract::{FromRequest, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Form, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use uuid::Uuid;

const DEVICE_TTL: u64 = 600;
const DEVICE_POLL_INTERVAL: u64 = 5;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    grant_type: String,
    client_id: Option<Uuid>,
    client_secret: Option<String>,
    code: Option<String>,
    code_verifier: Option<String>,
    code_challenge_method: Option<String>,
    refresh_token: Option<String>,
    username: Option<String>,
    password: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    token_type: &'static str,
    expires_in: u64,
    scope: String,
}

#[derive(Debug, Serialize)]
struct DeviceResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: u64,
    interval: u64,
}

/// `POST /token` — accepts JSON or form bodies, discriminated by
/// `grant_type`.
pub async fn token(
    State(state): State<SharedState>,
    Extension(info): Extension<ClientInfo>,
    request: Request,
) -> Response {
    let body = match decode_request(request).await {
        Ok(body) => body,
        Err(kind) => return GatewayError::from(kind).into_response(),
    };

    match body.grant_type.as_str() {
        "authorization_code" => authorization_code_grant(&state, &body).await,
        "refresh_token" => refresh_grant(&state, &body).await,
        "password" => password_grant(&state, &info, &body).await,
        "device" => device_grant(&state, &info).await,
        _ => GatewayError::from(ErrorKind::UnsupportedGrantType).into_response(),
    }
}

async fn decode_request(request: Request) -> Result<TokenRequest, ErrorKind> {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    if is_json {
        Json::<TokenRequest>::from_request(request, &())
            .await
            .map(|Json(body)| body)
            .map_err(|_| ErrorKind::NotAcceptableRequest)
    } else {
        Form::<TokenRequest>::from_request(request, &())
            .await
            .map(|Form(body)| body)
            .map_err(|_| ErrorKind::NotAcceptableRequest)
    }
}

async fn authorization_code_grant(state: &SharedState, body: &TokenRequest) -> Response {
    let snapshot = state.entities.snapshot();

    let Some(client) = body
        .client_id
        .and_then(|ident| snapshot.find_client_by_ident(ident).cloned())
    else {
        return GatewayError::from(ErrorKind::NoClient).into_response();
    };
    if let Err(e) = check_client_secret(&client, body.client_secret.as_deref()) {
        return e.into_response();
    }
    if !client.allows_grant(GrantType::AuthorizationCode) {
        return GatewayError::from(ErrorKind::UnsupportedGrantType).into_response();
    }

    let Some(code) = body.code.as_deref() else {
        return GatewayError::from(ErrorKind::NotAcceptableRequest).into_response();
    };
    let session = match state.sessions.get(SessionKind::Code, code).await {
        Ok(Some(session)) => session,
        Ok(None) => return GatewayError::from(ErrorKind::Invalidate).into_response(),
        Err(e) => return e.into_response(),
    };

    if let Some(challenge) = &session.code_challenge {
        let stored_method = session
            .code_challenge_method
            .unwrap_or(pkce::CodeChallengeMethod::Plain);
        let presented_method = body
            .code_challenge_method
            .as_deref()
            .and_then(pkce::CodeChallengeMethod::parse);
        if presented_method.is_some_and(|m| m != stored_method) {
            return GatewayError::from(ErrorKind::Invalidate).into_response();
        }
        let Some(verifier) = body.code_verifier.as_deref() else {
            return GatewayError::from(ErrorKind::Invalidate).into_response();
        };
        if !pkce::verify(stored_method, challenge, verifier) {
            return GatewayError::from(ErrorKind::Invalidate).into_response();
        }
    }

    if client.tenant_name != session.tenant_name {
        warn!(
            client = %client.name,
            session_tenant = %session.tenant_name,
            "Cross-tenant code exchange rejected"
        );
        return GatewayError::from(ErrorKind::TenantMismatch).into_response();
    }

    let Some(tenant) = snapshot.find_tenant_by_name(&session.tenant_name).cloned() else {
        return GatewayError::from(ErrorKind::NoTenant).into_response();
    };

    issue_tokens(state, &tenant, &session, true, "authorization_code").await
}

async fn refresh_grant(state: &SharedState, body: &TokenRequest) -> Response {
    let Some(refresh_token) = body.refresh_token.as_deref() else {
        return GatewayError::from(ErrorKind::NotAcceptableRequest).into_response();
    };
    let session = match state.sessions.get(SessionKind::Refresh, refresh_token).await {
        Ok(Some(session)) => session,
        Ok(None) => return GatewayError::from(ErrorKind::Invalidate).into_response(),
        Err(e) => return e.into_response(),
    };

    let snapshot = state.entities.snapshot();
    if let Some(client) = body
        .client_id
        .and_then(|ident| snapshot.find_client_by_ident(ident).cloned())
    {
        if let Err(e) = check_client_secret(&client, body.client_secret.as_deref()) {
            return e.into_response();
        }
        if client.tenant_name != session.tenant_name {
            return GatewayError::from(ErrorKind::TenantMismatch).into_response();
        }
    }

    let Some(tenant) = snapshot.find_tenant_by_name(&session.tenant_name).cloned() else {
        return GatewayError::from(ErrorKind::NoTenant).into_response();
    };

    let valid = if ProviderHost::tenant_has_providers(&tenant) {
        let args = ValidationArgs {
            username: session.payload.user.clone(),
            subject: session.subject.clone(),
        };
        match run_validation(&state.providers, &tenant, &args).await {
            Ok(valid) => valid,
            Err(e) => {
                warn!(tenant = %tenant.name, error = %e, "Validation provider failed");
                false
            }
        }
    } else {
        // Without a validation provider the refresh is only honored
        // outside production.
        !state.config.environment.is_production()
    };
    if !valid {
        metrics::TOKENS_ISSUED
            .with_label_values(&["refresh_token", "denied"])
            .inc();
        return GatewayError::from(ErrorKind::Invalidate).into_response();
    }

    issue_tokens(state, &tenant, &session, true, "refresh_token").await
}

async fn password_grant(state: &SharedState, info: &ClientInfo, body: &TokenRequest) -> Response {
    let Some(tenant) = info.tenant.clone() else {
        return GatewayError::from(ErrorKind::NoTenant).into_response();
    };
    let (Some(username), Some(password)) = (body.username.clone(), body.password.clone()) else {
        return GatewayError::from(ErrorKind::NotAcceptableRequest).into_response();
    };

    if !ProviderHost::tenant_has_providers(&tenant) {
        return GatewayError::from(ErrorKind::WrongCredentials).into_response();
    }

    let credentials = Credentials { username: username.clone(), password };
    let attempt = match run_login(&state.providers, &tenant, &credentials).await {
        Ok(attempt) if attempt.can_login => attempt,
        Ok(_) => return GatewayError::from(ErrorKind::WrongCredentials).into_response(),
        Err(e) => {
            warn!(tenant = %tenant.name, error = %e, "Login provider failed");
            return GatewayError::from(ErrorKind::WrongCredentials).into_response();
        }
    };

    let requested = body.scope.as_deref().map(scopes::split).unwrap_or_default();
    let granted = match &info.client {
        Some(client) => scopes::granted(client, &requested, &attempt.scopes),
        None => requested,
    };

    let now = Utc::now().timestamp();
    let subject = attempt.subject.unwrap_or_else(|| username.clone());
    let payload = Payload {
        iss: info.service_url.clone(),
        sub: subject,
        exp: now + state.config.token_expiration.as_secs() as i64,
        iat: now,
        aud: tenant.name.clone(),
        tenant: tenant.name.clone(),
        responsibility: Payload::responsibility_for(&info.responsible_domain),
        role: attempt.role,
        user: username,
        scope: (!granted.is_empty()).then(|| scopes::join(&granted)),
        profile: attempt.profile,
    };

    let access_token = match state.signer.sign_for_tenant(&payload, &tenant) {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };

    metrics::TOKENS_ISSUED
        .with_label_values(&[
            "password",
            tenant
                .effective_algorithm(state.config.default_algorithm)
                .as_str(),
        ])
        .inc();

    Json(TokenResponse {
        access_token,
        refresh_token: None,
        token_type: "Bearer",
        expires_in: state.config.token_expiration.as_secs(),
        scope: scopes::join(&granted),
    })
    .into_response()
}

async fn device_grant(state: &SharedState, info: &ClientInfo) -> Response {
    let Some(tenant) = info.tenant.clone() else {
        return GatewayError::from(ErrorKind::NoTenant).into_response();
    };

    let device_code = CodeGenerator::generate(state.config.token_length * 2);
    let user_code = CodeGenerator::generate(8);
    let now = Utc::now().timestamp();

    let session = AuthSession {
        kind: SessionKind::Device,
        tenant_name: tenant.name.clone(),
        subject: String::new(),
        code: device_code.clone(),
        scopes: Vec::new(),
        payload: Payload {
            iss: info.service_url.clone(),
            sub: String::new(),
            exp: now + DEVICE_TTL as i64,
            iat: now,
            aud: tenant.name.clone(),
            tenant: tenant.name.clone(),
            responsibility: Payload::responsibility_for(&info.responsible_domain),
            role: None,
            user: String::new(),
            scope: None,
            profile: serde_json::Value::Null,
        },
        redirect: String::new(),
        ttl: DEVICE_TTL,
        generated: now,
        code_challenge: None,
        code_challenge_method: None,
        login_id: None,
    };
    if let Err(e) = state.sessions.put(session).await {
        return e.into_response();
    }

    Json(DeviceResponse {
        device_code,
        user_code,
        verification_uri: format!("{}/device", info.service_url),
        expires_in: DEVICE_TTL,
        interval: DEVICE_POLL_INTERVAL,
    })
    .into_response()
}

/// Issue an access token (and optionally a rotated refresh token) from a
/// stored session snapshot.
async fn issue_tokens(
    state: &SharedState,
    tenant: &Tenant,
    session: &AuthSession,
    with_refresh: bool,
    grant: &'static str,
) -> Response {
    let payload = session
        .payload
        .reissued(state.config.token_expiration)
        .with_scope(&session.scopes);

    let access_token = match state.signer.sign_for_tenant(&payload, tenant) {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };

    let refresh_token = if with_refresh {
        let code = CodeGenerator::generate(state.config.token_length);
        let refresh_session = AuthSession {
            kind: SessionKind::Refresh,
            tenant_name: session.tenant_name.clone(),
            subject: session.subject.clone(),
            code: code.clone(),
            scopes: session.scopes.clone(),
            payload: session.payload.clone(),
            redirect: session.redirect.clone(),
            ttl: state.config.refresh_expiration.as_secs(),
            generated: Utc::now().timestamp(),
            code_challenge: None,
            code_challenge_method: None,
            login_id: None,
        };
        if let Err(e) = state.sessions.put(refresh_session).await {
            return e.into_response();
        }
        Some(code)
    } else {
        None
    };

    metrics::TOKENS_ISSUED
        .with_label_values(&[
            grant,
            tenant
                .effective_algorithm(state.config.default_algorithm)
                .as_str(),
        ])
        .inc();
    debug!(tenant = %tenant.name, grant, "Issued tokens");

    Json(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer",
        expires_in: state.config.token_expiration.as_secs(),
        scope: scopes::join(&session.scopes),
    })
    .into_response()
}

fn check_client_secret(client: &Client, presented: Option<&str>) -> Result<(), GatewayError> {
    match &client.secret {
        None => Ok(()),
        Some(expected) => {
            let matches = presented.is_some_and(|presented| {
                bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
            });
            if matches {
                Ok(())
            } else {
                Err(ErrorKind::WrongClientSecret.into())
            }
        }
    }
}

/// `GET /token/info` — verify the bearer token and return its profile.
pub async fn token_info(
    State(state): State<SharedState>,
    request: Request,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let Some(token) = token else {
        return GatewayError::from(ErrorKind::InvalidToken).into_response();
    };

    match state.signer.verify(token) {
        Ok(payload) => Json(payload.profile).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    token: String,
    #[allow(dead_code)]
    token_type_hint: Option<String>,
}

/// `POST /revoke` (RFC 7009) — always 200.
pub async fn revoke(State(state): State<SharedState>, request: Request) -> Response {
    let Ok(body) = decode_revoke(request).await else {
        return (StatusCode::OK, Json(serde_json::json!({}))).into_response();
    };

    // Consuming the refresh session is the revocation.
    match state.sessions.get(SessionKind::Refresh, &body.token).await {
        Ok(Some(session)) => {
            debug!(tenant = %session.tenant_name, "Refresh token revoked");
        }
        _ => {
            // Not a refresh token; try it as an access token and wipe the
            // subject's sessions.
            if let Ok((payload, _)) = state.signer.verify_allow_expired(&body.token) {
                if let Err(e) = state.sessions.wipe(&payload.tenant, &payload.sub).await {
                    warn!(error = %e, "Session wipe failed during revocation");
                }
            }
        }
    }

    (StatusCode::OK, Json(serde_json::json!({}))).into_response()
}

async fn decode_revoke(request: Request) -> Result<RevokeRequest, ()> {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if is_json {
        Json::<RevokeRequest>::from_request(request, &())
            .await
            .map(|Json(body)| body)
            .map_err(|_| ())
    } else {
        Form::<RevokeRequest>::from_request(request, &())
            .await
            .map(|Form(body)| body)
            .map_err(|_| ())
    }
}
