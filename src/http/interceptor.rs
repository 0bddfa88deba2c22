//! Forward-auth interceptor endpoint.
//!
//! The reverse proxy forwards every upstream request here; the answer is
//! either an admission (200), a redirect to the login page (307), or a
//! rejection.

use crate::client_info::{ClientInfo, RequestMode};
use crate::error::{ErrorKind, GatewayError};
use crate::http::{sso_cookie, with_cookie};
use crate::jwt::Payload;
use crate::metrics;
use crate::state::SharedState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Extension;
use chrono::Utc;
use tracing::debug;

/// `GET /interceptor`
pub async fn interceptor(
    State(state): State<SharedState>,
    Extension(info): Extension<ClientInfo>,
) -> Response {
    admit(&state, &info)
}

/// Fallback route: any path reached in interceptor mode is an admission
/// check; everything else is unknown.
pub async fn fallback(
    State(state): State<SharedState>,
    Extension(info): Extension<ClientInfo>,
) -> Response {
    if info.mode == RequestMode::Interceptor {
        admit(&state, &info)
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

fn admit(state: &SharedState, info: &ClientInfo) -> Response {
    let Some(tenant) = info.tenant.as_ref().filter(|t| t.interceptor.enabled) else {
        metrics::INTERCEPTOR_DECISIONS
            .with_label_values(&["no_tenant"])
            .inc();
        return GatewayError::from(ErrorKind::NoTenant).into_response();
    };

    let Some(payload) = info.valid_payload.as_ref() else {
        metrics::INTERCEPTOR_DECISIONS
            .with_label_values(&["login_redirect"])
            .inc();
        let login_host = tenant
            .interceptor
            .domain
            .clone()
            .unwrap_or_else(|| info.responsible_domain.clone());
        let original = info.requested.to_url();
        let target = format!(
            "{}://{}/login?for={}",
            info.requested.scheme,
            login_host,
            url::form_urlencoded::byte_serialize(original.as_bytes()).collect::<String>()
        );
        debug!(tenant = %tenant.name, "Interceptor redirecting to login");
        return Redirect::temporary(&target).into_response();
    };

    // The cookie must have been minted for this cookie domain; a token
    // replayed from another domain carries the wrong responsibility hash.
    let expected_domain = tenant
        .cookie_or_domain()
        .unwrap_or_else(|| info.responsible_domain.clone());
    if payload.responsibility != Payload::responsibility_for(&expected_domain) {
        metrics::INTERCEPTOR_DECISIONS
            .with_label_values(&["responsibility_mismatch"])
            .inc();
        return GatewayError::from(ErrorKind::TenantMismatch).into_response();
    }

    let now = Utc::now().timestamp();
    let renewed = if payload.remaining(now) < state.config.renew_window.as_secs() as i64 {
        let fresh = payload.reissued(state.config.cookie_expiration);
        match state.signer.sign_for_tenant(&fresh, tenant) {
            Ok(token) => Some(sso_cookie(
                &token,
                &expected_domain,
                state.config.cookie_expiration,
            )),
            Err(e) => {
                tracing::warn!(error = %e, "Cookie renewal failed, admitting without renewal");
                None
            }
        }
    } else {
        None
    };

    metrics::INTERCEPTOR_DECISIONS
        .with_label_values(&["admit"])
        .inc();

    let response = StatusCode::OK.into_response();
    match renewed {
        Some(cookie) => with_cookie(response, cookie),
        None => response,
    }
}
