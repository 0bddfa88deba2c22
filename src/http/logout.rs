//! Logout: rendered page, finalize, session wipe.

use crate::client_info::{cookie_value, ClientInfo, SSO_COOKIE};
use crate::http::{expired_sso_cookie, html_headers, with_cookie};
use crate::state::SharedState;
use crate::templates::{Page, PageContext};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Extension;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct LogoutQuery {
    location: Option<String>,
}

/// `GET /logout` — renders a page that auto-redirects to finalize.
pub async fn logout_page(
    State(state): State<SharedState>,
    Extension(info): Extension<ClientInfo>,
    Query(query): Query<LogoutQuery>,
) -> Response {
    let location = query.location.unwrap_or_else(|| "/".to_string());
    let target = format!(
        "/logout/finalize?location={}",
        url::form_urlencoded::byte_serialize(location.as_bytes()).collect::<String>()
    );
    let context = PageContext {
        location: target,
        error: None,
    };
    match state
        .templates
        .render(info.tenant.as_ref(), Page::Logout, &context)
    {
        Ok(body) => (html_headers(), body).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `GET /logout/finalize` and `POST /logout` — wipe sessions, expire the
/// cookie, and send the browser on.
pub async fn finalize(
    State(state): State<SharedState>,
    Extension(info): Extension<ClientInfo>,
    headers: HeaderMap,
    Query(query): Query<LogoutQuery>,
) -> Response {
    // Even an expired cookie identifies whose sessions to wipe.
    let payload = info.valid_payload.clone().or_else(|| {
        cookie_value(&headers, SSO_COOKIE)
            .and_then(|token| state.signer.verify_allow_expired(&token).ok())
            .map(|(payload, _)| payload)
    });

    if let Some(payload) = payload {
        if let Err(e) = state.sessions.wipe(&payload.tenant, &payload.sub).await {
            tracing::warn!(error = %e, "Session wipe failed during logout");
        }
        info!(tenant = %payload.tenant, subject = %payload.sub, "Logged out");
    }

    let location = query.location.unwrap_or_else(|| "/".to_string());
    let cookie = expired_sso_cookie(&info.responsible_domain);
    with_cookie(Redirect::to(&location).into_response(), cookie)
}
