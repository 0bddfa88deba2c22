//! HTTP surface: routing, cookies, content negotiation.

pub mod authorize;
pub mod interceptor;
pub mod login;
pub mod logout;
pub mod token;
pub mod well_known;

use crate::client_info::{self, ClientInfo, SSO_COOKIE};
use crate::error::ErrorKind;
use crate::state::SharedState;
use crate::templates::{Page, PageContext};
use axum::http::header::{HeaderValue, ACCEPT, CONTENT_TYPE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Assemble the full router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/authorize", get(authorize::authorize))
        .route("/login", get(login::login_form).post(login::login))
        .route("/logout", get(logout::logout_page).post(logout::finalize))
        .route("/logout/finalize", get(logout::finalize))
        .route("/token", post(token::token))
        .route("/token/info", get(token::token_info))
        .route("/revoke", post(token::revoke))
        .route("/interceptor", get(interceptor::interceptor))
        .route(
            "/.well-known/openid-configuration",
            get(well_known::openid_configuration),
        )
        .route("/.well-known/jwks.json", get(well_known::jwks))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .fallback(interceptor::fallback)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            client_info::middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ready(axum::extract::State(state): axum::extract::State<SharedState>) -> Response {
    if state.sessions.healthy().await {
        (StatusCode::OK, Json(serde_json::json!({ "ready": true }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "ready": false })),
        )
            .into_response()
    }
}

/// Whether the request prefers an HTML rendition.
#[must_use]
pub fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

/// Error response honoring content negotiation: HTML-accepting clients get
/// the rendered error page, everyone else machine-readable JSON.
#[must_use]
pub fn negotiated_error(
    state: &SharedState,
    info: Option<&ClientInfo>,
    headers: &HeaderMap,
    kind: ErrorKind,
) -> Response {
    if wants_html(headers) {
        let context = PageContext {
            location: String::new(),
            error: Some(kind.token()),
        };
        let tenant = info.and_then(|i| i.tenant.as_ref());
        if let Ok(body) = state.templates.render(tenant, Page::Error, &context) {
            return (kind.status(), html_headers(), body).into_response();
        }
    }
    (
        kind.status(),
        Json(serde_json::json!({ "error": true, "reason": kind.token() })),
    )
        .into_response()
}

/// Headers for an HTML page response.
#[must_use]
pub fn html_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    headers
}

/// Set-Cookie value for a fresh SSO cookie.
#[must_use]
pub fn sso_cookie(token: &str, domain: &str, max_age: Duration) -> HeaderValue {
    let value = format!(
        "{SSO_COOKIE}={token}; Domain={domain}; Path=/; Max-Age={}; Secure; HttpOnly; SameSite=Strict",
        max_age.as_secs()
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Set-Cookie value invalidating the SSO cookie.
#[must_use]
pub fn expired_sso_cookie(domain: &str) -> HeaderValue {
    let value = format!(
        "{SSO_COOKIE}=invalid; Domain={domain}; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Secure; HttpOnly; SameSite=Strict"
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Attach a Set-Cookie header to a response.
#[must_use]
pub fn with_cookie(mut response: Response, cookie: HeaderValue) -> Response {
    response.headers_mut().append(SET_COOKIE, cookie);
    response
}
