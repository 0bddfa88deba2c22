//! Authorization endpoint: the code flow entry point.

use crate::client_info::ClientInfo;
use crate::entities::{Client, GrantType};
use crate::error::ErrorKind;
use crate::http::{html_headers, negotiated_error};
use crate::jwt::Payload;
use crate::metrics;
use crate::pkce::CodeChallengeMethod;
use crate::scopes;
use crate::sessions::{AuthSession, CodeGenerator, SessionKind};
use crate::state::SharedState;
use crate::templates::{Page, PageContext};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Extension;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

/// Lifetime of a minted authorization code in seconds.
const CODE_TTL: u64 = 60;

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    response_type: Option<String>,
    #[allow(dead_code)]
    client_id: Option<String>,
    redirect_uri: Option<String>,
    scope: Option<String>,
    state: Option<String>,
    code_challenge: Option<String>,
    code_challenge_method: Option<String>,
    #[serde(rename = "loginId")]
    login_id: Option<Uuid>,
}

/// `GET /authorize`
pub async fn authorize(
    State(state): State<SharedState>,
    Extension(info): Extension<ClientInfo>,
    headers: HeaderMap,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    if query.response_type.as_deref() != Some("code") {
        return negotiated_error(&state, Some(&info), &headers, ErrorKind::NotAcceptableRequest);
    }

    let challenge_method = match query.code_challenge_method.as_deref() {
        None => None,
        Some(raw) => match CodeChallengeMethod::parse(raw) {
            Some(method) => Some(method),
            None => {
                return negotiated_error(
                    &state,
                    Some(&info),
                    &headers,
                    ErrorKind::CodeChallengeMethodNotImplemented,
                );
            }
        },
    };
    if challenge_method.is_some_and(CodeChallengeMethod::requires_challenge)
        && query.code_challenge.is_none()
    {
        return negotiated_error(&state, Some(&info), &headers, ErrorKind::NotAcceptableRequest);
    }

    let Some(tenant) = info.tenant.clone() else {
        return negotiated_error(&state, Some(&info), &headers, ErrorKind::NoTenant);
    };
    let Some(client) = info.client.clone() else {
        return negotiated_error(&state, Some(&info), &headers, ErrorKind::NoClient);
    };
    if !client.allows_grant(GrantType::AuthorizationCode) {
        return negotiated_error(&state, Some(&info), &headers, ErrorKind::UnsupportedGrantType);
    }

    let Some(redirect_uri) = query.redirect_uri.clone() else {
        return negotiated_error(&state, Some(&info), &headers, ErrorKind::RedirectMismatch);
    };
    if !redirect_allowed(&client, &info, &redirect_uri) {
        return negotiated_error(&state, Some(&info), &headers, ErrorKind::RedirectMismatch);
    }

    if let Some(referer) = &info.referer {
        if !client.referrers.is_empty()
            && !client.allows_referer(referer)
            && !is_self_origin(&info, referer)
        {
            return negotiated_error(&state, Some(&info), &headers, ErrorKind::WrongReferer);
        }
    }

    // A valid SSO cookie mints a code when the request proves it came from
    // our own login page, or silently when the tenant allows it.
    if let Some(payload) = info.valid_payload.clone() {
        let proven = match query.login_id {
            Some(login_id) => state
                .sessions
                .consume_login(login_id)
                .await
                .unwrap_or(false),
            None => false,
        };

        if proven || (tenant.silent_login && query.login_id.is_none()) {
            return mint_code(&state, &info, &client, &payload, &query, challenge_method).await;
        }
    }

    login_form(&state, &info)
}

/// Mint an authorization code and redirect back to the client.
async fn mint_code(
    state: &SharedState,
    info: &ClientInfo,
    client: &Client,
    payload: &Payload,
    query: &AuthorizeQuery,
    challenge_method: Option<CodeChallengeMethod>,
) -> Response {
    let requested = query
        .scope
        .as_deref()
        .map(scopes::split)
        .unwrap_or_default();
    let from_payload = payload
        .scope
        .as_deref()
        .map(scopes::split)
        .unwrap_or_default();
    let granted = scopes::granted(client, &requested, &from_payload);

    let code = CodeGenerator::generate(state.config.token_length);
    let redirect_uri = query.redirect_uri.clone().unwrap_or_default();

    let session = AuthSession {
        kind: SessionKind::Code,
        tenant_name: payload.tenant.clone(),
        subject: payload.sub.clone(),
        code: code.clone(),
        scopes: granted,
        payload: payload.clone(),
        redirect: redirect_uri.clone(),
        ttl: CODE_TTL,
        generated: Utc::now().timestamp(),
        code_challenge: query.code_challenge.clone(),
        code_challenge_method: challenge_method,
        login_id: query.login_id,
    };

    if let Err(e) = state.sessions.put(session).await {
        return e.into_response();
    }

    metrics::CODES_ISSUED
        .with_label_values(&[&payload.tenant])
        .inc();
    debug!(tenant = %payload.tenant, client = %client.name, "Issued authorization code");

    let separator = if redirect_uri.contains('?') { '&' } else { '?' };
    let mut target = format!("{redirect_uri}{separator}code={code}");
    if let Some(state_value) = &query.state {
        target.push_str("&state=");
        target.push_str(
            &url::form_urlencoded::byte_serialize(state_value.as_bytes()).collect::<String>(),
        );
    }
    Redirect::to(&target).into_response()
}

/// 401 with the login form, embedding the full current URL as `location`.
fn login_form(state: &SharedState, info: &ClientInfo) -> Response {
    let context = PageContext {
        location: info.requested.uri.clone(),
        error: None,
    };
    match state
        .templates
        .render(info.tenant.as_ref(), Page::Login, &context)
    {
        Ok(body) => (StatusCode::UNAUTHORIZED, html_headers(), body).into_response(),
        Err(e) => e.into_response(),
    }
}

fn redirect_allowed(client: &Client, info: &ClientInfo, redirect_uri: &str) -> bool {
    client.allows_redirect(redirect_uri) || is_self_origin(info, redirect_uri)
}

/// A target on the request's own host is always acceptable.
fn is_self_origin(info: &ClientInfo, target: &str) -> bool {
    if target.starts_with('/') {
        return true;
    }
    url::Url::parse(target)
        .ok()
        .and_then(|url| url.host_str().map(|h| h.eq_ignore_ascii_case(&info.requested.host)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_info::{RequestMode, RequestedUrl};
    use crate::entities::ClientConfig;

    fn info(host: &str) -> ClientInfo {
        ClientInfo {
            mode: RequestMode::OAuth,
            requested: RequestedUrl {
                scheme: "http".to_string(),
                host: host.to_string(),
                uri: "/authorize".to_string(),
            },
            referer: None,
            responsible_domain: host.to_string(),
            service_url: format!("http://{host}"),
            tenant: None,
            client: None,
            valid_payload: None,
            expired: false,
        }
    }

    fn client() -> Client {
        Client::from_config(
            "console",
            ClientConfig {
                ident: Uuid::new_v4(),
                tenantname: "acme".to_string(),
                redirect_urls: vec!["https://app\\.example\\.com/.*".to_string()],
                grant_types: None,
                scopes: vec!["*".to_string()],
                providers_allowed_scopes: None,
                referrers: None,
                secret: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_self_origin_detection() {
        let info = info("login.example.com");
        assert!(is_self_origin(&info, "/somewhere"));
        assert!(is_self_origin(&info, "http://login.example.com/cb"));
        assert!(!is_self_origin(&info, "http://evil.example.com/cb"));
        assert!(!is_self_origin(&info, "not a url"));
    }

    #[test]
    fn test_redirect_allowance_pattern_or_self() {
        let info = info("login.example.com");
        let client = client();
        assert!(redirect_allowed(&client, &info, "https://app.example.com/cb"));
        assert!(redirect_allowed(&client, &info, "http://login.example.com/"));
        assert!(!redirect_allowed(&client, &info, "https://attacker.example/"));
    }
}
