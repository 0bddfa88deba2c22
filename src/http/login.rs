//! Login and form handling.

use crate::client_info::ClientInfo;
use crate::entities::Client;
use crate::error::ErrorKind;
use crate::http::{html_headers, negotiated_error, sso_cookie, with_cookie};
use crate::jwt::Payload;
use crate::metrics;
use crate::providers::{login::run_login, Credentials, ProviderHost};
use crate::scopes;
use crate::sessions::LoginSession;
use crate::state::SharedState;
use crate::templates::{Page, PageContext};
use axum::extract::rejection::FormRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Form};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info as log_info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct LoginFormQuery {
    /// Interceptor redirects carry the original URL in `for`
    #[serde(rename = "for")]
    for_url: Option<String>,
    location: Option<String>,
}

/// `GET /login` — render the login form.
pub async fn login_form(
    State(state): State<SharedState>,
    Extension(info): Extension<ClientInfo>,
    Query(query): Query<LoginFormQuery>,
) -> Response {
    let location = query
        .for_url
        .or(query.location)
        .unwrap_or_else(|| "/".to_string());
    render_form(&state, &info, &location, None, StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
    location: Option<String>,
    scope: Option<String>,
}

/// `POST /login` — authenticate against the tenant provider and set the
/// SSO cookie.
pub async fn login(
    State(state): State<SharedState>,
    Extension(info): Extension<ClientInfo>,
    headers: HeaderMap,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Response {
    let Ok(Form(form)) = form else {
        return render_form(
            &state,
            &info,
            "/",
            Some(ErrorKind::FormNotParseable.token()),
            StatusCode::BAD_REQUEST,
        );
    };

    let Some(tenant) = info.tenant.clone() else {
        return negotiated_error(&state, Some(&info), &headers, ErrorKind::MissingTenant);
    };

    let Some(location) = form.location.clone().filter(|l| !l.is_empty()) else {
        return negotiated_error(&state, Some(&info), &headers, ErrorKind::MissingLocation);
    };

    // The location is the authorize URL the form round-tripped (or, for
    // interceptor logins, the original upstream URL); validate it against
    // the client it names before sending the browser back there.
    let client = client_from_location(&state, &location);
    if let Err(kind) = validate_location(&info, client.as_ref(), &tenant, &location) {
        return negotiated_error(&state, Some(&info), &headers, kind);
    }

    let login_session = LoginSession::new();
    let login_id = login_session.login_id;
    if let Err(e) = state.sessions.put_login(login_session).await {
        return e.into_response();
    }

    if !ProviderHost::tenant_has_providers(&tenant) {
        warn!(tenant = %tenant.name, "Login attempted against a tenant without providers");
        metrics::LOGIN_ATTEMPTS
            .with_label_values(&[&tenant.name, "denied"])
            .inc();
        return wrong_credentials(&state, &info, &headers, &location);
    }

    let credentials = Credentials {
        username: form.username.clone(),
        password: form.password,
    };
    let attempt = match run_login(&state.providers, &tenant, &credentials).await {
        Ok(attempt) if attempt.can_login => attempt,
        Ok(_) => {
            metrics::LOGIN_ATTEMPTS
                .with_label_values(&[&tenant.name, "denied"])
                .inc();
            return wrong_credentials(&state, &info, &headers, &location);
        }
        Err(e) => {
            metrics::LOGIN_ATTEMPTS
                .with_label_values(&[&tenant.name, "error"])
                .inc();
            warn!(tenant = %tenant.name, error = %e, "Login provider failed");
            return wrong_credentials(&state, &info, &headers, &location);
        }
    };

    let subject = attempt
        .subject
        .clone()
        .unwrap_or_else(|| form.username.clone());

    let requested = form
        .scope
        .as_deref()
        .map(scopes::split)
        .unwrap_or_default();
    let granted = match &client {
        Some(client) => scopes::granted(client, &requested, &attempt.scopes),
        None => {
            let mut merged = requested;
            for scope in attempt.scopes {
                if !merged.contains(&scope) {
                    merged.push(scope);
                }
            }
            merged
        }
    };

    // Interceptor tenants get the cookie on their configured cookie
    // domain; plain OAuth logins stay on the request host. The
    // responsibility hash covers the same domain the interceptor checks.
    let cookie_domain = if tenant.interceptor.enabled {
        tenant
            .cookie_or_domain()
            .unwrap_or_else(|| info.responsible_domain.clone())
    } else {
        info.responsible_domain.clone()
    };

    let now = Utc::now().timestamp();
    let payload = Payload {
        iss: info.service_url.clone(),
        sub: subject.clone(),
        exp: now + state.config.cookie_expiration.as_secs() as i64,
        iat: now,
        aud: tenant.name.clone(),
        tenant: tenant.name.clone(),
        responsibility: Payload::responsibility_for(&cookie_domain),
        role: attempt.role,
        user: form.username.clone(),
        scope: (!granted.is_empty()).then(|| scopes::join(&granted)),
        profile: attempt.profile,
    };

    let token = match state.signer.sign_for_tenant(&payload, &tenant) {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };

    metrics::LOGIN_ATTEMPTS
        .with_label_values(&[&tenant.name, "success"])
        .inc();
    log_info!(tenant = %tenant.name, subject = %subject, "Login succeeded");

    let target = append_login_id(&location, login_id);
    let cookie = sso_cookie(&token, &cookie_domain, state.config.cookie_expiration);
    with_cookie(Redirect::to(&target).into_response(), cookie)
}

/// Resolve the client named by the `client_id` inside the location URL.
fn client_from_location(state: &SharedState, location: &str) -> Option<Client> {
    let url = url::Url::parse(location)
        .ok()
        .or_else(|| url::Url::parse(&format!("http://localhost{location}")).ok())?;
    let client_id = url
        .query_pairs()
        .find(|(key, _)| key == "client_id")
        .map(|(_, value)| value.into_owned())?;
    let ident = Uuid::parse_str(&client_id).ok()?;
    state.entities.snapshot().find_client_by_ident(ident).cloned()
}

fn validate_location(
    info: &ClientInfo,
    client: Option<&Client>,
    tenant: &crate::entities::Tenant,
    location: &str,
) -> Result<(), ErrorKind> {
    if location.starts_with('/') {
        return Ok(());
    }
    let target_host = url::Url::parse(location)
        .ok()
        .and_then(|url| url.host_str().map(ToString::to_string));
    let Some(target_host) = target_host else {
        return Err(ErrorKind::RedirectMismatch);
    };
    // Self-origin and the tenant's own hosts are always acceptable; the
    // latter is what interceptor logins redirect back to.
    if target_host.eq_ignore_ascii_case(&info.requested.host) || tenant.matches_host(&target_host)
    {
        return Ok(());
    }
    match client {
        Some(client) if client.allows_redirect(location) => Ok(()),
        _ => Err(ErrorKind::RedirectMismatch),
    }
}

/// Append the login ticket when sending the browser back to authorize.
fn append_login_id(location: &str, login_id: Uuid) -> String {
    let is_authorize = location.starts_with("/authorize")
        || url::Url::parse(location)
            .map(|url| url.path() == "/authorize")
            .unwrap_or(false);
    if !is_authorize {
        return location.to_string();
    }
    let separator = if location.contains('?') { '&' } else { '?' };
    format!("{location}{separator}loginId={login_id}")
}

fn wrong_credentials(
    state: &SharedState,
    info: &ClientInfo,
    headers: &HeaderMap,
    location: &str,
) -> Response {
    if crate::http::wants_html(headers) {
        render_form(
            state,
            info,
            location,
            Some(ErrorKind::WrongCredentials.token()),
            StatusCode::FORBIDDEN,
        )
    } else {
        negotiated_error(state, Some(info), headers, ErrorKind::WrongCredentials)
    }
}

fn render_form(
    state: &SharedState,
    info: &ClientInfo,
    location: &str,
    error: Option<&'static str>,
    status: StatusCode,
) -> Response {
    let context = PageContext {
        location: location.to_string(),
        error,
    };
    match state
        .templates
        .render(info.tenant.as_ref(), Page::Login, &context)
    {
        Ok(body) => (status, html_headers(), body).into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_login_id_only_on_authorize() {
        let id = Uuid::nil();
        assert!(append_login_id("/authorize?client_id=x", id).contains("&loginId="));
        assert!(append_login_id("/authorize", id).contains("?loginId="));
        assert!(append_login_id(
            "https://login.example.com/authorize?a=1",
            id
        )
        .contains("&loginId="));
        assert_eq!(append_login_id("/dashboard", id), "/dashboard");
        assert_eq!(
            append_login_id("https://app.example.com/", id),
            "https://app.example.com/"
        );
    }
}
