//! Per-request client info resolution.
//!
//! Every request is enriched with the resolved tenant, client, mode, and
//! SSO cookie state before it reaches a controller.

use crate::entities::{Client, Tenant};
use crate::jwt::Payload;
use crate::state::SharedState;
use axum::extract::{Request, State};
use axum::http::header::{COOKIE, HOST, REFERER};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

/// Name of the SSO cookie.
pub const SSO_COOKIE: &str = "uitsmijter-sso";

/// Paths that never run in interceptor mode.
const OAUTH_PATHS: &[&str] = &["/authorize", "/token", "/login"];

/// How the request entered the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Direct OAuth traffic
    OAuth,
    /// Forward-auth traffic from a reverse proxy
    Interceptor,
}

/// The URL the user agent originally requested.
#[derive(Debug, Clone)]
pub struct RequestedUrl {
    /// Scheme, from `X-Forwarded-Proto` or `http`
    pub scheme: String,
    /// Host, from `X-Forwarded-Host` or `Host`, port stripped
    pub host: String,
    /// Path and query, from `X-Forwarded-Uri` or the request target
    pub uri: String,
}

impl RequestedUrl {
    /// Reconstructed original URL.
    #[must_use]
    pub fn to_url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.uri)
    }
}

/// Request-scoped derived context.
#[derive(Clone)]
pub struct ClientInfo {
    /// Traffic mode
    pub mode: RequestMode,
    /// Originally requested URL parts
    pub requested: RequestedUrl,
    /// Referer header, when present
    pub referer: Option<String>,
    /// Canonical domain this request is responsible for
    pub responsible_domain: String,
    /// Scheme plus responsible domain
    pub service_url: String,
    /// Resolved tenant
    pub tenant: Option<Tenant>,
    /// Resolved client, cleared on tenant mismatch
    pub client: Option<Client>,
    /// Verified unexpired SSO cookie claims
    pub valid_payload: Option<Payload>,
    /// Signature was valid but the cookie is past expiry
    pub expired: bool,
}

/// Middleware attaching `ClientInfo` to every request.
pub async fn middleware(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Response {
    let info = resolve(&state, &request);
    request.extensions_mut().insert(info);
    next.run(request).await
}

fn resolve(state: &SharedState, request: &Request) -> ClientInfo {
    let headers = request.headers();
    let snapshot = state.entities.snapshot();

    let forwarded_host = header(headers, "x-forwarded-host").map(strip_port);
    let host = forwarded_host
        .clone()
        .or_else(|| header(headers, HOST.as_str()).map(strip_port))
        .unwrap_or_default();
    let scheme = header(headers, "x-forwarded-proto").unwrap_or_else(|| "http".to_string());
    let uri = header(headers, "x-forwarded-uri").unwrap_or_else(|| {
        request
            .uri()
            .path_and_query()
            .map_or_else(|| "/".to_string(), ToString::to_string)
    });

    let tenant = snapshot.find_tenant_by_host(&host).cloned();

    let client = query_param(request, "client_id")
        .or_else(|| cookie_value(headers, "client_id"))
        .and_then(|raw| Uuid::parse_str(&raw).ok())
        .and_then(|ident| snapshot.find_client_by_ident(ident).cloned())
        // A client of another tenant is not usable on this host.
        .filter(|client| {
            tenant
                .as_ref()
                .map_or(false, |tenant| client.tenant_name == tenant.name)
        });

    let path = request.uri().path();
    let interceptor_mode = forwarded_host.is_some()
        && !OAUTH_PATHS.contains(&path)
        && tenant
            .as_ref()
            .is_some_and(|t| t.interceptor.enabled && t.matches_host(&host));
    let mode = if interceptor_mode {
        RequestMode::Interceptor
    } else {
        RequestMode::OAuth
    };

    let (valid_payload, expired) = match cookie_value(headers, SSO_COOKIE) {
        Some(token) => match state.signer.verify_allow_expired(&token) {
            Ok((payload, false)) => (Some(payload), false),
            Ok((_, true)) => (None, true),
            Err(_) => (None, false),
        },
        None => (None, false),
    };

    let responsible_domain = match mode {
        RequestMode::Interceptor => tenant
            .as_ref()
            .and_then(|t| {
                t.cookie_or_domain()
                    .or_else(|| t.longest_matching_domain(&host))
            })
            .unwrap_or_else(|| host.to_ascii_lowercase()),
        RequestMode::OAuth => host.to_ascii_lowercase(),
    };
    let service_url = format!("{scheme}://{responsible_domain}");

    ClientInfo {
        mode,
        requested: RequestedUrl { scheme, host, uri },
        referer: header(headers, REFERER.as_str()),
        responsible_domain,
        service_url,
        tenant,
        client,
        valid_payload,
        expired,
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn strip_port(host: String) -> String {
    host.split(':').next().unwrap_or_default().to_string()
}

fn query_param(request: &Request, name: &str) -> Option<String> {
    let query = request.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Read a cookie by name from the Cookie header(s).
#[must_use]
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            "a=1; uitsmijter-sso=token.value.here; b=2".parse().unwrap(),
        );
        assert_eq!(
            cookie_value(&headers, SSO_COOKIE).unwrap(),
            "token.value.here"
        );
        assert_eq!(cookie_value(&headers, "b").unwrap(), "2");
        assert!(cookie_value(&headers, "missing").is_none());
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("example.com:8080".to_string()), "example.com");
        assert_eq!(strip_port("example.com".to_string()), "example.com");
    }

    #[test]
    fn test_requested_url_reconstruction() {
        let requested = RequestedUrl {
            scheme: "https".to_string(),
            host: "shop.acme.example.com".to_string(),
            uri: "/cart?items=2".to_string(),
        };
        assert_eq!(
            requested.to_url(),
            "https://shop.acme.example.com/cart?items=2"
        );
    }
}
