//! Client entity: redirect patterns, grant types, scopes.

use crate::error::GatewayError;
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

/// Grant types a client may be limited to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// OAuth authorization code flow
    AuthorizationCode,
    /// Refresh token exchange
    RefreshToken,
    /// Resource-owner password flow
    Password,
    /// Device authorization flow
    Device,
    /// Forward-auth interception
    Interceptor,
}

impl GrantType {
    /// Wire name of the grant type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::Password => "password",
            Self::Device => "device",
            Self::Interceptor => "interceptor",
        }
    }

    /// Parse from the wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "authorization_code" => Some(Self::AuthorizationCode),
            "refresh_token" => Some(Self::RefreshToken),
            "password" => Some(Self::Password),
            "device" => Some(Self::Device),
            "interceptor" => Some(Self::Interceptor),
            _ => None,
        }
    }
}

/// Raw client configuration as it appears in YAML under `config`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Stable client identifier
    pub ident: Uuid,
    /// Owning tenant name
    pub tenantname: String,
    /// Ordered redirect URL patterns (regex)
    #[serde(default)]
    pub redirect_urls: Vec<String>,
    /// Allowed grant types; absent means all
    #[serde(default)]
    pub grant_types: Option<Vec<GrantType>>,
    /// Ordered scope patterns (glob)
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Scope patterns a provider script may add (glob)
    #[serde(default)]
    pub providers_allowed_scopes: Option<Vec<String>>,
    /// Ordered referrer patterns (regex)
    #[serde(default)]
    pub referrers: Option<Vec<String>>,
    /// Client secret for confidential clients
    #[serde(default)]
    pub secret: Option<String>,
}

/// An OAuth client belonging to a tenant.
#[derive(Debug, Clone)]
pub struct Client {
    /// Stable client identifier
    pub ident: Uuid,
    /// Human-readable client name
    pub name: String,
    /// Owning tenant name
    pub tenant_name: String,
    /// Compiled redirect URL patterns
    pub redirect_urls: Vec<Regex>,
    /// Allowed grant types; `None` allows all
    pub grant_types: Option<Vec<GrantType>>,
    /// Scope glob patterns
    pub scopes: Vec<String>,
    /// Scope globs a provider may add; `None` allows none beyond `scopes`
    pub providers_allowed_scopes: Option<Vec<String>>,
    /// Compiled referrer patterns
    pub referrers: Vec<Regex>,
    /// Client secret
    pub secret: Option<String>,
}

impl Client {
    /// Build a client from its declared configuration, compiling patterns.
    ///
    /// # Errors
    ///
    /// Fails when a redirect or referrer pattern is not a valid regex.
    pub fn from_config(name: impl Into<String>, config: ClientConfig) -> Result<Self, GatewayError> {
        let name = name.into();
        let redirect_urls = compile_patterns(&name, "redirect_urls", &config.redirect_urls)?;
        let referrers = compile_patterns(
            &name,
            "referrers",
            config.referrers.as_deref().unwrap_or(&[]),
        )?;

        Ok(Self {
            ident: config.ident,
            name,
            tenant_name: config.tenantname,
            redirect_urls,
            grant_types: config.grant_types,
            scopes: config.scopes,
            providers_allowed_scopes: config.providers_allowed_scopes,
            referrers,
            secret: config.secret,
        })
    }

    /// Whether the client may use the given grant type.
    ///
    /// Clients without an explicit list accept every grant type.
    #[must_use]
    pub fn allows_grant(&self, grant: GrantType) -> bool {
        match &self.grant_types {
            Some(grants) => grants.contains(&grant),
            None => true,
        }
    }

    /// Whether a redirect target matches any configured pattern.
    #[must_use]
    pub fn allows_redirect(&self, url: &str) -> bool {
        self.redirect_urls.iter().any(|p| p.is_match(url))
    }

    /// Whether a referer is acceptable.
    ///
    /// With no referrer patterns configured every referer passes.
    #[must_use]
    pub fn allows_referer(&self, referer: &str) -> bool {
        self.referrers.is_empty() || self.referrers.iter().any(|p| p.is_match(referer))
    }
}

impl PartialEq for Client {
    fn eq(&self, other: &Self) -> bool {
        self.ident == other.ident
    }
}

impl Eq for Client {}

fn compile_patterns(
    client: &str,
    field: &str,
    patterns: &[String],
) -> Result<Vec<Regex>, GatewayError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| {
                GatewayError::loader(format!("Client {client}: invalid {field} pattern {p}: {e}"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_client() -> Client {
        Client::from_config(
            "console",
            ClientConfig {
                ident: Uuid::new_v4(),
                tenantname: "acme".to_string(),
                redirect_urls: vec!["https://app\\.acme\\.com/.*".to_string()],
                grant_types: Some(vec![GrantType::AuthorizationCode, GrantType::RefreshToken]),
                scopes: vec!["read".to_string(), "order:*".to_string()],
                providers_allowed_scopes: None,
                referrers: None,
                secret: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_redirect_matching() {
        let client = test_client();
        assert!(client.allows_redirect("https://app.acme.com/callback"));
        assert!(!client.allows_redirect("https://evil.example/callback"));
    }

    #[test]
    fn test_grant_allowance() {
        let client = test_client();
        assert!(client.allows_grant(GrantType::AuthorizationCode));
        assert!(!client.allows_grant(GrantType::Password));

        let mut open = test_client();
        open.grant_types = None;
        assert!(open.allows_grant(GrantType::Device));
    }

    #[test]
    fn test_referer_matching_defaults_open() {
        let mut client = test_client();
        assert!(client.allows_referer("https://anything.example/"));

        client.referrers = vec![Regex::new("https://portal\\.acme\\.com/.*").unwrap()];
        assert!(client.allows_referer("https://portal.acme.com/login"));
        assert!(!client.allows_referer("https://elsewhere.example/"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = Client::from_config(
            "broken",
            ClientConfig {
                ident: Uuid::new_v4(),
                tenantname: "acme".to_string(),
                redirect_urls: vec!["(unclosed".to_string()],
                grant_types: None,
                scopes: Vec::new(),
                providers_allowed_scopes: None,
                referrers: None,
                secret: None,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_grant_type_wire_names() {
        assert_eq!(GrantType::AuthorizationCode.as_str(), "authorization_code");
        assert_eq!(
            GrantType::parse("refresh_token"),
            Some(GrantType::RefreshToken)
        );
        assert_eq!(GrantType::parse("implicit"), None);
    }

    #[test]
    fn test_yaml_decoding() {
        let yaml = r"
ident: 6a1f39e3-9176-4b8e-9e39-1a7f5575ecf1
tenantname: acme
redirect_urls:
  - https://app\.acme\.com/.*
grant_types: [authorization_code]
scopes: ['*']
";
        let config: ClientConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tenantname, "acme");
        let client = Client::from_config("c", config).unwrap();
        assert!(client.allows_grant(GrantType::AuthorizationCode));
        assert!(!client.allows_grant(GrantType::Password));
    }
}
