//! Tenant entity: host patterns, interceptor settings, provider scripts.

use crate::config::JwtAlgorithm;
use crate::error::GatewayError;
use serde::Deserialize;

/// Forward-auth interceptor settings of a tenant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InterceptorSettings {
    /// Whether interceptor mode is enabled for this tenant
    #[serde(default)]
    pub enabled: bool,
    /// Domain the login page is served on
    #[serde(default)]
    pub domain: Option<String>,
    /// Cookie domain override; falls back to `domain`
    #[serde(default)]
    pub cookie: Option<String>,
}

/// Informational URLs shown on tenant-facing pages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantInformations {
    /// Imprint URL
    #[serde(default)]
    pub imprint_url: Option<String>,
    /// Privacy policy URL
    #[serde(default)]
    pub privacy_url: Option<String>,
    /// Registration URL
    #[serde(default)]
    pub register_url: Option<String>,
}

/// Raw tenant configuration as it appears in YAML under `config`.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantConfig {
    /// Host patterns, wildcards allowed (`*.example.com`)
    pub hosts: Vec<String>,
    /// Interceptor settings
    #[serde(default)]
    pub interceptor: Option<InterceptorSettings>,
    /// Provider script sources, concatenated at evaluation time
    #[serde(default)]
    pub providers: Vec<String>,
    /// Opaque template source location (S3-style); consumed by the renderer
    #[serde(default)]
    pub templates: Option<serde_yaml::Value>,
    /// Informational URLs
    #[serde(default)]
    pub informations: Option<TenantInformations>,
    /// Issue codes silently when a valid SSO cookie is present
    #[serde(default = "default_silent_login")]
    pub silent_login: bool,
    /// JWT algorithm override (HS256 | RS256)
    #[serde(default)]
    pub jwt_algorithm: Option<String>,
}

fn default_silent_login() -> bool {
    true
}

/// A tenant. Identity and equality are by `name`.
#[derive(Debug, Clone)]
pub struct Tenant {
    /// Unique tenant name
    pub name: String,
    /// Ordered host patterns; never empty
    pub hosts: Vec<String>,
    /// Interceptor settings
    pub interceptor: InterceptorSettings,
    /// Provider script sources
    pub providers: Vec<String>,
    /// Informational URLs
    pub informations: TenantInformations,
    /// Silent login flag
    pub silent_login: bool,
    /// JWT algorithm override
    pub jwt_algorithm: Option<JwtAlgorithm>,
}

impl Tenant {
    /// Build a tenant from its declared configuration.
    ///
    /// # Errors
    ///
    /// Fails when the host set is empty or the algorithm is unknown.
    pub fn from_config(name: impl Into<String>, config: TenantConfig) -> Result<Self, GatewayError> {
        let name = name.into();
        if config.hosts.is_empty() {
            return Err(GatewayError::loader(format!(
                "Tenant {name} declares no hosts"
            )));
        }
        let jwt_algorithm = config
            .jwt_algorithm
            .as_deref()
            .map(JwtAlgorithm::parse)
            .transpose()?;

        Ok(Self {
            name,
            hosts: config.hosts,
            interceptor: config.interceptor.unwrap_or_default(),
            providers: config.providers,
            informations: config.informations.unwrap_or_default(),
            silent_login: config.silent_login,
            jwt_algorithm,
        })
    }

    /// The algorithm this tenant signs with.
    #[must_use]
    pub fn effective_algorithm(&self, process_default: JwtAlgorithm) -> JwtAlgorithm {
        self.jwt_algorithm.unwrap_or(process_default)
    }

    /// Whether any host pattern matches the given host.
    #[must_use]
    pub fn matches_host(&self, host: &str) -> bool {
        self.hosts.iter().any(|p| host_pattern_matches(p, host))
    }

    /// Whether any host pattern matches exactly (no wildcard expansion).
    #[must_use]
    pub fn matches_host_exactly(&self, host: &str) -> bool {
        self.hosts.iter().any(|p| p.eq_ignore_ascii_case(host))
    }

    /// The longest host pattern matching `host`, wildcard prefix stripped.
    ///
    /// Used for responsibility-domain computation: among all matching
    /// patterns the one with the most labels wins.
    #[must_use]
    pub fn longest_matching_domain(&self, host: &str) -> Option<String> {
        self.hosts
            .iter()
            .filter(|p| host_pattern_matches(p, host))
            .map(|p| p.trim_start_matches("*.").to_ascii_lowercase())
            .max_by_key(|d| d.split('.').count())
    }

    /// Domain the SSO cookie is scoped to in interceptor mode.
    #[must_use]
    pub fn cookie_or_domain(&self) -> Option<String> {
        self.interceptor
            .cookie
            .clone()
            .or_else(|| self.interceptor.domain.clone())
            .map(|d| d.to_ascii_lowercase())
    }

    /// Lowercased identifier used for template path resolution.
    #[must_use]
    pub fn slug(&self) -> String {
        self.name.to_ascii_lowercase().replace(' ', "-")
    }
}

impl PartialEq for Tenant {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Tenant {}

/// Match a host against a tenant host pattern.
///
/// `*.example.com` matches any single- or multi-label left side but not the
/// bare apex. Comparison is case-insensitive.
#[must_use]
pub fn host_pattern_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();
    if let Some(suffix) = pattern.strip_prefix("*.") {
        host.len() > suffix.len() + 1 && host.ends_with(suffix) && {
            let boundary = host.len() - suffix.len() - 1;
            host.as_bytes()[boundary] == b'.'
        }
    } else {
        pattern == host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(hosts: &[&str]) -> Tenant {
        Tenant::from_config(
            "acme",
            TenantConfig {
                hosts: hosts.iter().map(|h| (*h).to_string()).collect(),
                interceptor: None,
                providers: Vec::new(),
                templates: None,
                informations: None,
                silent_login: true,
                jwt_algorithm: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_exact_host_match_is_case_insensitive() {
        let t = tenant(&["login.example.com"]);
        assert!(t.matches_host("LOGIN.example.COM"));
        assert!(!t.matches_host("other.example.com"));
    }

    #[test]
    fn test_wildcard_matches_single_and_multi_label() {
        assert!(host_pattern_matches("*.example.com", "a.example.com"));
        assert!(host_pattern_matches("*.example.com", "a.b.example.com"));
        assert!(!host_pattern_matches("*.example.com", "example.com"));
        assert!(!host_pattern_matches("*.example.com", "evil-example.com"));
        assert!(!host_pattern_matches("*.example.com", "aexample.com"));
    }

    #[test]
    fn test_empty_hosts_rejected() {
        let result = Tenant::from_config(
            "bad",
            TenantConfig {
                hosts: Vec::new(),
                interceptor: None,
                providers: Vec::new(),
                templates: None,
                informations: None,
                silent_login: true,
                jwt_algorithm: None,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_effective_algorithm_falls_back() {
        let mut t = tenant(&["example.com"]);
        assert_eq!(
            t.effective_algorithm(crate::config::JwtAlgorithm::HS256),
            crate::config::JwtAlgorithm::HS256
        );
        t.jwt_algorithm = Some(crate::config::JwtAlgorithm::RS256);
        assert_eq!(
            t.effective_algorithm(crate::config::JwtAlgorithm::HS256),
            crate::config::JwtAlgorithm::RS256
        );
    }

    #[test]
    fn test_longest_matching_domain() {
        let t = tenant(&["*.example.com", "*.shop.example.com"]);
        assert_eq!(
            t.longest_matching_domain("a.shop.example.com").unwrap(),
            "shop.example.com"
        );
        assert_eq!(
            t.longest_matching_domain("a.example.com").unwrap(),
            "example.com"
        );
        assert!(t.longest_matching_domain("other.net").is_none());
    }

    #[test]
    fn test_cookie_or_domain_preference() {
        let mut t = tenant(&["example.com"]);
        assert!(t.cookie_or_domain().is_none());

        t.interceptor.domain = Some("login.Example.com".to_string());
        assert_eq!(t.cookie_or_domain().unwrap(), "login.example.com");

        t.interceptor.cookie = Some("example.com".to_string());
        assert_eq!(t.cookie_or_domain().unwrap(), "example.com");
    }

    #[test]
    fn test_equality_is_by_name() {
        let a = tenant(&["a.com"]);
        let b = tenant(&["b.com"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_yaml_defaults() {
        let config: TenantConfig = serde_yaml::from_str("hosts: [example.com]").unwrap();
        assert!(config.silent_login);
        assert!(config.interceptor.is_none());
        let t = Tenant::from_config("t", config).unwrap();
        assert!(!t.interceptor.enabled);
    }
}
