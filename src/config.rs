//! Centralized configuration for the auth gateway.
//!
//! All configuration is loaded from environment variables and validated
//! at startup.

use crate::error::GatewayError;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// JWT signing algorithm available to tenants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JwtAlgorithm {
    /// HMAC with SHA-256, process-wide secret
    HS256,
    /// RSA with SHA-256, per-kid key pairs
    RS256,
}

impl JwtAlgorithm {
    /// Parse algorithm from string.
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s.to_uppercase().as_str() {
            "HS256" => Ok(Self::HS256),
            "RS256" => Ok(Self::RS256),
            _ => Err(GatewayError::config(format!("Invalid JWT algorithm: {s}"))),
        }
    }

    /// Get algorithm name for the JWT header.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::RS256 => "RS256",
        }
    }
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Development: permissive fallbacks enabled
    Development,
    /// Production: strict behavior
    Production,
}

impl Environment {
    fn parse(s: &str) -> Result<Self, GatewayError> {
        match s.to_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            _ => Err(GatewayError::config(format!("Invalid ENVIRONMENT: {s}"))),
        }
    }

    /// True when running in production.
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable console output
    Console,
    /// Newline-delimited JSON
    Ndjson,
}

impl LogFormat {
    fn parse(s: &str) -> Result<Self, GatewayError> {
        match s.to_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "ndjson" => Ok(Self::Ndjson),
            _ => Err(GatewayError::config(format!("Invalid LOG_FORMAT: {s}"))),
        }
    }
}

/// Auth gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // Server settings
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Deployment environment
    pub environment: Environment,

    // Logging
    /// Minimum log level (trace|debug|info|warning|error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,

    // JWT settings
    /// HS256 secret; generated at boot in development when absent
    pub jwt_secret: String,
    /// Fallback algorithm for tenants without an explicit choice
    pub default_algorithm: JwtAlgorithm,
    /// Access token lifetime
    pub token_expiration: Duration,
    /// Refresh token lifetime
    pub refresh_expiration: Duration,
    /// SSO cookie lifetime
    pub cookie_expiration: Duration,
    /// Interceptor cookie renewal window
    pub renew_window: Duration,
    /// Length of generated authorization and refresh codes
    pub token_length: usize,

    // Provider scripts
    /// Wall-clock budget for a single provider invocation
    pub script_timeout: Duration,

    // Storage
    /// Redis host; in-memory stores are used when absent
    pub redis_host: Option<String>,
    /// Redis password
    pub redis_password: Option<String>,

    // Entity sources
    /// Root directory holding tenants/ and clients/ YAML
    pub resource_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a recognized variable carries an invalid value.
    pub fn from_env() -> Result<Self, GatewayError> {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_env("PORT", 8080)?;

        let environment = Environment::parse(
            &env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        )?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format =
            LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_else(|_| "console".to_string()))?;

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                if environment.is_production() {
                    return Err(GatewayError::config("JWT_SECRET is required in production"));
                }
                tracing::warn!("JWT_SECRET not set, generating a random development secret");
                random_secret()
            }
        };

        let default_algorithm = JwtAlgorithm::parse(
            &env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string()),
        )?;

        let token_expiration =
            Duration::from_secs(parse_env("TOKEN_EXPIRATION_HOURS", 2u64)? * 3600);
        let refresh_expiration =
            Duration::from_secs(parse_env("TOKEN_REFRESH_EXPIRATION_HOURS", 720u64)? * 3600);
        let cookie_expiration =
            Duration::from_secs(parse_env("COOKIE_EXPIRATION_DAYS", 7u64)? * 86400);
        let renew_window = Duration::from_secs(parse_env("RENEW_WINDOW_HOURS", 2u64)? * 3600);

        let token_length = parse_env("TOKEN_LENGTH", 16usize)?;
        if token_length < 8 {
            return Err(GatewayError::config("TOKEN_LENGTH must be at least 8"));
        }

        let script_timeout = Duration::from_secs(parse_env("PROVIDER_SCRIPT_TIMEOUT", 10u64)?);

        let redis_host = env::var("REDIS_HOST").ok().filter(|h| !h.is_empty());
        let redis_password = env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty());

        let resource_dir = env::var("RESOURCE_DIR")
            .ok()
            .filter(|d| !d.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            host,
            port,
            environment,
            log_level,
            log_format,
            jwt_secret,
            default_algorithm,
            token_expiration,
            refresh_expiration,
            cookie_expiration,
            renew_window,
            token_length,
            script_timeout,
            redis_host,
            redis_password,
            resource_dir,
        })
    }

    /// Redis connection URL, when Redis is configured.
    #[must_use]
    pub fn redis_url(&self) -> Option<String> {
        self.redis_host.as_ref().map(|host| {
            let host = if host.contains(':') {
                host.clone()
            } else {
                format!("{host}:6379")
            };
            match &self.redis_password {
                Some(password) => format!("redis://:{password}@{host}/"),
                None => format!("redis://{host}/"),
            }
        })
    }
}

/// Parse environment variable with default value.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, GatewayError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| GatewayError::config(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}

/// Random urlsafe secret for development boots.
fn random_secret() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_algorithm_parsing() {
        assert_eq!(JwtAlgorithm::parse("HS256").unwrap(), JwtAlgorithm::HS256);
        assert_eq!(JwtAlgorithm::parse("rs256").unwrap(), JwtAlgorithm::RS256);
        assert!(JwtAlgorithm::parse("ES256").is_err());
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            Environment::parse("production").unwrap(),
            Environment::Production
        );
        assert_eq!(
            Environment::parse("Development").unwrap(),
            Environment::Development
        );
        assert!(Environment::parse("staging").is_err());
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::parse("console").unwrap(), LogFormat::Console);
        assert_eq!(LogFormat::parse("ndjson").unwrap(), LogFormat::Ndjson);
        assert!(LogFormat::parse("logfmt").is_err());
    }

    #[test]
    fn test_redis_url() {
        let mut config = test_config();
        assert!(config.redis_url().is_none());

        config.redis_host = Some("redis.local".to_string());
        assert_eq!(config.redis_url().unwrap(), "redis://redis.local:6379/");

        config.redis_password = Some("hunter2".to_string());
        assert_eq!(
            config.redis_url().unwrap(),
            "redis://:hunter2@redis.local:6379/"
        );
    }

    #[test]
    fn test_random_secret_is_unique() {
        assert_ne!(random_secret(), random_secret());
    }

    pub(crate) fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            environment: Environment::Development,
            log_level: "info".to_string(),
            log_format: LogFormat::Console,
            jwt_secret: "test-secret-for-unit-tests-only".to_string(),
            default_algorithm: JwtAlgorithm::HS256,
            token_expiration: Duration::from_secs(2 * 3600),
            refresh_expiration: Duration::from_secs(720 * 3600),
            cookie_expiration: Duration::from_secs(7 * 86400),
            renew_window: Duration::from_secs(2 * 3600),
            token_length: 16,
            script_timeout: Duration::from_secs(10),
            redis_host: None,
            redis_password: None,
            resource_dir: None,
        }
    }
}
