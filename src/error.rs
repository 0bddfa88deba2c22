//! Centralized error handling for the auth gateway.
//!
//! Client-visible failures carry a machine-readable token that is rendered
//! into the HTTP response; internal failures are logged and mapped to the
//! nearest client-visible kind without leaking their message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Machine-readable error kinds surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing request context
    NotAcceptableRequest,
    /// No client could be resolved from the request
    NoClient,
    /// No tenant matches the request host
    NoTenant,
    /// Tenant missing on a login submission
    MissingTenant,
    /// Login form body could not be decoded
    FormNotParseable,
    /// Expiry date arithmetic failed
    ConstructDateError,
    /// Login submission without a location
    MissingLocation,
    /// redirect_uri matches none of the client patterns
    RedirectMismatch,
    /// Referer matches none of the configured patterns
    WrongReferer,
    /// Code or refresh token presented by a client of another tenant
    TenantMismatch,
    /// Credentials rejected by the tenant provider
    WrongCredentials,
    /// Session invalidated by the tenant validation provider
    Invalidate,
    /// client_secret does not match
    WrongClientSecret,
    /// Token is past its expiry
    ExpiredToken,
    /// Token failed verification
    InvalidToken,
    /// grant_type is not supported for this client
    UnsupportedGrantType,
    /// code_challenge_method outside {plain, sha256, none}
    CodeChallengeMethodNotImplemented,
}

impl ErrorKind {
    /// The wire token for this kind.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::NotAcceptableRequest => "NOT_ACCEPTABLE_REQUEST",
            Self::NoClient => "NO_CLIENT",
            Self::NoTenant => "NO_TENANT",
            Self::MissingTenant => "MISSING_TENANT",
            Self::FormNotParseable => "FORM_NOT_PARSEABLE",
            Self::ConstructDateError => "CONSTRUCT_DATE_ERROR",
            Self::MissingLocation => "MISSING_LOCATION",
            Self::RedirectMismatch => "REDIRECT_MISMATCH",
            Self::WrongReferer => "WRONG_REFERER",
            Self::TenantMismatch => "TENANT_MISMATCH",
            Self::WrongCredentials => "WRONG_CREDENTIALS",
            Self::Invalidate => "INVALIDATE",
            Self::WrongClientSecret => "WRONG_CLIENT_SECRET",
            Self::ExpiredToken => "EXPIRED_TOKEN",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::UnsupportedGrantType => "UNSUPPORTED_GRANT_TYPE",
            Self::CodeChallengeMethodNotImplemented => "CODE_CHALLENGE_METHOD_NOT_IMPLEMENTED",
        }
    }

    /// The HTTP status this kind maps to.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::NotAcceptableRequest
            | Self::NoClient
            | Self::NoTenant
            | Self::MissingTenant
            | Self::FormNotParseable
            | Self::ConstructDateError
            | Self::MissingLocation
            | Self::UnsupportedGrantType => StatusCode::BAD_REQUEST,
            Self::RedirectMismatch
            | Self::WrongReferer
            | Self::TenantMismatch
            | Self::WrongCredentials
            | Self::Invalidate => StatusCode::FORBIDDEN,
            Self::WrongClientSecret | Self::ExpiredToken | Self::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            Self::CodeChallengeMethodNotImplemented => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// Gateway error type.
///
/// Protocol errors carry the client-visible kind directly. Infrastructure
/// errors keep their detail for logging and collapse to a generic kind at
/// the HTTP boundary.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Client-visible protocol error
    #[error("{0}")]
    Protocol(ErrorKind),

    /// Session store operation failed
    #[error("Session store error: {0}")]
    Store(String),

    /// Provider script execution failed
    #[error("Provider script failed: {0}")]
    Provider(String),

    /// Key storage or signing operation failed
    #[error("Key operation failed: {0}")]
    Keys(String),

    /// Resource loader failure
    #[error("Loader error: {0}")]
    Loader(String),

    /// Template rendering failed
    #[error("Template rendering failed: {0}")]
    Template(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The client-visible kind for this error.
    ///
    /// Infrastructure failures never leak their message; they collapse to
    /// `NOT_ACCEPTABLE_REQUEST`.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Protocol(kind) => *kind,
            _ => ErrorKind::NotAcceptableRequest,
        }
    }

    /// Create a session store error.
    #[must_use]
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a provider error.
    #[must_use]
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a key operation error.
    #[must_use]
    pub fn keys(msg: impl Into<String>) -> Self {
        Self::Keys(msg.into())
    }

    /// Create a loader error.
    #[must_use]
    pub fn loader(msg: impl Into<String>) -> Self {
        Self::Loader(msg.into())
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<ErrorKind> for GatewayError {
    fn from(kind: ErrorKind) -> Self {
        Self::Protocol(kind)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        if !matches!(self, Self::Protocol(_)) {
            tracing::error!(error = %self, mapped = %kind, "Internal error surfaced to client");
        }
        (
            kind.status(),
            Json(serde_json::json!({ "error": true, "reason": kind.token() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorKind::NoClient.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::RedirectMismatch.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::WrongClientSecret.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ErrorKind::CodeChallengeMethodNotImplemented.status(),
            StatusCode::NOT_IMPLEMENTED
        );
    }

    #[test]
    fn test_internal_errors_collapse() {
        let err = GatewayError::store("redis timed out");
        assert_eq!(err.kind(), ErrorKind::NotAcceptableRequest);

        let err = GatewayError::keys("no active kid");
        assert_eq!(err.kind(), ErrorKind::NotAcceptableRequest);
    }

    #[test]
    fn test_internal_messages_do_not_leak() {
        let err = GatewayError::store("secret backend detail");
        assert!(!err.kind().token().contains("secret"));
    }

    #[test]
    fn test_wire_tokens() {
        assert_eq!(ErrorKind::WrongCredentials.token(), "WRONG_CREDENTIALS");
        assert_eq!(ErrorKind::TenantMismatch.token(), "TENANT_MISMATCH");
        assert_eq!(
            ErrorKind::CodeChallengeMethodNotImplemented.token(),
            "CODE_CHALLENGE_METHOD_NOT_IMPLEMENTED"
        );
    }
}
