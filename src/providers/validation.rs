//! Validation provider invocation.

use crate::entities::Tenant;
use crate::providers::engine::{ProviderClass, ScriptError};
use crate::providers::host::ProviderHost;
use serde::Serialize;

/// Arguments handed to `UserValidationProvider`.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationArgs {
    /// Login name from the stored payload
    pub username: String,
    /// Subject from the stored payload
    pub subject: String,
}

/// Run the tenant's `UserValidationProvider` for a refresh.
///
/// Returns whether the user is still valid.
///
/// # Errors
///
/// Any `ScriptError`; the request path maps them to an invalidation.
pub async fn run_validation(
    host: &ProviderHost,
    tenant: &Tenant,
    args: &ValidationArgs,
) -> Result<bool, ScriptError> {
    let args = serde_json::to_value(args).map_err(|e| ScriptError::Runtime(e.to_string()))?;
    let outcome = host.run(tenant, ProviderClass::UserValidation, args).await?;

    match outcome.getter_bool("isValid").await? {
        Some(value) => Ok(value),
        None => Ok(outcome.commit.is_affirmative()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::TenantConfig;
    use crate::providers::mock::MockEngine;
    use std::sync::Arc;
    use std::time::Duration;

    fn tenant() -> Tenant {
        Tenant::from_config(
            "acme",
            TenantConfig {
                hosts: vec!["acme.example.com".to_string()],
                interceptor: None,
                providers: vec!["class UserValidationProvider {}".to_string()],
                templates: None,
                informations: None,
                silent_login: true,
                jwt_algorithm: None,
            },
        )
        .unwrap()
    }

    fn args() -> ValidationArgs {
        ValidationArgs {
            username: "alice@example.com".to_string(),
            subject: "uid-7".to_string(),
        }
    }

    #[tokio::test]
    async fn test_valid_user() {
        let engine = MockEngine::static_outcome(serde_json::json!(true))
            .with_getter("isValid", serde_json::json!(true));
        let host = ProviderHost::new(Arc::new(engine), Duration::from_millis(200));
        assert!(run_validation(&host, &tenant(), &args()).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalidated_user() {
        let engine = MockEngine::static_outcome(serde_json::json!(true))
            .with_getter("isValid", serde_json::json!(false));
        let host = ProviderHost::new(Arc::new(engine), Duration::from_millis(200));
        assert!(!run_validation(&host, &tenant(), &args()).await.unwrap());
    }

    #[tokio::test]
    async fn test_timeout_propagates() {
        let engine = MockEngine::static_outcome(serde_json::json!(true))
            .with_delay(Duration::from_secs(5));
        let host = ProviderHost::new(Arc::new(engine), Duration::from_millis(50));
        let err = run_validation(&host, &tenant(), &args()).await.unwrap_err();
        assert_eq!(err, ScriptError::Timeout);
    }
}
