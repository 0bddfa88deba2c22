//! Login provider invocation and outcome assembly.

use crate::entities::Tenant;
use crate::providers::engine::{ProviderClass, ScriptError};
use crate::providers::host::ProviderHost;
use serde::Serialize;

/// Credentials handed to `UserLoginProvider`.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    /// Login name
    pub username: String,
    /// Password, passed through verbatim
    pub password: String,
}

/// The assembled result of a login provider run.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    /// Whether the provider accepted the credentials
    pub can_login: bool,
    /// Subject override from the commit metadata
    pub subject: Option<String>,
    /// Provider-supplied scopes (commit meta plus `scopes` getter)
    pub scopes: Vec<String>,
    /// Role from the `role` getter
    pub role: Option<String>,
    /// Opaque profile object from the `userProfile` getter
    pub profile: serde_json::Value,
}

/// Run the tenant's `UserLoginProvider` for one attempt.
///
/// # Errors
///
/// Any `ScriptError`; the request path maps them all to a credential
/// rejection.
pub async fn run_login(
    host: &ProviderHost,
    tenant: &Tenant,
    credentials: &Credentials,
) -> Result<LoginAttempt, ScriptError> {
    let args = serde_json::to_value(credentials)
        .map_err(|e| ScriptError::Runtime(e.to_string()))?;
    let outcome = host.run(tenant, ProviderClass::UserLogin, args).await?;

    let can_login = match outcome.getter_bool("canLogin").await? {
        Some(value) => value,
        None => outcome.commit.is_affirmative(),
    };

    let meta = outcome.commit.meta.clone().unwrap_or_default();
    let mut scopes = meta.scopes.unwrap_or_default();
    for scope in outcome.getter_string_list("scopes").await? {
        if !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }

    Ok(LoginAttempt {
        can_login,
        subject: meta.subject,
        scopes,
        role: outcome.getter_string("role").await?,
        profile: outcome.getter_value("userProfile").await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::TenantConfig;
    use crate::providers::engine::CommitMeta;
    use crate::providers::mock::MockEngine;
    use std::sync::Arc;
    use std::time::Duration;

    fn tenant() -> Tenant {
        Tenant::from_config(
            "acme",
            TenantConfig {
                hosts: vec!["acme.example.com".to_string()],
                interceptor: None,
                providers: vec!["class UserLoginProvider {}".to_string()],
                templates: None,
                informations: None,
                silent_login: true,
                jwt_algorithm: None,
            },
        )
        .unwrap()
    }

    fn host(engine: MockEngine) -> ProviderHost {
        ProviderHost::new(Arc::new(engine), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_successful_login_collects_getters() {
        let engine = MockEngine::static_outcome(serde_json::json!(true))
            .with_meta(CommitMeta {
                subject: Some("uid-7".to_string()),
                scopes: Some(vec!["billing".to_string()]),
            })
            .with_getter("canLogin", serde_json::json!(true))
            .with_getter("role", serde_json::json!("admin"))
            .with_getter("scopes", serde_json::json!(["billing", "extra"]))
            .with_getter("userProfile", serde_json::json!({ "displayName": "Alice" }));

        let credentials = Credentials {
            username: "alice@example.com".to_string(),
            password: "pw".to_string(),
        };
        let attempt = run_login(&host(engine), &tenant(), &credentials)
            .await
            .unwrap();

        assert!(attempt.can_login);
        assert_eq!(attempt.subject.as_deref(), Some("uid-7"));
        assert_eq!(attempt.scopes, vec!["billing", "extra"]);
        assert_eq!(attempt.role.as_deref(), Some("admin"));
        assert_eq!(attempt.profile["displayName"], "Alice");
    }

    #[tokio::test]
    async fn test_commit_value_backs_missing_getter() {
        let engine = MockEngine::static_outcome(serde_json::json!(false));
        let credentials = Credentials {
            username: "alice".to_string(),
            password: "bad".to_string(),
        };
        let attempt = run_login(&host(engine), &tenant(), &credentials)
            .await
            .unwrap();
        assert!(!attempt.can_login);
    }

    #[tokio::test]
    async fn test_script_failure_propagates() {
        let engine = MockEngine::never_committing();
        let credentials = Credentials {
            username: "alice".to_string(),
            password: "pw".to_string(),
        };
        let err = run_login(&host(engine), &tenant(), &credentials)
            .await
            .unwrap_err();
        assert_eq!(err, ScriptError::NoResults);
    }
}
