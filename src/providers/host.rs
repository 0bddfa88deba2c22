//! Provider host protocol.
//!
//! One isolated engine invocation per login attempt: load the tenant's
//! concatenated sources, construct the requested class, race the one-shot
//! commit against a wall-clock timer, then read getters from the winner.

use crate::entities::Tenant;
use crate::providers::engine::{
    Commit, CommitHandle, HostBindings, ProviderClass, ScriptEngine, ScriptError, ScriptEvaluation,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Runs tenant provider scripts under a timeout.
pub struct ProviderHost {
    engine: Arc<dyn ScriptEngine>,
    timeout: Duration,
}

/// A committed script run; getters stay readable on the evaluated context.
pub struct ProviderOutcome {
    /// The surfaced decision
    pub commit: Commit,
    evaluation: Box<dyn ScriptEvaluation>,
}

impl std::fmt::Debug for ProviderOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderOutcome")
            .field("commit", &self.commit)
            .finish_non_exhaustive()
    }
}

enum Raced {
    Commit(Commit),
    Finished(Result<(), ScriptError>),
    TimedOut,
}

impl ProviderHost {
    /// Create a host over the given engine.
    #[must_use]
    pub fn new(engine: Arc<dyn ScriptEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    /// Whether the tenant ships any provider sources.
    #[must_use]
    pub fn tenant_has_providers(tenant: &Tenant) -> bool {
        tenant.providers.iter().any(|s| !s.trim().is_empty())
    }

    /// Run one provider invocation to its commit.
    ///
    /// # Errors
    ///
    /// `Syntax` before construction, `Timeout` when the timer wins,
    /// `NoResults` when construction finishes without a commit.
    pub async fn run(
        &self,
        tenant: &Tenant,
        class: ProviderClass,
        args: serde_json::Value,
    ) -> Result<ProviderOutcome, ScriptError> {
        let program = tenant.providers.join("\n");
        let (handle, mut rx) = CommitHandle::channel();
        let bindings = HostBindings::new(handle, tenant.name.clone(), self.timeout);

        let mut evaluation = self
            .engine
            .start(&program, class, args, bindings)
            .await?;

        let raced = {
            let finished = evaluation.finished();
            tokio::pin!(finished);
            tokio::select! {
                commit = &mut rx => match commit {
                    Ok(commit) => Raced::Commit(commit),
                    Err(_) => Raced::Finished(Ok(())),
                },
                result = &mut finished => Raced::Finished(result),
                () = tokio::time::sleep(self.timeout) => Raced::TimedOut,
            }
        };

        match raced {
            Raced::Commit(commit) => {
                debug!(tenant = %tenant.name, class = class.name(), "Provider committed");
                Ok(ProviderOutcome {
                    commit,
                    evaluation,
                })
            }
            Raced::Finished(Ok(())) => match rx.try_recv() {
                Ok(commit) => Ok(ProviderOutcome {
                    commit,
                    evaluation,
                }),
                Err(_) => Err(ScriptError::NoResults),
            },
            Raced::Finished(Err(e)) => Err(e),
            Raced::TimedOut => {
                evaluation.cancel();
                debug!(tenant = %tenant.name, class = class.name(), "Provider timed out");
                Err(ScriptError::Timeout)
            }
        }
    }
}

impl ProviderOutcome {
    /// Read a boolean getter.
    ///
    /// # Errors
    ///
    /// `PropertyCast` when present with another type.
    pub async fn getter_bool(&self, name: &str) -> Result<Option<bool>, ScriptError> {
        match self.evaluation.getter(name).await? {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::Bool(b)) => Ok(Some(b)),
            Some(_) => Err(ScriptError::PropertyCast(name.to_string())),
        }
    }

    /// Read a string getter.
    ///
    /// # Errors
    ///
    /// `PropertyCast` when present with another type.
    pub async fn getter_string(&self, name: &str) -> Result<Option<String>, ScriptError> {
        match self.evaluation.getter(name).await? {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(ScriptError::PropertyCast(name.to_string())),
        }
    }

    /// Read a string-list getter.
    ///
    /// # Errors
    ///
    /// `PropertyCast` when present with another shape.
    pub async fn getter_string_list(&self, name: &str) -> Result<Vec<String>, ScriptError> {
        match self.evaluation.getter(name).await? {
            None | Some(serde_json::Value::Null) => Ok(Vec::new()),
            Some(serde_json::Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => Ok(s),
                    _ => Err(ScriptError::PropertyCast(name.to_string())),
                })
                .collect(),
            Some(_) => Err(ScriptError::PropertyCast(name.to_string())),
        }
    }

    /// Read an opaque getter verbatim (the profile object).
    ///
    /// # Errors
    ///
    /// Only engine failures; any JSON shape is accepted.
    pub async fn getter_value(&self, name: &str) -> Result<serde_json::Value, ScriptError> {
        Ok(self
            .evaluation
            .getter(name)
            .await?
            .unwrap_or(serde_json::Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Tenant, TenantConfig};
    use crate::providers::mock::MockEngine;

    fn tenant_with_provider() -> Tenant {
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
    async fn test_commit_wins() {
        let engine = MockEngine::static_outcome(serde_json::json!(true))
            .with_getter("canLogin", serde_json::json!(true));
        let outcome = host(engine)
            .run(
                &tenant_with_provider(),
                ProviderClass::UserLogin,
                serde_json::json!({}),
            )
            .await
            .unwrap();

        assert!(outcome.commit.is_affirmative());
        assert_eq!(outcome.getter_bool("canLogin").await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_timer_wins_over_slow_script() {
        let engine = MockEngine::static_outcome(serde_json::json!(true))
            .with_delay(Duration::from_secs(5));
        let err = host(engine)
            .run(
                &tenant_with_provider(),
                ProviderClass::UserLogin,
                serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert_eq!(err, ScriptError::Timeout);
    }

    #[tokio::test]
    async fn test_missing_commit_is_no_results() {
        let engine = MockEngine::never_committing();
        let err = host(engine)
            .run(
                &tenant_with_provider(),
                ProviderClass::UserLogin,
                serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert_eq!(err, ScriptError::NoResults);
    }

    #[tokio::test]
    async fn test_syntax_error_surfaces_before_construction() {
        let engine = MockEngine::failing_with_syntax_error("unexpected token");
        let err = host(engine)
            .run(
                &tenant_with_provider(),
                ProviderClass::UserLogin,
                serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::Syntax(_)));
    }

    #[tokio::test]
    async fn test_property_cast_on_wrong_getter_type() {
        let engine = MockEngine::static_outcome(serde_json::json!(true))
            .with_getter("canLogin", serde_json::json!("yes"));
        let outcome = host(engine)
            .run(
                &tenant_with_provider(),
                ProviderClass::UserLogin,
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let err = outcome.getter_bool("canLogin").await.unwrap_err();
        assert_eq!(err, ScriptError::PropertyCast("canLogin".to_string()));
    }
}
