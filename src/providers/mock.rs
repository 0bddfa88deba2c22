//! Mock script engine for development and tests.
//!
//! Real deployments plug an interpreter in at process assembly; the mock
//! answers from a fixed outcome table and can simulate the full failure
//! taxonomy (delay, silence, syntax errors).

use crate::providers::engine::{
    CommitMeta, HostBindings, ProviderClass, ScriptEngine, ScriptError, ScriptEvaluation,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

enum MockMode {
    /// Commit a fixed value after the optional delay
    Static {
        value: serde_json::Value,
        meta: Option<CommitMeta>,
    },
    /// Accept any credentials with a non-empty password
    Permissive,
    /// Finish construction without committing
    Silent,
    /// Fail before construction
    SyntaxError(String),
}

/// Configurable mock engine.
pub struct MockEngine {
    mode: MockMode,
    delay: Option<Duration>,
    getters: HashMap<String, serde_json::Value>,
}

impl MockEngine {
    /// Permissive development engine: any username with a non-empty
    /// password logs in, validation always passes.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            mode: MockMode::Permissive,
            delay: None,
            getters: HashMap::new(),
        }
    }

    /// Engine committing a fixed value.
    #[must_use]
    pub fn static_outcome(value: serde_json::Value) -> Self {
        Self {
            mode: MockMode::Static { value, meta: None },
            delay: None,
            getters: HashMap::new(),
        }
    }

    /// Engine that never commits.
    #[must_use]
    pub fn never_committing() -> Self {
        Self {
            mode: MockMode::Silent,
            delay: None,
            getters: HashMap::new(),
        }
    }

    /// Engine failing with a syntax error before construction.
    #[must_use]
    pub fn failing_with_syntax_error(message: impl Into<String>) -> Self {
        Self {
            mode: MockMode::SyntaxError(message.into()),
            delay: None,
            getters: HashMap::new(),
        }
    }

    /// Delay construction by the given duration.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Attach commit metadata to the static outcome.
    #[must_use]
    pub fn with_meta(mut self, meta: CommitMeta) -> Self {
        if let MockMode::Static { meta: slot, .. } = &mut self.mode {
            *slot = Some(meta);
        }
        self
    }

    /// Expose a getter on the evaluated context.
    #[must_use]
    pub fn with_getter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.getters.insert(name.into(), value);
        self
    }
}

struct MockEvaluation {
    getters: HashMap<String, serde_json::Value>,
    task: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl ScriptEvaluation for MockEvaluation {
    async fn finished(&mut self) -> Result<(), ScriptError> {
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| ScriptError::Runtime(e.to_string()))?;
        }
        Ok(())
    }

    async fn getter(&self, name: &str) -> Result<Option<serde_json::Value>, ScriptError> {
        Ok(self.getters.get(name).cloned())
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait::async_trait]
impl ScriptEngine for MockEngine {
    async fn start(
        &self,
        _program: &str,
        class: ProviderClass,
        args: serde_json::Value,
        bindings: HostBindings,
    ) -> Result<Box<dyn ScriptEvaluation>, ScriptError> {
        let (value, meta, getters) = match &self.mode {
            MockMode::SyntaxError(message) => return Err(ScriptError::Syntax(message.clone())),
            MockMode::Silent => (None, None, self.getters.clone()),
            MockMode::Static { value, meta } => {
                (Some(value.clone()), meta.clone(), self.getters.clone())
            }
            MockMode::Permissive => {
                let (value, meta, mut getters) = permissive_outcome(class, &args);
                getters.extend(self.getters.clone());
                (value, meta, getters)
            }
        };

        let delay = self.delay;
        let task = tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(value) = value {
                bindings.commit.commit(value, meta);
            }
        });

        Ok(Box::new(MockEvaluation {
            getters,
            task: Some(task),
        }))
    }
}

fn permissive_outcome(
    class: ProviderClass,
    args: &serde_json::Value,
) -> (
    Option<serde_json::Value>,
    Option<CommitMeta>,
    HashMap<String, serde_json::Value>,
) {
    let mut getters = HashMap::new();
    match class {
        ProviderClass::UserLogin => {
            let username = args
                .get("username")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let can_login = !args
                .get("password")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .is_empty();

            getters.insert("canLogin".to_string(), serde_json::json!(can_login));
            getters.insert(
                "userProfile".to_string(),
                serde_json::json!({ "username": username }),
            );
            getters.insert("scopes".to_string(), serde_json::json!([]));
            (Some(serde_json::json!(can_login)), None, getters)
        }
        ProviderClass::UserValidation => {
            getters.insert("isValid".to_string(), serde_json::json!(true));
            (Some(serde_json::json!(true)), None, getters)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::engine::CommitHandle;

    async fn run(engine: &MockEngine, class: ProviderClass, args: serde_json::Value) -> MockRun {
        let (handle, rx) = CommitHandle::channel();
        let bindings = HostBindings::new(handle, "acme", Duration::from_secs(1));
        let mut evaluation = engine.start("", class, args, bindings).await.unwrap();
        evaluation.finished().await.unwrap();
        MockRun {
            commit: rx.await.ok(),
            evaluation,
        }
    }

    struct MockRun {
        commit: Option<crate::providers::engine::Commit>,
        evaluation: Box<dyn ScriptEvaluation>,
    }

    #[tokio::test]
    async fn test_permissive_accepts_nonempty_password() {
        let engine = MockEngine::permissive();
        let run = run(
            &engine,
            ProviderClass::UserLogin,
            serde_json::json!({ "username": "alice@example.com", "password": "pw" }),
        )
        .await;

        assert!(run.commit.unwrap().is_affirmative());
        assert_eq!(
            run.evaluation.getter("canLogin").await.unwrap(),
            Some(serde_json::json!(true))
        );
    }

    #[tokio::test]
    async fn test_permissive_rejects_empty_password() {
        let engine = MockEngine::permissive();
        let run = run(
            &engine,
            ProviderClass::UserLogin,
            serde_json::json!({ "username": "alice", "password": "" }),
        )
        .await;
        assert!(!run.commit.unwrap().is_affirmative());
    }

    #[tokio::test]
    async fn test_permissive_validation_passes() {
        let engine = MockEngine::permissive();
        let run = run(
            &engine,
            ProviderClass::UserValidation,
            serde_json::json!({ "username": "alice", "subject": "alice" }),
        )
        .await;
        assert!(run.commit.unwrap().is_affirmative());
        assert_eq!(
            run.evaluation.getter("isValid").await.unwrap(),
            Some(serde_json::json!(true))
        );
    }

    #[tokio::test]
    async fn test_silent_engine_never_commits() {
        let engine = MockEngine::never_committing();
        let run = run(&engine, ProviderClass::UserLogin, serde_json::json!({})).await;
        assert!(run.commit.is_none());
    }
}
