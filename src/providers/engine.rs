//! Script engine seam and host-side bindings.
//!
//! The interpreter itself is an external collaborator; everything it needs
//! from the process (the one-shot `commit`, log sinks, digests, outbound
//! HTTP) is handed over through `HostBindings`.

use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Provider classes a script must define.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderClass {
    /// Answers "can this user log in?"
    UserLogin,
    /// Answers "is this user still valid?"
    UserValidation,
}

impl ProviderClass {
    /// Class name the script must export.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::UserLogin => "UserLoginProvider",
            Self::UserValidation => "UserValidationProvider",
        }
    }
}

/// Script execution failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// Program failed to parse before construction
    #[error("Script syntax error: {0}")]
    Syntax(String),
    /// Wall-clock budget exhausted
    #[error("Script timed out")]
    Timeout,
    /// Construction finished without calling commit
    #[error("Script produced no results")]
    NoResults,
    /// A getter held a value of the wrong type
    #[error("Property {0} has unexpected type")]
    PropertyCast(String),
    /// Runtime failure inside the script
    #[error("Script runtime error: {0}")]
    Runtime(String),
}

/// Metadata a script may attach to its commit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitMeta {
    /// Subject override
    #[serde(default)]
    pub subject: Option<String>,
    /// Provider-supplied scopes
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

/// The decision a script surfaces exactly once.
#[derive(Debug, Clone)]
pub struct Commit {
    /// Boolean or object value
    pub value: serde_json::Value,
    /// Optional metadata
    pub meta: Option<CommitMeta>,
}

impl Commit {
    /// Interpret the committed value as a positive decision.
    #[must_use]
    pub fn is_affirmative(&self) -> bool {
        match &self.value {
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::Object(_) => true,
            _ => false,
        }
    }
}

/// One-shot commit callback handed to the engine.
///
/// The second and every further call is ignored.
pub struct CommitHandle {
    tx: Mutex<Option<oneshot::Sender<Commit>>>,
}

impl CommitHandle {
    /// Create the handle and its receiving end.
    #[must_use]
    pub fn channel() -> (Arc<Self>, oneshot::Receiver<Commit>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    /// Surface the script's decision. True on the first call only.
    pub fn commit(&self, value: serde_json::Value, meta: Option<CommitMeta>) -> bool {
        match self.tx.lock().take() {
            Some(tx) => tx.send(Commit { value, meta }).is_ok(),
            None => false,
        }
    }
}

/// Leveled log sink for `say` / `console.log` / `console.error`.
#[derive(Clone)]
pub struct ScriptConsole {
    tenant: String,
}

impl ScriptConsole {
    /// Log at info level (`say`).
    pub fn say(&self, message: &str) {
        tracing::info!(tenant = %self.tenant, origin = "provider", "{message}");
    }

    /// Log at debug level (`console.log`).
    pub fn log(&self, message: &str) {
        tracing::debug!(tenant = %self.tenant, origin = "provider", "{message}");
    }

    /// Log at error level (`console.error`).
    pub fn error(&self, message: &str) {
        tracing::error!(tenant = %self.tenant, origin = "provider", "{message}");
    }
}

/// Deadline-bound outbound HTTP for scripts (`fetch`).
#[derive(Clone)]
pub struct ScriptHttp {
    client: reqwest::Client,
    deadline: Duration,
}

impl ScriptHttp {
    /// Async GET returning the response body.
    ///
    /// # Errors
    ///
    /// `Runtime` on transport failure or deadline overrun.
    pub async fn get(&self, url: &str) -> Result<String, ScriptError> {
        let response = self
            .client
            .get(url)
            .timeout(self.deadline)
            .send()
            .await
            .map_err(|e| ScriptError::Runtime(format!("fetch failed: {e}")))?;
        response
            .text()
            .await
            .map_err(|e| ScriptError::Runtime(format!("fetch failed: {e}")))
    }

    /// Async POST with a JSON body, returning the response body.
    ///
    /// # Errors
    ///
    /// `Runtime` on transport failure or deadline overrun.
    pub async fn post(&self, url: &str, body: &serde_json::Value) -> Result<String, ScriptError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .timeout(self.deadline)
            .send()
            .await
            .map_err(|e| ScriptError::Runtime(format!("fetch failed: {e}")))?;
        response
            .text()
            .await
            .map_err(|e| ScriptError::Runtime(format!("fetch failed: {e}")))
    }
}

/// MD5 hex digest helper exposed to scripts.
#[must_use]
pub fn md5_hex(input: &str) -> String {
    use md5::{Digest, Md5};
    hex(&Md5::digest(input.as_bytes()))
}

/// SHA-256 hex digest helper exposed to scripts.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    hex(&Sha256::digest(input.as_bytes()))
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Everything the host hands to the engine for one invocation.
#[derive(Clone)]
pub struct HostBindings {
    /// One-shot commit callback
    pub commit: Arc<CommitHandle>,
    /// Leveled log sink
    pub console: ScriptConsole,
    /// Outbound HTTP
    pub http: ScriptHttp,
}

impl HostBindings {
    /// Assemble bindings for one invocation.
    #[must_use]
    pub fn new(commit: Arc<CommitHandle>, tenant: impl Into<String>, deadline: Duration) -> Self {
        Self {
            commit,
            console: ScriptConsole {
                tenant: tenant.into(),
            },
            http: ScriptHttp {
                client: reqwest::Client::new(),
                deadline,
            },
        }
    }
}

/// The sandboxed interpreter boundary.
#[async_trait::async_trait]
pub trait ScriptEngine: Send + Sync {
    /// Load the concatenated program sources and begin constructing the
    /// requested class with the given arguments. Syntax errors surface
    /// here, before construction.
    async fn start(
        &self,
        program: &str,
        class: ProviderClass,
        args: serde_json::Value,
        bindings: HostBindings,
    ) -> Result<Box<dyn ScriptEvaluation>, ScriptError>;
}

/// A running class construction inside the engine.
#[async_trait::async_trait]
pub trait ScriptEvaluation: Send + Sync {
    /// Wait until the constructor finishes.
    async fn finished(&mut self) -> Result<(), ScriptError>;

    /// Read a getter from the evaluated context.
    async fn getter(&self, name: &str) -> Result<Option<serde_json::Value>, ScriptError>;

    /// Cancel the evaluation.
    fn cancel(&mut self);
}
