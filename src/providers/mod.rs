//! Tenant provider scripts: engine seam, host protocol, outcomes.

pub mod engine;
pub mod host;
pub mod login;
pub mod mock;
pub mod validation;

pub use engine::{
    Commit, CommitHandle, CommitMeta, HostBindings, ProviderClass, ScriptEngine, ScriptError,
    ScriptEvaluation,
};
pub use host::{ProviderHost, ProviderOutcome};
pub use login::{Credentials, LoginAttempt};
pub use mock::MockEngine;
pub use validation::ValidationArgs;
