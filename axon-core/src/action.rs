//! The contract between the engine and concrete outbound actions.
//!
//! The engine never sees a concrete variant: the host wires in a
//! [`ConfigFactory`] for variant defaults and an [`ActionFactory`] that
//! decodes the rendered YAML into a boxed [`Action`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;
use crate::error::ValidationError;

/// Per-invocation context handed to an action. The engine enforces the
/// deadline around the call; variants that drive their own transport should
/// also apply it so a hung connection is torn down cooperatively.
#[derive(Debug, Clone)]
pub struct InvokeContext {
    pub request_id: String,
    pub deadline: Option<Duration>,
}

#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Action: Send + Sync {
    /// The endpoint this action targets.
    fn uri(&self) -> &str;

    /// Declarative field validation, run once after decoding.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Perform the outbound call at most once, honoring cancellation.
    /// The returned value lands in the environment under `response`.
    async fn invoke(&self, ctx: &InvokeContext) -> Result<Value, ActionError>;

    /// Structured log projection of the action.
    fn log_object(&self) -> Value;
}

/// Supplies the variant's configuration defaults (default pre/post
/// conditions).
pub trait ConfigFactory: Send + Sync {
    fn defaults(&self) -> Config;
}

#[derive(Debug, Error)]
pub enum ActionBuildError {
    #[error("failed to parse action as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Decodes a rendered action document into a concrete action with the
/// variant's defaults applied.
pub trait ActionFactory: Send + Sync {
    fn build(&self, rendered: &str) -> Result<Box<dyn Action>, ActionBuildError>;
}
