use serde_json::Value as JsonValue;

use crate::context::JobContext;
use crate::error::UseCaseError;

/// Output of a successful `execute`.
#[derive(Debug, Clone, PartialEq)]
pub struct UseCaseOutput {
    pub output: JsonValue,
    pub model_name: Option<String>,
}

impl UseCaseOutput {
    pub fn new(output: JsonValue) -> Self {
        Self {
            output,
            model_name: None,
        }
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }
}

/// Handler for one task type.
///
/// - `execute` may call the AI provider and may fail with any [`UseCaseError`].
/// - `fallback` must use only locally derivable heuristics (no provider call).
///   It fails only when its inputs cannot be read (e.g. missing entity).
pub trait UseCase: Send + Sync {
    /// Task-type identifier this handler is registered under.
    fn id(&self) -> &str;

    fn prompt_version(&self) -> &str {
        "v1"
    }

    fn execute(&self, job: &JobContext) -> Result<UseCaseOutput, UseCaseError>;

    fn fallback(&self, job: &JobContext) -> Result<JsonValue, UseCaseError>;
}
