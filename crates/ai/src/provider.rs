//! AI provider boundary.
//!
//! The provider turns a prompt plus an output schema into structured JSON.
//! Transport, model selection and request timeouts are the implementation's
//! concern; the queue only sees [`ProviderResponse`] or a classified
//! [`ProviderError`].

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use crate::error::ProviderError;

/// One structured-output request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub use_case_id: String,
    pub prompt: String,
    /// JSON-schema-like object; only `required` is checked locally.
    pub schema: JsonValue,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub output: JsonValue,
    pub model_name: String,
    pub processing_time_ms: u64,
}

pub trait AiProvider: Send + Sync {
    fn run(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}

impl<T: AiProvider + ?Sized> AiProvider for std::sync::Arc<T> {
    fn run(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        (**self).run(request)
    }
}

/// Check that `output` is an object carrying every field in `schema.required`.
pub fn check_required_fields(output: &JsonValue, schema: &JsonValue) -> Result<(), ProviderError> {
    let Some(required) = schema.get("required").and_then(JsonValue::as_array) else {
        return Ok(());
    };

    let obj = output
        .as_object()
        .ok_or_else(|| ProviderError::validation("response is not a JSON object"))?;

    for field in required.iter().filter_map(JsonValue::as_str) {
        if !obj.contains_key(field) {
            tracing::warn!(field, "provider output missing required field");
            return Err(ProviderError::validation(format!("missing required field '{field}'")));
        }
    }
    Ok(())
}

/// Provider used when no API credentials are configured.
///
/// Every call fails with `NOT_CONFIGURED`, which routes jobs to their fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredProvider;

impl AiProvider for UnconfiguredProvider {
    fn run(&self, _request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured)
    }
}

/// Provider that replays scripted outcomes in order (dev/test harness).
///
/// When the script runs out, it keeps returning `default` (or `NotConfigured`).
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<JsonValue, ProviderError>>>,
    default: Option<JsonValue>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every unscripted call with `output`.
    pub fn always(output: JsonValue) -> Self {
        Self {
            default: Some(output),
            ..Self::default()
        }
    }

    pub fn push_ok(&self, output: JsonValue) -> &Self {
        self.script.lock().push_back(Ok(output));
        self
    }

    pub fn push_err(&self, error: ProviderError) -> &Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().clone()
    }
}

impl AiProvider for ScriptedProvider {
    fn run(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().push(request.clone());

        let next = self.script.lock().pop_front();
        let output = match next {
            Some(outcome) => outcome?,
            None => self.default.clone().ok_or(ProviderError::NotConfigured)?,
        };

        check_required_fields(&output, &request.schema)?;

        Ok(ProviderResponse {
            output,
            model_name: "scripted".to_string(),
            processing_time_ms: 0,
        })
    }
}
