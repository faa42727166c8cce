use std::time::Duration;

use thiserror::Error;

use missionai_core::EntityRef;

/// Failure reported by the AI provider.
///
/// Each variant maps to a stable code recorded on the job row.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Throughput exhausted; `retry_after` is the provider's suggested delay.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("provider request timed out")]
    Timeout,

    #[error("provider service unavailable")]
    ServiceUnavailable,

    /// Output was empty, unparseable, or missing a schema-required field.
    #[error("output validation failed: {0}")]
    ValidationFailed(String),

    #[error("provider not configured")]
    NotConfigured,

    #[error("provider api error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("provider request failed: {0}")]
    Unknown(String),
}

impl ProviderError {
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::RateLimited { .. } => "RATE_LIMITED",
            ProviderError::Timeout => "TIMEOUT",
            ProviderError::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ProviderError::ValidationFailed(_) => "VALIDATION_FAILED",
            ProviderError::NotConfigured => "NOT_CONFIGURED",
            ProviderError::ApiError { .. } => "API_ERROR",
            ProviderError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }

    /// Transient failures worth another attempt after a delay.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::Timeout
            | ProviderError::ServiceUnavailable => true,
            ProviderError::ApiError { status, .. } => *status >= 500,
            ProviderError::ValidationFailed(_)
            | ProviderError::NotConfigured
            | ProviderError::Unknown(_) => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Failure of a use-case `execute` or `fallback` call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UseCaseError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("entity not found: {0}")]
    EntityNotFound(EntityRef),

    #[error("invalid job input: {0}")]
    InvalidInput(String),

    #[error("entity source error: {0}")]
    Source(String),

    /// The handler panicked; the message is the panic payload when it is text.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl UseCaseError {
    pub fn code(&self) -> &'static str {
        match self {
            UseCaseError::Provider(e) => e.code(),
            UseCaseError::EntityNotFound(_) => "ENTITY_NOT_FOUND",
            UseCaseError::InvalidInput(_) => "INVALID_INPUT",
            UseCaseError::Source(_) => "SOURCE_ERROR",
            UseCaseError::Panicked(_) => "HANDLER_PANICKED",
        }
    }

    pub fn provider(&self) -> Option<&ProviderError> {
        match self {
            UseCaseError::Provider(e) => Some(e),
            _ => None,
        }
    }
}

impl From<crate::reports::ReadError> for UseCaseError {
    fn from(value: crate::reports::ReadError) -> Self {
        UseCaseError::Source(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_retry_only_on_server_side_status() {
        assert!(ProviderError::api(502, "bad gateway").is_retryable());
        assert!(!ProviderError::api(400, "bad request").is_retryable());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ProviderError::Timeout.code(), "TIMEOUT");
        assert_eq!(ProviderError::NotConfigured.code(), "NOT_CONFIGURED");
        assert_eq!(
            UseCaseError::from(ProviderError::validation("missing field")).code(),
            "VALIDATION_FAILED"
        );
    }

    #[test]
    fn only_rate_limits_carry_retry_after() {
        let rl = ProviderError::rate_limited("slow down", Some(Duration::from_secs(60)));
        assert!(rl.is_rate_limited());
        assert_eq!(rl.retry_after(), Some(Duration::from_secs(60)));
        assert_eq!(ProviderError::ServiceUnavailable.retry_after(), None);
        assert!(!ProviderError::ValidationFailed("x".into()).is_retryable());
    }
}
