//! Failure classification and retry/backoff/fallback policy.
//!
//! Pure functions: `(attempt, max_attempts, failure) → next state`. The worker
//! draws jitter and applies the resulting transition.

use std::time::Duration;

use missionai_ai::UseCaseError;

/// Upper bound for any computed backoff.
pub const MAX_BACKOFF: Duration = Duration::from_millis(300_000);

const RATE_LIMIT_BASE_MS: u64 = 1_000;
const RETRYABLE_STEP_MS: u64 = 5_000;

/// Upper bound (exclusive) of the random jitter added to rate-limit backoff.
pub const MAX_JITTER: Duration = Duration::from_millis(1_000);

/// How an `execute` failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Provider signalled throughput exhaustion.
    RateLimited { retry_after: Option<Duration> },
    /// Transient provider failure (timeout, 5xx, unavailable).
    Retryable,
    /// Anything else: bad output, missing entity, no credentials.
    NonRetryable,
}

impl ErrorClass {
    pub fn classify(error: &UseCaseError) -> Self {
        match error.provider() {
            Some(p) if p.is_rate_limited() => ErrorClass::RateLimited {
                retry_after: p.retry_after(),
            },
            Some(p) if p.is_retryable() => ErrorClass::Retryable,
            _ => ErrorClass::NonRetryable,
        }
    }

    /// Only rate-limit failures feed the circuit breaker.
    pub fn counts_toward_breaker(&self) -> bool {
        matches!(self, ErrorClass::RateLimited { .. })
    }
}

/// What happens to a running job after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTransition {
    /// Back to `queued`, eligible again after `delay`.
    Requeue { delay: Duration },
    /// Run the local fallback now.
    RunFallback,
    /// `failed`, no further attempts.
    TerminalFail,
}

/// Which step of the dispatch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Execute(ErrorClass),
    Fallback,
}

/// Decide the next state of a job that failed at `attempt` (1-based).
///
/// - rate-limited, attempts left: exponential backoff with jitter
/// - retryable, attempts left: linear backoff
/// - attempts exhausted or non-retryable: fallback
/// - fallback failed: terminal
pub fn next_state(attempt: u32, max_attempts: u32, stage: FailureStage, jitter: Duration) -> JobTransition {
    let exhausted = attempt >= max_attempts;
    match stage {
        FailureStage::Fallback => JobTransition::TerminalFail,
        FailureStage::Execute(_) if exhausted => JobTransition::RunFallback,
        FailureStage::Execute(ErrorClass::RateLimited { retry_after }) => JobTransition::Requeue {
            delay: rate_limited_backoff(attempt, jitter, retry_after),
        },
        FailureStage::Execute(ErrorClass::Retryable) => JobTransition::Requeue {
            delay: retryable_backoff(attempt),
        },
        FailureStage::Execute(ErrorClass::NonRetryable) => JobTransition::RunFallback,
    }
}

/// `min(max(1000ms × 2^attempt + jitter, retry_after), 300000ms)`.
pub fn rate_limited_backoff(attempt: u32, jitter: Duration, retry_after: Option<Duration>) -> Duration {
    let exp_ms = RATE_LIMIT_BASE_MS.saturating_mul(2u64.saturating_pow(attempt));
    let jitter_ms = jitter.min(MAX_JITTER).as_millis() as u64;
    let computed = Duration::from_millis(exp_ms.saturating_add(jitter_ms));
    let floored = match retry_after {
        Some(hint) => computed.max(hint),
        None => computed,
    };
    floored.min(MAX_BACKOFF)
}

/// `5000ms × attempt`, capped.
pub fn retryable_backoff(attempt: u32) -> Duration {
    Duration::from_millis(RETRYABLE_STEP_MS.saturating_mul(attempt as u64)).min(MAX_BACKOFF)
}

/// Random jitter in `[0, MAX_JITTER)`.
pub fn random_jitter() -> Duration {
    use rand::Rng;
    Duration::from_millis(rand::thread_rng().gen_range(0..MAX_JITTER.as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use missionai_ai::ProviderError;
    use proptest::prelude::*;

    use super::*;

    const NO_JITTER: Duration = Duration::ZERO;

    #[test]
    fn classify_provider_errors() {
        let rl = UseCaseError::from(ProviderError::rate_limited("429", Some(Duration::from_secs(60))));
        assert_eq!(
            ErrorClass::classify(&rl),
            ErrorClass::RateLimited {
                retry_after: Some(Duration::from_secs(60))
            }
        );
        assert_eq!(ErrorClass::classify(&ProviderError::Timeout.into()), ErrorClass::Retryable);
        assert_eq!(
            ErrorClass::classify(&ProviderError::api(503, "x").into()),
            ErrorClass::Retryable
        );
        assert_eq!(
            ErrorClass::classify(&ProviderError::validation("x").into()),
            ErrorClass::NonRetryable
        );
        assert_eq!(
            ErrorClass::classify(&UseCaseError::InvalidInput("x".into())),
            ErrorClass::NonRetryable
        );
    }

    #[test]
    fn only_rate_limits_count_toward_breaker() {
        assert!(ErrorClass::RateLimited { retry_after: None }.counts_toward_breaker());
        assert!(!ErrorClass::Retryable.counts_toward_breaker());
        assert!(!ErrorClass::NonRetryable.counts_toward_breaker());
    }

    #[test]
    fn retryable_requeues_with_linear_backoff() {
        let t = next_state(2, 3, FailureStage::Execute(ErrorClass::Retryable), NO_JITTER);
        assert_eq!(t, JobTransition::Requeue { delay: Duration::from_millis(10_000) });
    }

    #[test]
    fn exhausted_attempts_run_fallback() {
        for class in [
            ErrorClass::Retryable,
            ErrorClass::RateLimited { retry_after: None },
            ErrorClass::NonRetryable,
        ] {
            assert_eq!(next_state(3, 3, FailureStage::Execute(class), NO_JITTER), JobTransition::RunFallback);
        }
    }

    #[test]
    fn non_retryable_runs_fallback_immediately() {
        let t = next_state(1, 3, FailureStage::Execute(ErrorClass::NonRetryable), NO_JITTER);
        assert_eq!(t, JobTransition::RunFallback);
    }

    #[test]
    fn fallback_failure_is_terminal() {
        assert_eq!(next_state(1, 3, FailureStage::Fallback, NO_JITTER), JobTransition::TerminalFail);
    }

    #[test]
    fn rate_limited_backoff_formula() {
        assert_eq!(rate_limited_backoff(1, NO_JITTER, None), Duration::from_millis(2_000));
        assert_eq!(
            rate_limited_backoff(3, Duration::from_millis(250), None),
            Duration::from_millis(8_250)
        );
        assert_eq!(rate_limited_backoff(20, NO_JITTER, None), MAX_BACKOFF);
        assert_eq!(rate_limited_backoff(u32::MAX, NO_JITTER, None), MAX_BACKOFF);
    }

    #[test]
    fn retry_after_is_a_floor_but_still_capped() {
        assert_eq!(
            rate_limited_backoff(1, NO_JITTER, Some(Duration::from_secs(60))),
            Duration::from_secs(60)
        );
        assert_eq!(
            rate_limited_backoff(1, NO_JITTER, Some(Duration::from_secs(3_600))),
            MAX_BACKOFF
        );
    }

    #[test]
    fn random_jitter_stays_in_range() {
        for _ in 0..100 {
            assert!(random_jitter() < MAX_JITTER);
        }
    }

    proptest! {
        #[test]
        fn rate_limited_backoff_is_monotonic(
            k in 0u32..40,
            j1 in 0u64..1_000,
            j2 in 0u64..1_000,
        ) {
            let a = rate_limited_backoff(k, Duration::from_millis(j1), None);
            let b = rate_limited_backoff(k + 1, Duration::from_millis(j2), None);
            prop_assert!(a <= b, "backoff({}) = {:?} > backoff({}) = {:?}", k, a, k + 1, b);
            prop_assert!(b <= MAX_BACKOFF);
        }

        #[test]
        fn retryable_backoff_is_monotonic(k in 0u32..1_000) {
            prop_assert!(retryable_backoff(k) <= retryable_backoff(k + 1));
        }
    }
}
