//! Job submission, cancellation and inspection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use missionai_auth::{AuthzError, Principal, authorize};
use missionai_core::{DomainError, EntityRef, JobId, JobStatus, MissionId};
use missionai_events::{EventNotifier, JobEvent};

use crate::config::QueueConfig;

use super::circuit_breaker::CircuitBreaker;
use super::store::{JobStore, JobStoreError};
use super::types::{Job, MissionJobStats, NewJob};

/// A caller's request to enqueue one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub use_case_id: String,
    pub mission_id: MissionId,
    pub entity: EntityRef,
    /// Defaults to the task type's configured priority.
    pub priority: Option<i32>,
    pub idempotency_key: Option<String>,
}

impl SubmitRequest {
    pub fn new(use_case_id: impl Into<String>, mission_id: MissionId, entity: EntityRef) -> Self {
        Self {
            use_case_id: use_case_id.into(),
            mission_id,
            entity,
            priority: None,
            idempotency_key: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub job_id: JobId,
    pub status: JobStatus,
    /// `queue depth × per-job estimate`; a heuristic, not a promise.
    pub estimated_wait: Duration,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    InsufficientPrivilege(#[from] AuthzError),

    #[error("AI temporarily unavailable for '{use_case_id}', retry in {}s", remaining_cooldown.as_secs())]
    AiUnavailable {
        use_case_id: String,
        remaining_cooldown: Duration,
    },

    #[error("duplicate job: idempotency key already used by {existing}")]
    DuplicateJob { existing: JobId },

    #[error("job {job_id} cannot be cancelled in status {status}")]
    CannotCancel { job_id: JobId, status: JobStatus },

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("unknown use case '{0}'")]
    UnknownUseCase(String),

    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error("job store error: {0}")]
    Store(JobStoreError),
}

impl SubmitError {
    pub fn code(&self) -> &'static str {
        match self {
            SubmitError::InsufficientPrivilege(e) => e.code(),
            SubmitError::AiUnavailable { .. } => "AI_UNAVAILABLE",
            SubmitError::DuplicateJob { .. } => "DUPLICATE_JOB",
            SubmitError::CannotCancel { .. } => "CANNOT_CANCEL",
            SubmitError::JobNotFound(_) => "JOB_NOT_FOUND",
            SubmitError::UnknownUseCase(_) => "UNKNOWN_USE_CASE",
            SubmitError::Invalid(_) => "INVALID_REQUEST",
            SubmitError::Store(_) => "STORE_ERROR",
        }
    }
}

impl From<JobStoreError> for SubmitError {
    fn from(value: JobStoreError) -> Self {
        match value {
            JobStoreError::DuplicateIdempotencyKey { existing, .. } => SubmitError::DuplicateJob { existing },
            JobStoreError::NotFound(id) => SubmitError::JobNotFound(id),
            JobStoreError::InvalidTransition { job_id, from, .. } => SubmitError::CannotCancel { job_id, status: from },
            other => SubmitError::Store(other),
        }
    }
}

/// Entry point for callers creating and managing jobs.
pub struct SubmissionService<S, N> {
    store: S,
    breaker: Arc<CircuitBreaker>,
    notifier: N,
    config: Arc<QueueConfig>,
}

impl<S, N> SubmissionService<S, N>
where
    S: JobStore,
    N: EventNotifier,
{
    pub fn new(store: S, breaker: Arc<CircuitBreaker>, notifier: N, config: Arc<QueueConfig>) -> Self {
        Self {
            store,
            breaker,
            notifier,
            config,
        }
    }

    /// Validate and enqueue a job.
    ///
    /// Checks, in order: task type configured, caller privilege, breaker
    /// closed, idempotency key unused.
    pub fn submit(&self, principal: &Principal, request: SubmitRequest) -> Result<SubmitReceipt, SubmitError> {
        let uc = self
            .config
            .use_case(&request.use_case_id)
            .ok_or_else(|| SubmitError::UnknownUseCase(request.use_case_id.clone()))?;

        authorize(principal, uc.min_level)?;
        request.entity.validate()?;

        if let Some(remaining) = self.breaker.remaining_cooldown(&request.use_case_id) {
            warn!(
                use_case = %request.use_case_id,
                remaining_secs = remaining.as_secs(),
                "submission refused: circuit breaker open"
            );
            return Err(SubmitError::AiUnavailable {
                use_case_id: request.use_case_id,
                remaining_cooldown: remaining,
            });
        }

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self.store.find_by_idempotency_key(key)? {
                return Err(SubmitError::DuplicateJob { existing: existing.id });
            }
        }

        let job = Job::new(
            NewJob {
                mission_id: request.mission_id,
                use_case_id: request.use_case_id,
                entity: request.entity,
                priority: request.priority.unwrap_or(uc.default_priority),
                max_attempts: uc.max_attempts,
                idempotency_key: request.idempotency_key,
                created_by: Some(principal.user_id),
                prompt_version: None,
            },
            Utc::now(),
        );
        let job = self.store.insert(job)?;

        info!(
            job_id = %job.id,
            mission_id = %job.mission_id,
            use_case = %job.use_case_id,
            priority = job.priority,
            "job queued"
        );

        self.notifier.notify(
            job.mission_id,
            JobEvent::Queued {
                job_id: job.id,
                use_case_id: job.use_case_id.clone(),
                entity: job.entity.clone(),
                priority: job.priority,
            },
        );

        let depth = self.store.queue_depth()?;
        Ok(SubmitReceipt {
            job_id: job.id,
            status: job.status,
            estimated_wait: estimate_wait(self.config.global.per_job_estimate(), depth),
        })
    }

    /// Cancel a job that has not been claimed yet.
    ///
    /// Allowed for the job's creator or anyone at the configured cancel level.
    pub fn cancel(&self, principal: &Principal, job_id: JobId) -> Result<Job, SubmitError> {
        let job = self.store.get(job_id)?.ok_or(SubmitError::JobNotFound(job_id))?;

        if job.created_by != Some(principal.user_id) {
            authorize(principal, self.config.global.cancel_min_level)?;
        }
        if job.status != JobStatus::Queued {
            return Err(SubmitError::CannotCancel {
                job_id,
                status: job.status,
            });
        }

        let job = self.store.cancel(job_id, Utc::now())?;
        info!(job_id = %job.id, mission_id = %job.mission_id, user_id = %principal.user_id, "job cancelled");

        self.notifier.notify(
            job.mission_id,
            JobEvent::Updated {
                job_id: job.id,
                status: job.status,
                attempt: job.attempt,
                estimated_complete_at: None,
            },
        );
        Ok(job)
    }

    pub fn get(&self, job_id: JobId) -> Result<Option<Job>, SubmitError> {
        Ok(self.store.get(job_id)?)
    }

    pub fn list_by_mission(
        &self,
        mission_id: MissionId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, SubmitError> {
        Ok(self.store.list_by_mission(mission_id, status, limit)?)
    }

    pub fn mission_stats(&self, mission_id: MissionId) -> Result<MissionJobStats, SubmitError> {
        Ok(self.store.mission_stats(mission_id)?)
    }

    pub fn queue_depth(&self) -> Result<usize, SubmitError> {
        Ok(self.store.queue_depth()?)
    }
}

/// `per_job × depth`, saturating instead of overflowing.
fn estimate_wait(per_job: Duration, depth: usize) -> Duration {
    per_job.saturating_mul(u32::try_from(depth).unwrap_or(u32::MAX))
}
