//! Core job types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use missionai_ai::JobContext;
use missionai_core::{EntityRef, JobId, JobStatus, MissionId, UserId};

/// One request to run a task type against one target entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Scope for concurrency ceilings and notifications.
    pub mission_id: MissionId,
    /// Task type.
    pub use_case_id: String,
    pub entity: EntityRef,

    pub status: JobStatus,
    /// Higher is claimed sooner.
    pub priority: i32,
    /// Earliest eligible claim time (backoff).
    pub not_before: Option<DateTime<Utc>>,
    /// Number of claims so far.
    pub attempt: u32,
    pub max_attempts: u32,

    pub idempotency_key: Option<String>,
    /// Hash of task type + entity. Informational only; never used to deduplicate.
    pub input_fingerprint: String,

    pub model_name: Option<String>,
    pub prompt_version: Option<String>,
    pub created_by: Option<UserId>,

    pub output: Option<JsonValue>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub is_fallback: bool,
    pub processing_time_ms: Option<u64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a caller supplies to enqueue a job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub mission_id: MissionId,
    pub use_case_id: String,
    pub entity: EntityRef,
    pub priority: i32,
    pub max_attempts: u32,
    pub idempotency_key: Option<String>,
    pub created_by: Option<UserId>,
    pub prompt_version: Option<String>,
}

impl Job {
    /// Build a `queued` job.
    pub fn new(new: NewJob, now: DateTime<Utc>) -> Self {
        let input_fingerprint = input_fingerprint(&new.use_case_id, &new.entity);
        Self {
            id: JobId::new(),
            mission_id: new.mission_id,
            use_case_id: new.use_case_id,
            entity: new.entity,
            status: JobStatus::Queued,
            priority: new.priority,
            not_before: None,
            attempt: 0,
            max_attempts: new.max_attempts,
            idempotency_key: new.idempotency_key,
            input_fingerprint,
            model_name: None,
            prompt_version: new.prompt_version,
            created_by: new.created_by,
            output: None,
            error_code: None,
            error_message: None,
            is_fallback: false,
            processing_time_ms: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the job may be claimed at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Queued && self.not_before.map_or(true, |t| t <= now)
    }

    /// Read-only view handed to use-case handlers.
    pub fn to_context(&self) -> JobContext {
        JobContext {
            job_id: self.id,
            mission_id: self.mission_id,
            use_case_id: self.use_case_id.clone(),
            entity: self.entity.clone(),
            attempt: self.attempt,
            max_attempts: self.max_attempts,
            created_by: self.created_by,
        }
    }

    /// Apply the claim transition (`queued → running`, `attempt += 1`).
    pub(crate) fn mark_claimed(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.attempt += 1;
        self.updated_at = now;
    }

    pub(crate) fn mark_requeued(&mut self, not_before: DateTime<Utc>, failure: Option<&JobFailure>, now: DateTime<Utc>) {
        self.status = JobStatus::Queued;
        self.not_before = Some(not_before);
        if let Some(f) = failure {
            self.error_code = Some(f.code.clone());
            self.error_message = Some(f.message.clone());
        }
        self.updated_at = now;
    }

    /// Hand a claim back without counting it as an attempt.
    pub(crate) fn mark_released(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Queued;
        self.attempt = self.attempt.saturating_sub(1);
        self.not_before = Some(now);
        self.updated_at = now;
    }

    pub(crate) fn mark_succeeded(&mut self, completion: &JobCompletion, now: DateTime<Utc>) {
        self.status = JobStatus::Succeeded;
        self.output = Some(completion.output.clone());
        self.is_fallback = completion.is_fallback;
        self.model_name = completion.model_name.clone();
        self.processing_time_ms = Some(completion.processing_time_ms);
        self.error_code = None;
        self.error_message = None;
        self.updated_at = now;
    }

    pub(crate) fn mark_failed(&mut self, failure: &JobFailure, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.error_code = Some(failure.code.clone());
        self.error_message = Some(failure.message.clone());
        self.updated_at = now;
    }

    pub(crate) fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Cancelled;
        self.updated_at = now;
    }
}

/// Hex SHA-256 of `use_case_id|entity_type|entity_id`.
pub fn input_fingerprint(use_case_id: &str, entity: &EntityRef) -> String {
    let mut hasher = Sha256::new();
    hasher.update(use_case_id.as_bytes());
    hasher.update(b"|");
    hasher.update(entity.entity_type.as_bytes());
    hasher.update(b"|");
    hasher.update(entity.id.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Successful outcome written on `running → succeeded`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobCompletion {
    pub output: JsonValue,
    pub is_fallback: bool,
    pub model_name: Option<String>,
    pub processing_time_ms: u64,
}

/// Error code + message recorded on the job row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub code: String,
    pub message: String,
}

impl JobFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Review outcome for one job. At most one per job; immutable once processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResultRecord {
    pub job_id: JobId,
    pub accepted_by: Option<UserId>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<UserId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub applied_action: Option<String>,
    pub before_snapshot: Option<JsonValue>,
    pub after_snapshot: Option<JsonValue>,
    pub affected_entities: Vec<EntityRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobResultRecord {
    pub fn new(job_id: JobId, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            accepted_by: None,
            accepted_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            applied_action: None,
            before_snapshot: None,
            after_snapshot: None,
            affected_entities: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Accepted or rejected already.
    pub fn is_processed(&self) -> bool {
        self.processed_at().is_some()
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.accepted_at.or(self.rejected_at)
    }
}

/// Per-mission job counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MissionJobStats {
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl MissionJobStats {
    pub fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Queued => self.queued += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Succeeded => self.succeeded += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.queued + self.running + self.succeeded + self.failed + self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn new_job(priority: i32) -> NewJob {
        NewJob {
            mission_id: MissionId::new(),
            use_case_id: "report.summarize".to_string(),
            entity: EntityRef::report("r-1"),
            priority,
            max_attempts: 3,
            idempotency_key: None,
            created_by: None,
            prompt_version: None,
        }
    }

    #[test]
    fn new_job_is_queued_with_zero_attempts() {
        let now = Utc::now();
        let job = Job::new(new_job(5), now);

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempt, 0);
        assert!(job.is_eligible(now));
        assert!(!job.is_fallback);
    }

    #[test]
    fn fingerprint_depends_only_on_task_and_entity() {
        let a = input_fingerprint("report.summarize", &EntityRef::report("1"));
        let b = input_fingerprint("report.summarize", &EntityRef::report("1"));
        let c = input_fingerprint("report.cluster", &EntityRef::report("1"));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn not_before_delays_eligibility() {
        let now = Utc::now();
        let mut job = Job::new(new_job(1), now);
        job.mark_claimed(now);
        job.mark_requeued(now + Duration::seconds(5), None, now);

        assert_eq!(job.attempt, 1);
        assert!(!job.is_eligible(now));
        assert!(job.is_eligible(now + Duration::seconds(5)));
    }

    #[test]
    fn success_clears_previous_error() {
        let now = Utc::now();
        let mut job = Job::new(new_job(1), now);
        job.mark_claimed(now);
        job.mark_requeued(now, Some(&JobFailure::new("TIMEOUT", "slow")), now);
        job.mark_claimed(now);
        job.mark_succeeded(
            &JobCompletion {
                output: serde_json::json!({"summary": "ok"}),
                is_fallback: false,
                model_name: Some("m".into()),
                processing_time_ms: 12,
            },
            now,
        );

        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.error_code, None);
        assert_eq!(job.processing_time_ms, Some(12));
    }

    #[test]
    fn result_record_processed_flags() {
        let now = Utc::now();
        let mut r = JobResultRecord::new(JobId::new(), now);
        assert!(!r.is_processed());
        r.rejected_at = Some(now);
        assert!(r.is_processed());
    }
}
