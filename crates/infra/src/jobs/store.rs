//! Job storage: the single source of truth for job state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use missionai_core::{JobId, JobStatus, MissionId};

use super::types::{Job, JobCompletion, JobFailure, JobResultRecord, MissionJobStats};

/// Job store abstraction.
///
/// Every state-changing method checks the lifecycle transition atomically
/// against the stored row, so concurrent writers (several schedulers, a
/// cancelling user) cannot move a job backwards.
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with `DuplicateIdempotencyKey` when another job
    /// already holds the same key.
    fn insert(&self, job: Job) -> Result<Job, JobStoreError>;

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>, JobStoreError>;

    /// Atomically claim up to `limit` eligible jobs, ordered by
    /// `priority DESC, created_at ASC`, marking each `running` with
    /// `attempt += 1`. A job is returned by at most one concurrent caller.
    fn claim_batch(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError>;

    /// `running → queued` with a new `not_before`.
    fn requeue(
        &self,
        job_id: JobId,
        not_before: DateTime<Utc>,
        failure: Option<&JobFailure>,
        now: DateTime<Utc>,
    ) -> Result<Job, JobStoreError>;

    /// `running → queued` with `not_before = now`, undoing the claim's
    /// attempt increment. Used when a claimed job is refused a rate-limit slot:
    /// unlike a failed run, a refused slot does not consume an attempt.
    fn release(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobStoreError>;

    /// `running → succeeded`.
    fn complete(&self, job_id: JobId, completion: &JobCompletion, now: DateTime<Utc>) -> Result<Job, JobStoreError>;

    /// `running → failed`.
    fn fail(&self, job_id: JobId, failure: &JobFailure, now: DateTime<Utc>) -> Result<Job, JobStoreError>;

    /// `queued → cancelled`.
    fn cancel(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobStoreError>;

    /// Number of `queued` jobs (eligible or backing off).
    fn queue_depth(&self) -> Result<usize, JobStoreError>;

    /// Jobs of one mission, newest first.
    fn list_by_mission(
        &self,
        mission_id: MissionId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError>;

    fn mission_stats(&self, mission_id: MissionId) -> Result<MissionJobStats, JobStoreError>;

    fn get_result(&self, job_id: JobId) -> Result<Option<JobResultRecord>, JobStoreError>;

    /// Insert or replace the result row of a job. A row that is already
    /// accepted or rejected is never replaced (`AlreadyProcessed`), so the
    /// first review to commit wins across every process sharing the store.
    fn save_result(&self, record: JobResultRecord) -> Result<(), JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("idempotency key '{key}' already used by job {existing}")]
    DuplicateIdempotencyKey { key: String, existing: JobId },
    #[error("job {job_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("result of job {job_id} already processed at {processed_at}")]
    AlreadyProcessed {
        job_id: JobId,
        processed_at: DateTime<Utc>,
    },
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn insert(&self, job: Job) -> Result<Job, JobStoreError> {
        (**self).insert(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>, JobStoreError> {
        (**self).find_by_idempotency_key(key)
    }

    fn claim_batch(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError> {
        (**self).claim_batch(limit, now)
    }

    fn requeue(
        &self,
        job_id: JobId,
        not_before: DateTime<Utc>,
        failure: Option<&JobFailure>,
        now: DateTime<Utc>,
    ) -> Result<Job, JobStoreError> {
        (**self).requeue(job_id, not_before, failure, now)
    }

    fn release(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        (**self).release(job_id, now)
    }

    fn complete(&self, job_id: JobId, completion: &JobCompletion, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        (**self).complete(job_id, completion, now)
    }

    fn fail(&self, job_id: JobId, failure: &JobFailure, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        (**self).fail(job_id, failure, now)
    }

    fn cancel(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        (**self).cancel(job_id, now)
    }

    fn queue_depth(&self) -> Result<usize, JobStoreError> {
        (**self).queue_depth()
    }

    fn list_by_mission(
        &self,
        mission_id: MissionId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_mission(mission_id, status, limit)
    }

    fn mission_stats(&self, mission_id: MissionId) -> Result<MissionJobStats, JobStoreError> {
        (**self).mission_stats(mission_id)
    }

    fn get_result(&self, job_id: JobId) -> Result<Option<JobResultRecord>, JobStoreError> {
        (**self).get_result(job_id)
    }

    fn save_result(&self, record: JobResultRecord) -> Result<(), JobStoreError> {
        (**self).save_result(record)
    }
}

#[derive(Debug)]
struct Row {
    /// Insertion order; breaks `created_at` ties deterministically.
    seq: u64,
    job: Job,
}

#[derive(Debug, Default)]
struct Tables {
    next_seq: u64,
    jobs: HashMap<JobId, Row>,
    idempotency: HashMap<String, JobId>,
    results: HashMap<JobId, JobResultRecord>,
}

/// In-memory job store for tests/dev.
///
/// A single write lock covers claim selection and the status update, which
/// gives the same exclusive-claim guarantee as `FOR UPDATE SKIP LOCKED`.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    tables: RwLock<Tables>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn transition<F>(&self, job_id: JobId, from: JobStatus, to: JobStatus, apply: F) -> Result<Job, JobStoreError>
    where
        F: FnOnce(&mut Job),
    {
        let mut tables = self.tables.write();
        let row = tables.jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        if row.job.status != from {
            return Err(JobStoreError::InvalidTransition {
                job_id,
                from: row.job.status,
                to,
            });
        }
        apply(&mut row.job);
        Ok(row.job.clone())
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) -> Result<Job, JobStoreError> {
        let mut tables = self.tables.write();
        if tables.jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        if let Some(key) = &job.idempotency_key {
            if let Some(existing) = tables.idempotency.get(key) {
                return Err(JobStoreError::DuplicateIdempotencyKey {
                    key: key.clone(),
                    existing: *existing,
                });
            }
            tables.idempotency.insert(key.clone(), job.id);
        }

        let seq = tables.next_seq;
        tables.next_seq += 1;
        tables.jobs.insert(job.id, Row { seq, job: job.clone() });
        Ok(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.tables.read().jobs.get(&job_id).map(|r| r.job.clone()))
    }

    fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>, JobStoreError> {
        let tables = self.tables.read();
        Ok(tables
            .idempotency
            .get(key)
            .and_then(|id| tables.jobs.get(id))
            .map(|r| r.job.clone()))
    }

    fn claim_batch(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut tables = self.tables.write();

        let mut candidates: Vec<(i32, DateTime<Utc>, u64, JobId)> = tables
            .jobs
            .values()
            .filter(|r| r.job.is_eligible(now))
            .map(|r| (r.job.priority, r.job.created_at, r.seq, r.job.id))
            .collect();

        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
        candidates.truncate(limit);

        let mut claimed = Vec::with_capacity(candidates.len());
        for (_, _, _, id) in candidates {
            if let Some(row) = tables.jobs.get_mut(&id) {
                row.job.mark_claimed(now);
                claimed.push(row.job.clone());
            }
        }
        Ok(claimed)
    }

    fn requeue(
        &self,
        job_id: JobId,
        not_before: DateTime<Utc>,
        failure: Option<&JobFailure>,
        now: DateTime<Utc>,
    ) -> Result<Job, JobStoreError> {
        self.transition(job_id, JobStatus::Running, JobStatus::Queued, |job| {
            job.mark_requeued(not_before, failure, now)
        })
    }

    fn release(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        self.transition(job_id, JobStatus::Running, JobStatus::Queued, |job| job.mark_released(now))
    }

    fn complete(&self, job_id: JobId, completion: &JobCompletion, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        self.transition(job_id, JobStatus::Running, JobStatus::Succeeded, |job| {
            job.mark_succeeded(completion, now)
        })
    }

    fn fail(&self, job_id: JobId, failure: &JobFailure, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        self.transition(job_id, JobStatus::Running, JobStatus::Failed, |job| {
            job.mark_failed(failure, now)
        })
    }

    fn cancel(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        self.transition(job_id, JobStatus::Queued, JobStatus::Cancelled, |job| {
            job.mark_cancelled(now)
        })
    }

    fn queue_depth(&self) -> Result<usize, JobStoreError> {
        Ok(self
            .tables
            .read()
            .jobs
            .values()
            .filter(|r| r.job.status == JobStatus::Queued)
            .count())
    }

    fn list_by_mission(
        &self,
        mission_id: MissionId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let tables = self.tables.read();
        let mut rows: Vec<&Row> = tables
            .jobs
            .values()
            .filter(|r| r.job.mission_id == mission_id && status.map_or(true, |s| r.job.status == s))
            .collect();

        rows.sort_by(|a, b| b.job.created_at.cmp(&a.job.created_at).then(b.seq.cmp(&a.seq)));
        Ok(rows.into_iter().take(limit).map(|r| r.job.clone()).collect())
    }

    fn mission_stats(&self, mission_id: MissionId) -> Result<MissionJobStats, JobStoreError> {
        let tables = self.tables.read();
        let mut stats = MissionJobStats::default();
        for row in tables.jobs.values().filter(|r| r.job.mission_id == mission_id) {
            stats.record(row.job.status);
        }
        Ok(stats)
    }

    fn get_result(&self, job_id: JobId) -> Result<Option<JobResultRecord>, JobStoreError> {
        Ok(self.tables.read().results.get(&job_id).cloned())
    }

    fn save_result(&self, record: JobResultRecord) -> Result<(), JobStoreError> {
        let mut tables = self.tables.write();
        if !tables.jobs.contains_key(&record.job_id) {
            return Err(JobStoreError::NotFound(record.job_id));
        }
        if let Some(processed_at) = tables.results.get(&record.job_id).and_then(JobResultRecord::processed_at) {
            return Err(JobStoreError::AlreadyProcessed {
                job_id: record.job_id,
                processed_at,
            });
        }
        tables.results.insert(record.job_id, record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use missionai_core::EntityRef;

    use super::*;
    use crate::jobs::types::NewJob;

    fn job(mission_id: MissionId, priority: i32, key: Option<&str>) -> Job {
        Job::new(
            NewJob {
                mission_id,
                use_case_id: "report.summarize".into(),
                entity: EntityRef::report("r-1"),
                priority,
                max_attempts: 3,
                idempotency_key: key.map(str::to_string),
                created_by: None,
                prompt_version: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn duplicate_idempotency_key_is_rejected() {
        let store = InMemoryJobStore::new();
        let m = MissionId::new();
        let first = store.insert(job(m, 1, Some("k"))).unwrap();

        let err = store.insert(job(m, 1, Some("k"))).unwrap_err();
        assert_eq!(
            err,
            JobStoreError::DuplicateIdempotencyKey {
                key: "k".into(),
                existing: first.id
            }
        );
        assert_eq!(store.mission_stats(m).unwrap().total(), 1);
        assert_eq!(store.find_by_idempotency_key("k").unwrap().unwrap().id, first.id);
    }

    #[test]
    fn claim_marks_running_and_increments_attempt() {
        let store = InMemoryJobStore::new();
        let j = store.insert(job(MissionId::new(), 1, None)).unwrap();

        let claimed = store.claim_batch(10, Utc::now()).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, JobStatus::Running);
        assert_eq!(claimed[0].attempt, 1);

        assert!(store.claim_batch(10, Utc::now()).unwrap().is_empty());
        assert_eq!(store.get(j.id).unwrap().unwrap().status, JobStatus::Running);
    }

    #[test]
    fn claim_skips_jobs_backing_off() {
        let store = InMemoryJobStore::new();
        let j = store.insert(job(MissionId::new(), 1, None)).unwrap();
        let now = Utc::now();
        store.claim_batch(1, now).unwrap();
        store.requeue(j.id, now + Duration::seconds(30), None, now).unwrap();

        assert!(store.claim_batch(1, now).unwrap().is_empty());
        let later = store.claim_batch(1, now + Duration::seconds(30)).unwrap();
        assert_eq!(later[0].attempt, 2);
    }

    #[test]
    fn release_refunds_the_attempt() {
        let store = InMemoryJobStore::new();
        let j = store.insert(job(MissionId::new(), 1, None)).unwrap();
        let now = Utc::now();
        store.claim_batch(1, now).unwrap();

        let released = store.release(j.id, now).unwrap();
        assert_eq!(released.status, JobStatus::Queued);
        assert_eq!(released.attempt, 0);
        assert_eq!(store.claim_batch(1, now).unwrap()[0].attempt, 1);
    }

    #[test]
    fn claim_respects_limit_and_priority() {
        let store = InMemoryJobStore::new();
        let m = MissionId::new();
        for p in [1, 7, 3] {
            store.insert(job(m, p, None)).unwrap();
        }

        let claimed = store.claim_batch(2, Utc::now()).unwrap();
        let priorities: Vec<i32> = claimed.iter().map(|j| j.priority).collect();
        assert_eq!(priorities, vec![7, 3]);
        assert_eq!(store.queue_depth().unwrap(), 1);
    }

    #[test]
    fn cancel_only_from_queued() {
        let store = InMemoryJobStore::new();
        let j = store.insert(job(MissionId::new(), 1, None)).unwrap();
        store.claim_batch(1, Utc::now()).unwrap();

        let err = store.cancel(j.id, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            JobStoreError::InvalidTransition {
                from: JobStatus::Running,
                to: JobStatus::Cancelled,
                ..
            }
        ));
    }

    #[test]
    fn terminal_jobs_cannot_be_completed_twice() {
        let store = InMemoryJobStore::new();
        let j = store.insert(job(MissionId::new(), 1, None)).unwrap();
        store.claim_batch(1, Utc::now()).unwrap();
        let failure = JobFailure::new("FALLBACK_FAILED", "missing report");
        store.fail(j.id, &failure, Utc::now()).unwrap();

        assert!(store.fail(j.id, &failure, Utc::now()).is_err());
        assert!(store.requeue(j.id, Utc::now(), None, Utc::now()).is_err());
    }

    #[test]
    fn list_by_mission_filters_and_limits() {
        let store = InMemoryJobStore::new();
        let m = MissionId::new();
        let other = MissionId::new();
        let a = store.insert(job(m, 1, None)).unwrap();
        let b = store.insert(job(m, 1, None)).unwrap();
        store.insert(job(other, 1, None)).unwrap();
        store.claim_batch(1, Utc::now()).unwrap();

        let all = store.list_by_mission(m, None, 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, b.id);

        let queued = store.list_by_mission(m, Some(JobStatus::Queued), 10).unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(store.list_by_mission(m, None, 1).unwrap().len(), 1);
        assert_ne!(queued[0].id, a.id);

        let stats = store.mission_stats(m).unwrap();
        assert_eq!((stats.queued, stats.running), (1, 1));
    }

    #[test]
    fn save_result_requires_existing_job() {
        let store = InMemoryJobStore::new();
        let err = store
            .save_result(JobResultRecord::new(JobId::new(), Utc::now()))
            .unwrap_err();
        assert!(matches!(err, JobStoreError::NotFound(_)));
    }

    #[test]
    fn reviewed_result_is_never_replaced() {
        let store = InMemoryJobStore::new();
        let j = store.insert(job(MissionId::new(), 1, None)).unwrap();
        let accepted_at = Utc::now();

        let mut accepted = JobResultRecord::new(j.id, accepted_at);
        accepted.accepted_at = Some(accepted_at);
        accepted.applied_action = Some("apply_summary".into());
        store.save_result(accepted).unwrap();

        let mut rejected = JobResultRecord::new(j.id, Utc::now());
        rejected.rejected_at = Some(Utc::now());
        let err = store.save_result(rejected).unwrap_err();
        assert_eq!(
            err,
            JobStoreError::AlreadyProcessed {
                job_id: j.id,
                processed_at: accepted_at
            }
        );

        let kept = store.get_result(j.id).unwrap().unwrap();
        assert_eq!(kept.accepted_at, Some(accepted_at));
        assert!(kept.rejected_at.is_none());
    }

    #[test]
    fn unreviewed_result_may_be_replaced() {
        let store = InMemoryJobStore::new();
        let j = store.insert(job(MissionId::new(), 1, None)).unwrap();
        store.save_result(JobResultRecord::new(j.id, Utc::now())).unwrap();

        let mut rejected = JobResultRecord::new(j.id, Utc::now());
        rejected.rejected_at = Some(Utc::now());
        store.save_result(rejected).unwrap();
        assert!(store.get_result(j.id).unwrap().unwrap().is_processed());
    }
}
