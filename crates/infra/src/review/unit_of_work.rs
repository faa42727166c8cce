//! Atomic unit of work for accept/reject.
//!
//! A [`ReviewTx`] stages every write; reads see staged values first. Nothing
//! becomes visible until `commit`. Dropping an uncommitted transaction
//! discards all staged writes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use thiserror::Error;

use missionai_ai::FieldReport;
use missionai_core::{JobId, TaskId};

use crate::jobs::{Job, JobResultRecord, JobStore, JobStoreError};

use super::audit::{AuditEntry, InMemoryAuditLog};
use super::entities::{InMemoryEntityStore, TaskRecord};

#[derive(Debug, Error)]
pub enum ReviewStoreError {
    #[error(transparent)]
    Jobs(#[from] JobStoreError),

    #[error("review storage error: {0}")]
    Storage(String),
}

/// One open review transaction.
pub trait ReviewTx {
    fn job(&self, job_id: JobId) -> Result<Option<Job>, ReviewStoreError>;

    fn result(&self, job_id: JobId) -> Result<Option<JobResultRecord>, ReviewStoreError>;

    fn report(&self, id: &str) -> Result<Option<FieldReport>, ReviewStoreError>;

    fn task(&self, id: TaskId) -> Result<Option<TaskRecord>, ReviewStoreError>;

    fn update_report(&mut self, report: FieldReport) -> Result<(), ReviewStoreError>;

    fn insert_task(&mut self, task: TaskRecord) -> Result<(), ReviewStoreError>;

    fn save_result(&mut self, record: JobResultRecord) -> Result<(), ReviewStoreError>;

    fn append_audit(&mut self, entry: AuditEntry) -> Result<(), ReviewStoreError>;

    fn commit(self: Box<Self>) -> Result<(), ReviewStoreError>;
}

/// Opens review transactions.
pub trait ReviewStore: Send + Sync {
    fn begin(&self) -> Result<Box<dyn ReviewTx + '_>, ReviewStoreError>;
}

impl<T: ReviewStore + ?Sized> ReviewStore for Arc<T> {
    fn begin(&self) -> Result<Box<dyn ReviewTx + '_>, ReviewStoreError> {
        (**self).begin()
    }
}

/// Review store over the in-memory job, entity and audit stores.
///
/// Transactions are serialized by a single lock, held from `begin` until
/// commit or drop, so the "already processed" check and the result write
/// cannot interleave with another review.
pub struct InMemoryReviewStore<S> {
    jobs: S,
    entities: Arc<InMemoryEntityStore>,
    audit: Arc<InMemoryAuditLog>,
    lock: Mutex<()>,
}

impl<S: JobStore> InMemoryReviewStore<S> {
    pub fn new(jobs: S, entities: Arc<InMemoryEntityStore>, audit: Arc<InMemoryAuditLog>) -> Self {
        Self {
            jobs,
            entities,
            audit,
            lock: Mutex::new(()),
        }
    }

    pub fn entities(&self) -> &Arc<InMemoryEntityStore> {
        &self.entities
    }

    pub fn audit(&self) -> &Arc<InMemoryAuditLog> {
        &self.audit
    }
}

impl<S: JobStore> ReviewStore for InMemoryReviewStore<S> {
    fn begin(&self) -> Result<Box<dyn ReviewTx + '_>, ReviewStoreError> {
        Ok(Box::new(InMemoryReviewTx {
            _guard: self.lock.lock(),
            store: self,
            reports: HashMap::new(),
            tasks: Vec::new(),
            result: None,
            audit: Vec::new(),
        }))
    }
}

struct InMemoryReviewTx<'a, S> {
    _guard: MutexGuard<'a, ()>,
    store: &'a InMemoryReviewStore<S>,
    reports: HashMap<String, FieldReport>,
    tasks: Vec<TaskRecord>,
    result: Option<JobResultRecord>,
    audit: Vec<AuditEntry>,
}

impl<S: JobStore> ReviewTx for InMemoryReviewTx<'_, S> {
    fn job(&self, job_id: JobId) -> Result<Option<Job>, ReviewStoreError> {
        Ok(self.store.jobs.get(job_id)?)
    }

    fn result(&self, job_id: JobId) -> Result<Option<JobResultRecord>, ReviewStoreError> {
        match &self.result {
            Some(r) if r.job_id == job_id => Ok(Some(r.clone())),
            _ => Ok(self.store.jobs.get_result(job_id)?),
        }
    }

    fn report(&self, id: &str) -> Result<Option<FieldReport>, ReviewStoreError> {
        match self.reports.get(id) {
            Some(r) => Ok(Some(r.clone())),
            None => Ok(self.store.entities.report(id)),
        }
    }

    fn task(&self, id: TaskId) -> Result<Option<TaskRecord>, ReviewStoreError> {
        match self.tasks.iter().find(|t| t.id == id) {
            Some(t) => Ok(Some(t.clone())),
            None => Ok(self.store.entities.task(id)),
        }
    }

    fn update_report(&mut self, report: FieldReport) -> Result<(), ReviewStoreError> {
        self.reports.insert(report.id.clone(), report);
        Ok(())
    }

    fn insert_task(&mut self, task: TaskRecord) -> Result<(), ReviewStoreError> {
        self.tasks.push(task);
        Ok(())
    }

    fn save_result(&mut self, record: JobResultRecord) -> Result<(), ReviewStoreError> {
        self.result = Some(record);
        Ok(())
    }

    fn append_audit(&mut self, entry: AuditEntry) -> Result<(), ReviewStoreError> {
        self.audit.push(entry);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), ReviewStoreError> {
        let tx = *self;
        // The result write is the only fallible step; do it first so a failure
        // leaves entities and audit untouched.
        if let Some(record) = tx.result {
            tx.store.jobs.save_result(record)?;
        }
        tx.store.entities.apply(tx.reports, tx.tasks);
        tx.store.audit.append_all(tx.audit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use missionai_core::MissionId;

    use super::*;
    use crate::jobs::InMemoryJobStore;

    fn report(id: &str) -> FieldReport {
        FieldReport {
            id: id.into(),
            mission_id: MissionId::new(),
            report_type: "fire".into(),
            severity: 3,
            message: "smoke".into(),
            location: None,
            status: "new".into(),
            created_at: Utc::now(),
            metadata: json!({}),
        }
    }

    #[test]
    fn staged_writes_are_visible_inside_but_not_outside() {
        let entities = InMemoryEntityStore::arc();
        entities.insert_report(report("r1"));
        let store = InMemoryReviewStore::new(InMemoryJobStore::arc(), entities.clone(), Arc::new(InMemoryAuditLog::new()));

        let mut tx = store.begin().unwrap();
        let mut r = tx.report("r1").unwrap().unwrap();
        r.status = "merged".into();
        tx.update_report(r).unwrap();

        assert_eq!(tx.report("r1").unwrap().unwrap().status, "merged");
        assert_eq!(entities.report("r1").unwrap().status, "new");

        drop(tx);
        assert_eq!(entities.report("r1").unwrap().status, "new");
    }

    #[test]
    fn failed_commit_leaves_entities_untouched() {
        let entities = InMemoryEntityStore::arc();
        entities.insert_report(report("r1"));
        let audit = Arc::new(InMemoryAuditLog::new());
        let store = InMemoryReviewStore::new(InMemoryJobStore::arc(), entities.clone(), audit.clone());

        let mut tx = store.begin().unwrap();
        let mut r = tx.report("r1").unwrap().unwrap();
        r.status = "merged".into();
        tx.update_report(r).unwrap();
        // No such job: the result write fails.
        tx.save_result(JobResultRecord::new(JobId::new(), Utc::now())).unwrap();

        assert!(tx.commit().is_err());
        assert_eq!(entities.report("r1").unwrap().status, "new");
        assert!(audit.entries().is_empty());
    }

    #[test]
    fn second_review_to_commit_loses_across_stores() {
        use crate::jobs::NewJob;
        use missionai_core::EntityRef;

        let jobs = InMemoryJobStore::arc();
        let job = jobs
            .insert(Job::new(
                NewJob {
                    mission_id: MissionId::new(),
                    use_case_id: "report.summarize".into(),
                    entity: EntityRef::report("r1"),
                    priority: 5,
                    max_attempts: 3,
                    idempotency_key: None,
                    created_by: None,
                    prompt_version: None,
                },
                Utc::now(),
            ))
            .unwrap();
        let entities = InMemoryEntityStore::arc();
        entities.insert_report(report("r1"));
        let audit = Arc::new(InMemoryAuditLog::new());

        // Two stores stand in for two processes: their locks are independent.
        let a = InMemoryReviewStore::new(jobs.clone(), entities.clone(), audit.clone());
        let b = InMemoryReviewStore::new(jobs.clone(), entities.clone(), audit.clone());
        let mut tx_a = a.begin().unwrap();
        let mut tx_b = b.begin().unwrap();
        assert!(tx_a.result(job.id).unwrap().is_none());
        assert!(tx_b.result(job.id).unwrap().is_none());

        let now = Utc::now();
        let mut accepted = JobResultRecord::new(job.id, now);
        accepted.accepted_at = Some(now);
        tx_a.save_result(accepted).unwrap();

        let mut rejected = JobResultRecord::new(job.id, now);
        rejected.rejected_at = Some(now);
        tx_b.save_result(rejected).unwrap();
        let mut r = tx_b.report("r1").unwrap().unwrap();
        r.status = "dismissed".into();
        tx_b.update_report(r).unwrap();

        tx_a.commit().unwrap();
        let err = tx_b.commit().unwrap_err();
        assert!(matches!(err, ReviewStoreError::Jobs(JobStoreError::AlreadyProcessed { .. })));

        let stored = jobs.get_result(job.id).unwrap().unwrap();
        assert_eq!(stored.accepted_at, Some(now));
        assert!(stored.rejected_at.is_none());
        assert_eq!(entities.report("r1").unwrap().status, "new");
    }
}
