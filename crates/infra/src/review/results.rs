//! Result Service: human accept/reject of succeeded jobs.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use missionai_auth::{AuthzError, Principal, authorize};
use missionai_core::{EntityRef, JobId, JobStatus, TaskId};

use crate::config::QueueConfig;
use crate::jobs::{Job, JobResultRecord, JobStoreError};

use super::actions::{self, AcceptAction, ActionError};
use super::audit::AuditEntry;
use super::entities::report_snapshot;
use super::unit_of_work::{ReviewStore, ReviewStoreError, ReviewTx};

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptReceipt {
    pub applied_action: AcceptAction,
    pub affected_entities: Vec<EntityRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectReceipt {
    pub rejected_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error(transparent)]
    InsufficientPrivilege(#[from] AuthzError),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("job {job_id} is {status}, not succeeded")]
    JobNotReady { job_id: JobId, status: JobStatus },

    #[error("result of job {job_id} already processed at {processed_at}")]
    AlreadyProcessed {
        job_id: JobId,
        processed_at: DateTime<Utc>,
    },

    #[error("unknown accept action '{0}'")]
    UnknownAction(String),

    #[error("accept action failed: {0}")]
    ActionFailed(ActionError),

    #[error(transparent)]
    Store(ReviewStoreError),
}

impl ReviewError {
    pub fn code(&self) -> &'static str {
        match self {
            ReviewError::InsufficientPrivilege(e) => e.code(),
            ReviewError::JobNotFound(_) => "JOB_NOT_FOUND",
            ReviewError::JobNotReady { .. } => "JOB_NOT_READY",
            ReviewError::AlreadyProcessed { .. } => "ALREADY_PROCESSED",
            ReviewError::UnknownAction(_) => "UNKNOWN_ACTION",
            ReviewError::ActionFailed(_) => "ACTION_FAILED",
            ReviewError::Store(_) => "STORE_ERROR",
        }
    }
}

impl From<ReviewStoreError> for ReviewError {
    fn from(value: ReviewStoreError) -> Self {
        match value {
            // Another review committed between our check and our write.
            ReviewStoreError::Jobs(JobStoreError::AlreadyProcessed { job_id, processed_at }) => {
                ReviewError::AlreadyProcessed { job_id, processed_at }
            }
            other => ReviewError::Store(other),
        }
    }
}

impl From<ActionError> for ReviewError {
    fn from(value: ActionError) -> Self {
        match value {
            ActionError::Store(e) => ReviewError::from(e),
            other => ReviewError::ActionFailed(other),
        }
    }
}

/// Applies or discards succeeded job outputs.
///
/// Every accept runs in one [`ReviewTx`]: before-snapshot, mutation,
/// after-snapshot, result row and audit entry commit together or not at all.
pub struct ResultService<R> {
    store: R,
    config: Arc<QueueConfig>,
}

impl<R: ReviewStore> ResultService<R> {
    pub fn new(store: R, config: Arc<QueueConfig>) -> Self {
        Self { store, config }
    }

    pub fn accept(
        &self,
        principal: &Principal,
        job_id: JobId,
        action: &str,
        parameters: Option<&JsonValue>,
    ) -> Result<AcceptReceipt, ReviewError> {
        authorize(principal, self.config.global.accept_min_level)?;
        let action = AcceptAction::parse(action).ok_or_else(|| ReviewError::UnknownAction(action.to_string()))?;

        let mut tx = self.store.begin()?;
        let (job, existing) = reviewable(&*tx, job_id, true)?;
        let now = Utc::now();

        let output = actions::effective_output(&job, parameters)?;

        let mut before = BTreeMap::new();
        for id in actions::touched_reports(action, &job, &output) {
            if let Some(report) = tx.report(&id)? {
                before.insert(EntityRef::report(id).snapshot_key(), report_snapshot(&report));
            }
        }

        let affected = actions::apply(&mut *tx, action, &job, &output, principal.user_id, now)?;
        let after = snapshot(&*tx, &affected)?;
        let before = json!(before);

        let mut record = existing.unwrap_or_else(|| JobResultRecord::new(job_id, now));
        record.accepted_by = Some(principal.user_id);
        record.accepted_at = Some(now);
        record.applied_action = Some(action.as_str().to_string());
        record.before_snapshot = Some(before.clone());
        record.after_snapshot = Some(after.clone());
        record.affected_entities = affected.clone();
        record.updated_at = now;
        tx.save_result(record)?;

        tx.append_audit(AuditEntry {
            id: Uuid::now_v7(),
            actor: principal.user_id,
            actor_name: principal.display_name.clone(),
            action: format!("ai:accept:{action}"),
            entity_type: "ai_job".into(),
            entity_id: job_id.to_string(),
            mission_id: job.mission_id,
            before: Some(before),
            after: Some(after),
            at: now,
        })?;
        tx.commit()?;

        info!(
            job_id = %job_id,
            mission_id = %job.mission_id,
            user_id = %principal.user_id,
            action = %action,
            affected = affected.len(),
            "AI result accepted"
        );
        Ok(AcceptReceipt {
            applied_action: action,
            affected_entities: affected,
        })
    }

    pub fn reject(
        &self,
        principal: &Principal,
        job_id: JobId,
        reason: Option<&str>,
    ) -> Result<RejectReceipt, ReviewError> {
        authorize(principal, self.config.global.reject_min_level)?;

        let mut tx = self.store.begin()?;
        let (job, existing) = reviewable(&*tx, job_id, false)?;
        let now = Utc::now();

        let mut record = existing.unwrap_or_else(|| JobResultRecord::new(job_id, now));
        record.rejected_by = Some(principal.user_id);
        record.rejected_at = Some(now);
        record.rejection_reason = reason.map(str::to_string);
        record.updated_at = now;
        tx.save_result(record)?;

        tx.append_audit(AuditEntry {
            id: Uuid::now_v7(),
            actor: principal.user_id,
            actor_name: principal.display_name.clone(),
            action: "ai:reject".into(),
            entity_type: "ai_job".into(),
            entity_id: job_id.to_string(),
            mission_id: job.mission_id,
            before: None,
            after: Some(json!({ "reason": reason })),
            at: now,
        })?;
        tx.commit()?;

        info!(job_id = %job_id, user_id = %principal.user_id, "AI result rejected");
        Ok(RejectReceipt { rejected_at: now })
    }
}

/// Load the job and its result row, enforcing the review guards.
///
/// Reject does not require `succeeded`; accept does.
fn reviewable(
    tx: &dyn ReviewTx,
    job_id: JobId,
    require_succeeded: bool,
) -> Result<(Job, Option<JobResultRecord>), ReviewError> {
    let job = tx.job(job_id)?.ok_or(ReviewError::JobNotFound(job_id))?;
    if require_succeeded && job.status != JobStatus::Succeeded {
        return Err(ReviewError::JobNotReady {
            job_id,
            status: job.status,
        });
    }

    let existing = tx.result(job_id)?;
    if let Some(processed_at) = existing.as_ref().and_then(JobResultRecord::processed_at) {
        warn!(job_id = %job_id, "review refused: result already processed");
        return Err(ReviewError::AlreadyProcessed { job_id, processed_at });
    }
    Ok((job, existing))
}

/// `"<type>:<id>"` → current state, for every affected entity.
fn snapshot(tx: &dyn ReviewTx, affected: &[EntityRef]) -> Result<JsonValue, ReviewError> {
    let mut out = BTreeMap::new();
    for entity in affected {
        let state = match entity.entity_type.as_str() {
            "report" => tx.report(&entity.id)?.map(|r| report_snapshot(&r)),
            "task" => match entity.id.parse::<TaskId>() {
                Ok(id) => tx.task(id)?.map(|t| t.snapshot()),
                Err(_) => None,
            },
            _ => None,
        };
        out.insert(entity.snapshot_key(), state.unwrap_or(JsonValue::Null));
    }
    Ok(json!(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_commit_race_reports_already_processed() {
        let job_id = JobId::new();
        let processed_at = Utc::now();
        let err = ReviewError::from(ReviewStoreError::Jobs(JobStoreError::AlreadyProcessed {
            job_id,
            processed_at,
        }));
        assert_eq!(err.code(), "ALREADY_PROCESSED");
        assert!(matches!(err, ReviewError::AlreadyProcessed { job_id: id, .. } if id == job_id));

        let err = ReviewError::from(ReviewStoreError::Storage("disk".into()));
        assert_eq!(err.code(), "STORE_ERROR");
    }
}
