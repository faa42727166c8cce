use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use missionai_core::{EntityRef, JobId, JobStatus};

/// Lifecycle notification for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobEvent {
    Queued {
        job_id: JobId,
        use_case_id: String,
        entity: EntityRef,
        priority: i32,
    },
    Updated {
        job_id: JobId,
        status: JobStatus,
        attempt: u32,
        estimated_complete_at: Option<DateTime<Utc>>,
    },
    ResultReady {
        job_id: JobId,
        use_case_id: String,
        entity: EntityRef,
        output: serde_json::Value,
        is_fallback: bool,
        can_accept: bool,
    },
    Failed {
        job_id: JobId,
        error_code: String,
        error_message: String,
        will_retry: bool,
        next_attempt_at: Option<DateTime<Utc>>,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Queued { job_id, .. }
            | JobEvent::Updated { job_id, .. }
            | JobEvent::ResultReady { job_id, .. }
            | JobEvent::Failed { job_id, .. } => *job_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::Queued { .. } => "queued",
            JobEvent::Updated { .. } => "updated",
            JobEvent::ResultReady { .. } => "result_ready",
            JobEvent::Failed { .. } => "failed",
        }
    }
}
