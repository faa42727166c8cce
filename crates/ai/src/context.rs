use missionai_core::{EntityRef, JobId, MissionId, UserId};

/// Read-only view of a claimed job, handed to a use case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    pub job_id: JobId,
    pub mission_id: MissionId,
    pub use_case_id: String,
    pub entity: EntityRef,
    /// Dequeue attempt this execution belongs to (1-based).
    pub attempt: u32,
    pub max_attempts: u32,
    pub created_by: Option<UserId>,
}
