//! Postgres-backed job store.
//!
//! ## Schema
//!
//! `ai_jobs` holds one row per job, `ai_results` at most one row per job.
//! Idempotency keys are enforced by a unique partial index, so two
//! concurrent submissions with the same key cannot both insert.
//!
//! ## Exclusive claim
//!
//! `claim_batch` selects eligible rows `FOR UPDATE SKIP LOCKED` inside the
//! same `UPDATE ... RETURNING` that marks them `running`. Rows locked by a
//! concurrent claimer are skipped, never returned twice.
//!
//! ## Error mapping
//!
//! | SQLx error | Postgres code | `JobStoreError` |
//! |---|---|---|
//! | unique violation on idempotency key | `23505` | `DuplicateIdempotencyKey` |
//! | unique violation on id | `23505` | `AlreadyExists` |
//! | foreign key violation (result for unknown job) | `23503` | `NotFound` |
//! | anything else | any | `Storage` |
//!
//! ## Sync access
//!
//! [`JobStore`] is synchronous; each call runs its async query on the stored
//! tokio runtime handle via `block_on`. Call it from plain threads (the
//! worker's dispatch threads), never from inside an async task.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tokio::runtime::Handle;
use tracing::instrument;

use missionai_core::{EntityRef, JobId, JobStatus, MissionId, UserId};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobCompletion, JobFailure, JobResultRecord, MissionJobStats};

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ai_jobs (
    id                  UUID PRIMARY KEY,
    mission_id          UUID NOT NULL,
    use_case_id         TEXT NOT NULL,
    entity_type         TEXT NOT NULL,
    entity_id           TEXT NOT NULL,
    status              TEXT NOT NULL,
    priority            INTEGER NOT NULL,
    not_before          TIMESTAMPTZ,
    attempt             INTEGER NOT NULL DEFAULT 0,
    max_attempts        INTEGER NOT NULL,
    idempotency_key     TEXT,
    input_fingerprint   TEXT NOT NULL,
    model_name          TEXT,
    prompt_version      TEXT,
    created_by          UUID,
    output_json         JSONB,
    error_code          TEXT,
    error_message       TEXT,
    is_fallback         BOOLEAN NOT NULL DEFAULT FALSE,
    processing_time_ms  BIGINT,
    created_at          TIMESTAMPTZ NOT NULL,
    updated_at          TIMESTAMPTZ NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS ai_jobs_idempotency_key
    ON ai_jobs (idempotency_key) WHERE idempotency_key IS NOT NULL;

CREATE INDEX IF NOT EXISTS ai_jobs_claim
    ON ai_jobs (status, priority DESC, created_at ASC);

CREATE INDEX IF NOT EXISTS ai_jobs_mission
    ON ai_jobs (mission_id, created_at DESC);

CREATE TABLE IF NOT EXISTS ai_results (
    job_id              UUID PRIMARY KEY REFERENCES ai_jobs (id),
    accepted_by         UUID,
    accepted_at         TIMESTAMPTZ,
    rejected_by         UUID,
    rejected_at         TIMESTAMPTZ,
    rejection_reason    TEXT,
    applied_action      TEXT,
    before_snapshot     JSONB,
    after_snapshot      JSONB,
    affected_entities   JSONB NOT NULL DEFAULT '[]',
    created_at          TIMESTAMPTZ NOT NULL,
    updated_at          TIMESTAMPTZ NOT NULL
);
"#;

const JOB_COLUMNS: &str = "id, mission_id, use_case_id, entity_type, entity_id, status, priority, not_before, \
     attempt, max_attempts, idempotency_key, input_fingerprint, model_name, prompt_version, created_by, \
     output_json, error_code, error_message, is_fallback, processing_time_ms, created_at, updated_at";

/// Result upsert. An accepted or rejected row is left alone, so zero rows
/// affected means another review got there first.
const UPSERT_RESULT: &str = r#"
    INSERT INTO ai_results (
        job_id, accepted_by, accepted_at, rejected_by, rejected_at, rejection_reason,
        applied_action, before_snapshot, after_snapshot, affected_entities, created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
    ON CONFLICT (job_id) DO UPDATE SET
        accepted_by = EXCLUDED.accepted_by,
        accepted_at = EXCLUDED.accepted_at,
        rejected_by = EXCLUDED.rejected_by,
        rejected_at = EXCLUDED.rejected_at,
        rejection_reason = EXCLUDED.rejection_reason,
        applied_action = EXCLUDED.applied_action,
        before_snapshot = EXCLUDED.before_snapshot,
        after_snapshot = EXCLUDED.after_snapshot,
        affected_entities = EXCLUDED.affected_entities,
        updated_at = EXCLUDED.updated_at
    WHERE ai_results.accepted_at IS NULL AND ai_results.rejected_at IS NULL
"#;

/// Postgres job store.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
    handle: Handle,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self {
            pool: Arc::new(pool),
            handle,
        }
    }

    /// Build from inside a tokio runtime, capturing its handle.
    pub fn from_current(pool: PgPool) -> Result<Self, JobStoreError> {
        let handle = Handle::try_current()
            .map_err(|_| JobStoreError::Storage("PostgresJobStore requires a tokio runtime".into()))?;
        Ok(Self::new(pool, handle))
    }

    /// Create tables and indexes if missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), JobStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, use_case = %job.use_case_id), err)]
    pub async fn insert_job(&self, job: Job) -> Result<Job, JobStoreError> {
        let result = sqlx::query(&format!(
            "INSERT INTO ai_jobs ({JOB_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)"
        ))
        .bind(job.id.as_uuid())
        .bind(job.mission_id.as_uuid())
        .bind(&job.use_case_id)
        .bind(&job.entity.entity_type)
        .bind(&job.entity.id)
        .bind(job.status.as_str())
        .bind(job.priority)
        .bind(job.not_before)
        .bind(job.attempt as i32)
        .bind(job.max_attempts as i32)
        .bind(&job.idempotency_key)
        .bind(&job.input_fingerprint)
        .bind(&job.model_name)
        .bind(&job.prompt_version)
        .bind(job.created_by.map(|u| *u.as_uuid()))
        .bind(&job.output)
        .bind(&job.error_code)
        .bind(&job.error_message)
        .bind(job.is_fallback)
        .bind(job.processing_time_ms.map(|ms| ms as i64))
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await;

        match result {
            Ok(_) => Ok(job),
            Err(e) if is_unique_violation(&e) => match &job.idempotency_key {
                Some(key) => match self.find_by_key(key).await? {
                    Some(existing) => Err(JobStoreError::DuplicateIdempotencyKey {
                        key: key.clone(),
                        existing: existing.id,
                    }),
                    None => Err(JobStoreError::AlreadyExists(job.id)),
                },
                None => Err(JobStoreError::AlreadyExists(job.id)),
            },
            Err(e) => Err(map_sqlx_error("insert_job", e)),
        }
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    pub async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM ai_jobs WHERE id = $1"))
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_job", e))?;
        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    pub async fn find_by_key(&self, key: &str) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM ai_jobs WHERE idempotency_key = $1"))
            .bind(key)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_key", e))?;
        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    pub async fn claim(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            r#"
            UPDATE ai_jobs
            SET status = 'running', attempt = attempt + 1, updated_at = $2
            WHERE id IN (
                SELECT id FROM ai_jobs
                WHERE status = 'queued' AND (not_before IS NULL OR not_before <= $2)
                ORDER BY priority DESC, created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(limit as i64)
        .bind(now)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("claim", e))?;

        let mut jobs = rows.iter().map(job_from_row).collect::<Result<Vec<_>, _>>()?;
        // RETURNING does not preserve the subquery order.
        jobs.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(jobs)
    }

    /// Conditional status update; `set` is the SQL assignment list for the new state.
    async fn transition(
        &self,
        operation: &str,
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
        set: &str,
        binds: TransitionBinds<'_>,
    ) -> Result<Job, JobStoreError> {
        let sql = format!(
            "UPDATE ai_jobs SET status = $3, {set} WHERE id = $1 AND status = $2 RETURNING {JOB_COLUMNS}"
        );
        let mut query = sqlx::query(&sql)
            .bind(job_id.as_uuid())
            .bind(from.as_str())
            .bind(to.as_str());
        query = match binds {
            TransitionBinds::Requeue {
                not_before,
                failure,
                now,
            } => query
                .bind(not_before)
                .bind(failure.map(|f| f.code.clone()))
                .bind(failure.map(|f| f.message.clone()))
                .bind(now),
            TransitionBinds::Release { now } => query.bind(now),
            TransitionBinds::Complete { completion, now } => query
                .bind(&completion.output)
                .bind(completion.is_fallback)
                .bind(&completion.model_name)
                .bind(completion.processing_time_ms as i64)
                .bind(now),
            TransitionBinds::Fail { failure, now } => query.bind(&failure.code).bind(&failure.message).bind(now),
            TransitionBinds::Cancel { now } => query.bind(now),
        };

        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        match row {
            Some(row) => job_from_row(&row),
            None => match self.get_job(job_id).await? {
                Some(current) => Err(JobStoreError::InvalidTransition {
                    job_id,
                    from: current.status,
                    to,
                }),
                None => Err(JobStoreError::NotFound(job_id)),
            },
        }
    }

    #[instrument(skip(self), err)]
    pub async fn depth(&self) -> Result<usize, JobStoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ai_jobs WHERE status = 'queued'")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("queue_depth", e))?;
        Ok(count as usize)
    }

    #[instrument(skip(self), fields(mission_id = %mission_id), err)]
    pub async fn list_mission(
        &self,
        mission_id: MissionId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM ai_jobs \
             WHERE mission_id = $1 AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY created_at DESC LIMIT $3"
        ))
        .bind(mission_id.as_uuid())
        .bind(status.map(|s| s.as_str()))
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_by_mission", e))?;
        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self), fields(mission_id = %mission_id), err)]
    pub async fn stats(&self, mission_id: MissionId) -> Result<MissionJobStats, JobStoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM ai_jobs WHERE mission_id = $1 GROUP BY status")
            .bind(mission_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("mission_stats", e))?;

        let mut stats = MissionJobStats::default();
        for row in rows {
            let status = status_from_db(&row.try_get::<String, _>("status").map_err(decode_error)?)?;
            let n: i64 = row.try_get("n").map_err(decode_error)?;
            for _ in 0..n {
                stats.record(status);
            }
        }
        Ok(stats)
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    pub async fn load_result(&self, job_id: JobId) -> Result<Option<JobResultRecord>, JobStoreError> {
        let row = sqlx::query(
            r#"
            SELECT job_id, accepted_by, accepted_at, rejected_by, rejected_at, rejection_reason,
                   applied_action, before_snapshot, after_snapshot, affected_entities, created_at, updated_at
            FROM ai_results WHERE job_id = $1
            "#,
        )
        .bind(job_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_result", e))?;
        row.as_ref().map(result_from_row).transpose()
    }

    #[instrument(skip(self, record), fields(job_id = %record.job_id), err)]
    pub async fn store_result(&self, record: JobResultRecord) -> Result<(), JobStoreError> {
        let affected = serde_json::to_value(&record.affected_entities)
            .map_err(|e| JobStoreError::Storage(format!("failed to encode affected entities: {e}")))?;

        let done = sqlx::query(UPSERT_RESULT)
        .bind(record.job_id.as_uuid())
        .bind(record.accepted_by.map(|u| *u.as_uuid()))
        .bind(record.accepted_at)
        .bind(record.rejected_by.map(|u| *u.as_uuid()))
        .bind(record.rejected_at)
        .bind(&record.rejection_reason)
        .bind(&record.applied_action)
        .bind(&record.before_snapshot)
        .bind(&record.after_snapshot)
        .bind(affected)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                JobStoreError::NotFound(record.job_id)
            } else {
                map_sqlx_error("save_result", e)
            }
        })?;

        if done.rows_affected() == 0 {
            let processed_at = self
                .load_result(record.job_id)
                .await?
                .and_then(|r| r.processed_at())
                .unwrap_or(record.updated_at);
            return Err(JobStoreError::AlreadyProcessed {
                job_id: record.job_id,
                processed_at,
            });
        }
        Ok(())
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.handle.block_on(fut)
    }
}

/// Values bound after `$1..$3` for each transition.
enum TransitionBinds<'a> {
    Requeue {
        not_before: DateTime<Utc>,
        failure: Option<&'a JobFailure>,
        now: DateTime<Utc>,
    },
    Release {
        now: DateTime<Utc>,
    },
    Complete {
        completion: &'a JobCompletion,
        now: DateTime<Utc>,
    },
    Fail {
        failure: &'a JobFailure,
        now: DateTime<Utc>,
    },
    Cancel {
        now: DateTime<Utc>,
    },
}

impl JobStore for PostgresJobStore {
    fn insert(&self, job: Job) -> Result<Job, JobStoreError> {
        self.block_on(self.insert_job(job))
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        self.block_on(self.get_job(job_id))
    }

    fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>, JobStoreError> {
        self.block_on(self.find_by_key(key))
    }

    fn claim_batch(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError> {
        self.block_on(self.claim(limit, now))
    }

    fn requeue(
        &self,
        job_id: JobId,
        not_before: DateTime<Utc>,
        failure: Option<&JobFailure>,
        now: DateTime<Utc>,
    ) -> Result<Job, JobStoreError> {
        self.block_on(self.transition(
            "requeue",
            job_id,
            JobStatus::Running,
            JobStatus::Queued,
            "not_before = $4, error_code = COALESCE($5, error_code), \
             error_message = COALESCE($6, error_message), updated_at = $7",
            TransitionBinds::Requeue {
                not_before,
                failure,
                now,
            },
        ))
    }

    fn release(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        self.block_on(self.transition(
            "release",
            job_id,
            JobStatus::Running,
            JobStatus::Queued,
            "not_before = $4, attempt = GREATEST(attempt - 1, 0), updated_at = $4",
            TransitionBinds::Release { now },
        ))
    }

    fn complete(&self, job_id: JobId, completion: &JobCompletion, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        self.block_on(self.transition(
            "complete",
            job_id,
            JobStatus::Running,
            JobStatus::Succeeded,
            "output_json = $4, is_fallback = $5, model_name = $6, processing_time_ms = $7, \
             error_code = NULL, error_message = NULL, updated_at = $8",
            TransitionBinds::Complete { completion, now },
        ))
    }

    fn fail(&self, job_id: JobId, failure: &JobFailure, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        self.block_on(self.transition(
            "fail",
            job_id,
            JobStatus::Running,
            JobStatus::Failed,
            "error_code = $4, error_message = $5, updated_at = $6",
            TransitionBinds::Fail { failure, now },
        ))
    }

    fn cancel(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        self.block_on(self.transition(
            "cancel",
            job_id,
            JobStatus::Queued,
            JobStatus::Cancelled,
            "updated_at = $4",
            TransitionBinds::Cancel { now },
        ))
    }

    fn queue_depth(&self) -> Result<usize, JobStoreError> {
        self.block_on(self.depth())
    }

    fn list_by_mission(
        &self,
        mission_id: MissionId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        self.block_on(self.list_mission(mission_id, status, limit))
    }

    fn mission_stats(&self, mission_id: MissionId) -> Result<MissionJobStats, JobStoreError> {
        self.block_on(self.stats(mission_id))
    }

    fn get_result(&self, job_id: JobId) -> Result<Option<JobResultRecord>, JobStoreError> {
        self.block_on(self.load_result(job_id))
    }

    fn save_result(&self, record: JobResultRecord) -> Result<(), JobStoreError> {
        self.block_on(self.store_result(record))
    }
}

fn job_from_row(row: &PgRow) -> Result<Job, JobStoreError> {
    let status: String = row.try_get("status").map_err(decode_error)?;
    let attempt: i32 = row.try_get("attempt").map_err(decode_error)?;
    let max_attempts: i32 = row.try_get("max_attempts").map_err(decode_error)?;
    let created_by: Option<uuid::Uuid> = row.try_get("created_by").map_err(decode_error)?;
    let processing_time_ms: Option<i64> = row.try_get("processing_time_ms").map_err(decode_error)?;

    Ok(Job {
        id: JobId::from_uuid(row.try_get("id").map_err(decode_error)?),
        mission_id: MissionId::from_uuid(row.try_get("mission_id").map_err(decode_error)?),
        use_case_id: row.try_get("use_case_id").map_err(decode_error)?,
        entity: EntityRef::new(
            row.try_get::<String, _>("entity_type").map_err(decode_error)?,
            row.try_get::<String, _>("entity_id").map_err(decode_error)?,
        ),
        status: status_from_db(&status)?,
        priority: row.try_get("priority").map_err(decode_error)?,
        not_before: row.try_get("not_before").map_err(decode_error)?,
        attempt: attempt.max(0) as u32,
        max_attempts: max_attempts.max(0) as u32,
        idempotency_key: row.try_get("idempotency_key").map_err(decode_error)?,
        input_fingerprint: row.try_get("input_fingerprint").map_err(decode_error)?,
        model_name: row.try_get("model_name").map_err(decode_error)?,
        prompt_version: row.try_get("prompt_version").map_err(decode_error)?,
        created_by: created_by.map(UserId::from_uuid),
        output: row.try_get("output_json").map_err(decode_error)?,
        error_code: row.try_get("error_code").map_err(decode_error)?,
        error_message: row.try_get("error_message").map_err(decode_error)?,
        is_fallback: row.try_get("is_fallback").map_err(decode_error)?,
        processing_time_ms: processing_time_ms.map(|ms| ms.max(0) as u64),
        created_at: row.try_get("created_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
    })
}

fn result_from_row(row: &PgRow) -> Result<JobResultRecord, JobStoreError> {
    let accepted_by: Option<uuid::Uuid> = row.try_get("accepted_by").map_err(decode_error)?;
    let rejected_by: Option<uuid::Uuid> = row.try_get("rejected_by").map_err(decode_error)?;
    let affected: serde_json::Value = row.try_get("affected_entities").map_err(decode_error)?;

    Ok(JobResultRecord {
        job_id: JobId::from_uuid(row.try_get("job_id").map_err(decode_error)?),
        accepted_by: accepted_by.map(UserId::from_uuid),
        accepted_at: row.try_get("accepted_at").map_err(decode_error)?,
        rejected_by: rejected_by.map(UserId::from_uuid),
        rejected_at: row.try_get("rejected_at").map_err(decode_error)?,
        rejection_reason: row.try_get("rejection_reason").map_err(decode_error)?,
        applied_action: row.try_get("applied_action").map_err(decode_error)?,
        before_snapshot: row.try_get("before_snapshot").map_err(decode_error)?,
        after_snapshot: row.try_get("after_snapshot").map_err(decode_error)?,
        affected_entities: serde_json::from_value(affected)
            .map_err(|e| JobStoreError::Storage(format!("failed to decode affected entities: {e}")))?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
    })
}

fn status_from_db(s: &str) -> Result<JobStatus, JobStoreError> {
    s.parse::<JobStatus>()
        .map_err(|e| JobStoreError::Storage(format!("bad row in ai_jobs: {e}")))
}

fn decode_error(err: sqlx::Error) -> JobStoreError {
    JobStoreError::Storage(format!("failed to decode row: {err}"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            JobStoreError::Storage(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::PoolClosed => JobStoreError::Storage(format!("connection pool closed in {operation}")),
        other => JobStoreError::Storage(format!("sqlx error in {operation}: {other}")),
    }
}

fn has_db_code(err: &sqlx::Error, code: &str) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(c) = db_err.code() {
            return c.as_ref() == code;
        }
    }
    false
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_db_code(err, "23505")
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    has_db_code(err, "23503")
}
