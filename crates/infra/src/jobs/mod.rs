//! AI job queue: storage, scheduling policy and the services around it.
//!
//! ## Components
//!
//! - `JobStore`: single source of truth for job rows (in-memory or Postgres)
//! - `SubmissionService`: validates and enqueues jobs
//! - `Worker`: claims jobs each tick and dispatches them concurrently
//! - `RateLimiter`: global / per-task-type / per-mission slot counters
//! - `CircuitBreaker`: per-task-type cooldown after repeated rate limits
//! - `policy`: failure classification and the retry/backoff/fallback decision

pub mod circuit_breaker;
pub mod policy;
pub mod postgres;
pub mod rate_limiter;
pub mod store;
pub mod submission;
pub mod types;
pub mod worker;

pub use circuit_breaker::{BreakerSettings, CircuitBreaker, CircuitBreakerState};
pub use policy::{ErrorClass, FailureStage, JobTransition, next_state};
pub use postgres::PostgresJobStore;
pub use rate_limiter::{RateLimiter, RateLimiterSnapshot, RateLimits, RatePermit};
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use submission::{SubmissionService, SubmitError, SubmitReceipt, SubmitRequest};
pub use types::{Job, JobCompletion, JobFailure, JobResultRecord, MissionJobStats, NewJob, input_fingerprint};
pub use worker::{Worker, WorkerConfig, WorkerHandle, WorkerStats};
