//! `missionai-core`: shared primitives for the AI job queue.
//!
//! This crate contains identifiers and small value types only (no IO, no
//! scheduling logic).

pub mod entity;
pub mod error;
pub mod id;
pub mod status;

pub use entity::EntityRef;
pub use error::{DomainError, DomainResult};
pub use id::{JobId, MissionId, TaskId, UserId};
pub use status::JobStatus;
