//! Infrastructure layer: job store, scheduling, review, configuration.

pub mod config;
pub mod jobs;
pub mod review;
pub mod runtime;
