//! `missionai-ai`
//!
//! **Responsibility:** AI task handlers ("use cases") and the provider boundary.
//!
//! This crate knows nothing about queues, stores or scheduling:
//! - A [`UseCase`] turns one job context into structured JSON output, either
//!   through an [`AiProvider`] (`execute`) or locally (`fallback`).
//! - It never mutates domain state; accepting an output is the review layer's job.
//! - Field reports are read through the [`ReportReader`] port.

pub mod context;
pub mod error;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod reports;
pub mod use_case;
pub mod use_cases;

pub use context::JobContext;
pub use error::{ProviderError, UseCaseError};
pub use provider::{AiProvider, ProviderRequest, ProviderResponse, ScriptedProvider, UnconfiguredProvider};
pub use registry::{RegistryError, UseCaseRegistry};
pub use reports::{FieldReport, GeoPoint, ReadError, ReportReader};
pub use use_case::{UseCase, UseCaseOutput};
