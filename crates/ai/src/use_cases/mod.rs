//! Built-in task types.
//!
//! | id | input entity | fallback heuristic |
//! |---|---|---|
//! | `report.summarize` | one report | truncated message + type/severity key points |
//! | `report.cluster` | comma-separated reports | same type within 500 m and 10 min |
//! | `task.draft` | one report | per-type checklist, severity bucket |
//! | `resource.recommend` | one report | static per-type resource table |
//! | `priority.score` | one report | severity-derived score |

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::context::JobContext;
use crate::error::UseCaseError;
use crate::provider::{AiProvider, ProviderRequest, check_required_fields};
use crate::registry::UseCaseRegistry;
use crate::reports::{FieldReport, ReportReader};
use crate::use_case::UseCaseOutput;

pub mod cluster;
pub mod priority_score;
pub mod resource_recommend;
pub mod summarize;
pub mod task_draft;

pub use cluster::ReportClusterUseCase;
pub use priority_score::PriorityScoreUseCase;
pub use resource_recommend::ResourceRecommendUseCase;
pub use summarize::ReportSummarizeUseCase;
pub use task_draft::TaskDraftUseCase;

/// Register all five built-in use cases against one provider and report source.
pub fn register_defaults(
    registry: &mut UseCaseRegistry,
    provider: Arc<dyn AiProvider>,
    reports: Arc<dyn ReportReader>,
) {
    registry
        .register(Arc::new(ReportSummarizeUseCase::new(provider.clone(), reports.clone())))
        .register(Arc::new(ReportClusterUseCase::new(provider.clone(), reports.clone())))
        .register(Arc::new(TaskDraftUseCase::new(provider.clone(), reports.clone())))
        .register(Arc::new(ResourceRecommendUseCase::new(provider.clone(), reports.clone())))
        .register(Arc::new(PriorityScoreUseCase::new(provider, reports)));
}

pub(crate) fn load_report(reports: &dyn ReportReader, job: &JobContext) -> Result<FieldReport, UseCaseError> {
    reports
        .get_report(&job.entity.id)?
        .ok_or_else(|| UseCaseError::EntityNotFound(job.entity.clone()))
}

/// Call the provider and enforce the schema's required fields on its output.
pub(crate) fn run_structured(
    provider: &dyn AiProvider,
    use_case_id: &str,
    prompt: String,
    schema: JsonValue,
    max_output_tokens: u32,
) -> Result<UseCaseOutput, UseCaseError> {
    let request = ProviderRequest {
        use_case_id: use_case_id.to_string(),
        prompt,
        schema,
        max_output_tokens,
    };
    let response = provider.run(&request)?;
    check_required_fields(&response.output, &request.schema)?;
    Ok(UseCaseOutput::new(response.output).with_model(response.model_name))
}

/// `urgent` / `high` / `normal` / `low` from a 0–4 severity.
pub(crate) fn priority_bucket(severity: u8) -> &'static str {
    match severity {
        s if s >= 4 => "urgent",
        3 => "high",
        2 => "normal",
        _ => "low",
    }
}

pub(crate) fn report_block(report: &FieldReport, max_message_chars: usize) -> String {
    let location = report
        .location
        .map(|p| format!("({}, {})", p.lat, p.lng))
        .unwrap_or_else(|| "(unknown)".to_string());
    format!(
        "ID: {}\nType: {}\nSeverity: {}\nMessage: {}\nLocation: {}\nTime: {}",
        report.id,
        report.report_type,
        report.severity,
        crate::prompt::truncate(&report.message, max_message_chars),
        location,
        report.created_at.to_rfc3339()
    )
}
