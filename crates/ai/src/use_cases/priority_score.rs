use std::sync::Arc;

use serde_json::{Value as JsonValue, json};

use crate::context::JobContext;
use crate::error::UseCaseError;
use crate::prompt;
use crate::provider::AiProvider;
use crate::reports::ReportReader;
use crate::use_case::{UseCase, UseCaseOutput};

use super::{load_report, priority_bucket, report_block, run_structured};

pub const ID: &str = "priority.score";

const PROMPT: &str = "Score the urgency of this field report from 0 (no action) to 100 (life-threatening, act now).

{{report}}

Return the score, a bucket (urgent/high/normal/low) and the factors behind it.
Output valid JSON matching the schema.";

fn schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "score": {"type": "integer", "minimum": 0, "maximum": 100},
            "bucket": {"type": "string"},
            "factors": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["score", "bucket"]
    })
}

/// 0–100 score from a 0–4 severity.
pub fn severity_score(severity: u8) -> u8 {
    severity.min(4) * 25
}

pub struct PriorityScoreUseCase {
    provider: Arc<dyn AiProvider>,
    reports: Arc<dyn ReportReader>,
}

impl PriorityScoreUseCase {
    pub fn new(provider: Arc<dyn AiProvider>, reports: Arc<dyn ReportReader>) -> Self {
        Self { provider, reports }
    }
}

impl UseCase for PriorityScoreUseCase {
    fn id(&self) -> &str {
        ID
    }

    fn execute(&self, job: &JobContext) -> Result<UseCaseOutput, UseCaseError> {
        let report = load_report(self.reports.as_ref(), job)?;
        let block = report_block(&report, 500);
        let text = prompt::render(PROMPT, &[("report", block.as_str())]);
        run_structured(self.provider.as_ref(), ID, text, schema(), 256)
    }

    fn fallback(&self, job: &JobContext) -> Result<JsonValue, UseCaseError> {
        let report = load_report(self.reports.as_ref(), job)?;
        Ok(json!({
            "score": severity_score(report.severity),
            "bucket": priority_bucket(report.severity),
            "factors": [format!("reported severity {}", report.severity)],
        }))
    }
}
