use std::sync::Arc;

use serde_json::{Value as JsonValue, json};

use crate::context::JobContext;
use crate::error::UseCaseError;
use crate::prompt;
use crate::provider::AiProvider;
use crate::reports::ReportReader;
use crate::use_case::{UseCase, UseCaseOutput};

use super::{load_report, report_block, run_structured};

pub const ID: &str = "report.summarize";

const PROMPT: &str = "You are assisting a disaster response command post.
Summarize the field report below for an incident commander.

{{report}}

Return a one-paragraph summary, up to five key points, and a severity assessment.
Output valid JSON matching the schema.";

fn schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "summary": {"type": "string"},
            "key_points": {"type": "array", "items": {"type": "string"}},
            "severity_assessment": {"type": "string"},
            "confidence": {"type": "integer", "minimum": 0, "maximum": 100}
        },
        "required": ["summary", "key_points"]
    })
}

pub struct ReportSummarizeUseCase {
    provider: Arc<dyn AiProvider>,
    reports: Arc<dyn ReportReader>,
}

impl ReportSummarizeUseCase {
    pub fn new(provider: Arc<dyn AiProvider>, reports: Arc<dyn ReportReader>) -> Self {
        Self { provider, reports }
    }
}

impl UseCase for ReportSummarizeUseCase {
    fn id(&self) -> &str {
        ID
    }

    fn execute(&self, job: &JobContext) -> Result<UseCaseOutput, UseCaseError> {
        let report = load_report(self.reports.as_ref(), job)?;
        let block = report_block(&report, 1000);
        let text = prompt::render(PROMPT, &[("report", block.as_str())]);
        run_structured(self.provider.as_ref(), ID, text, schema(), 512)
    }

    fn fallback(&self, job: &JobContext) -> Result<JsonValue, UseCaseError> {
        let report = load_report(self.reports.as_ref(), job)?;
        Ok(json!({
            "summary": prompt::truncate(&report.message, 200),
            "key_points": [
                format!("type: {}", report.report_type),
                format!("severity: {}", report.severity),
            ],
            "severity_assessment": super::priority_bucket(report.severity),
            "confidence": 30,
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::ScriptedProvider;
    use crate::use_cases::test_support::{MapReader, job, report};

    #[test]
    fn execute_passes_report_into_prompt() {
        let provider = Arc::new(ScriptedProvider::always(json!({
            "summary": "Building collapse, 3 trapped",
            "key_points": ["collapse"]
        })));
        let reader = Arc::new(MapReader::with(vec![report("r1", "collapse", 4, Utc::now(), None)]));
        let uc = ReportSummarizeUseCase::new(provider.clone(), reader);

        let out = uc.execute(&job(ID, "r1")).unwrap();
        assert_eq!(out.output["summary"], "Building collapse, 3 trapped");
        assert_eq!(out.model_name.as_deref(), Some("scripted"));
        assert!(provider.requests()[0].prompt.contains("ID: r1"));
    }

    #[test]
    fn execute_rejects_output_missing_key_points() {
        let provider = Arc::new(ScriptedProvider::always(json!({"summary": "x"})));
        let reader = Arc::new(MapReader::with(vec![report("r1", "fire", 2, Utc::now(), None)]));
        let uc = ReportSummarizeUseCase::new(provider, reader);

        let err = uc.execute(&job(ID, "r1")).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[test]
    fn fallback_uses_message_and_type() {
        let reader = Arc::new(MapReader::with(vec![report("r1", "flood", 3, Utc::now(), None)]));
        let uc = ReportSummarizeUseCase::new(Arc::new(ScriptedProvider::new()), reader);

        let out = uc.fallback(&job(ID, "r1")).unwrap();
        assert_eq!(out["key_points"][0], "type: flood");
        assert_eq!(out["severity_assessment"], "high");
    }

    #[test]
    fn fallback_fails_for_missing_report() {
        let uc = ReportSummarizeUseCase::new(
            Arc::new(ScriptedProvider::new()),
            Arc::new(MapReader::default()),
        );
        let err = uc.fallback(&job(ID, "ghost")).unwrap_err();
        assert_eq!(err.code(), "ENTITY_NOT_FOUND");
    }
}
