use std::sync::Arc;

use serde_json::{Value as JsonValue, json};

use crate::context::JobContext;
use crate::error::UseCaseError;
use crate::prompt;
use crate::provider::AiProvider;
use crate::reports::ReportReader;
use crate::use_case::{UseCase, UseCaseOutput};

use super::{load_report, report_block, run_structured};

pub const ID: &str = "resource.recommend";

const PROMPT: &str = "Recommend the resources a response team should dispatch for this report.

{{report}}

List each resource kind with a quantity and a one-line reason.
Output valid JSON matching the schema.";

fn schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "resources": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "kind": {"type": "string"},
                        "quantity": {"type": "integer"},
                        "reason": {"type": "string"}
                    }
                }
            }
        },
        "required": ["resources"]
    })
}

/// `(kind, quantity)` pairs dispatched by default for a report type.
fn static_table(report_type: &str) -> &'static [(&'static str, u32)] {
    match report_type {
        "medical" => &[("ambulance", 1), ("medic", 2), ("first aid kit", 2)],
        "fire" => &[("fire engine", 1), ("firefighter", 4), ("extinguisher", 2)],
        "flood" => &[("rescue boat", 1), ("sandbags", 50), ("water pump", 1)],
        "collapse" => &[("usar team", 1), ("search dog", 1), ("hydraulic tools", 1)],
        "supply" => &[("supply truck", 1), ("volunteer", 4)],
        _ => &[("volunteer", 2), ("radio", 1)],
    }
}

pub struct ResourceRecommendUseCase {
    provider: Arc<dyn AiProvider>,
    reports: Arc<dyn ReportReader>,
}

impl ResourceRecommendUseCase {
    pub fn new(provider: Arc<dyn AiProvider>, reports: Arc<dyn ReportReader>) -> Self {
        Self { provider, reports }
    }
}

impl UseCase for ResourceRecommendUseCase {
    fn id(&self) -> &str {
        ID
    }

    fn execute(&self, job: &JobContext) -> Result<UseCaseOutput, UseCaseError> {
        let report = load_report(self.reports.as_ref(), job)?;
        let block = report_block(&report, 500);
        let text = prompt::render(PROMPT, &[("report", block.as_str())]);
        run_structured(self.provider.as_ref(), ID, text, schema(), 512)
    }

    fn fallback(&self, job: &JobContext) -> Result<JsonValue, UseCaseError> {
        let report = load_report(self.reports.as_ref(), job)?;
        let resources: Vec<JsonValue> = static_table(&report.report_type)
            .iter()
            .map(|(kind, quantity)| {
                json!({
                    "kind": kind,
                    "quantity": quantity,
                    "reason": format!("standard allocation for {} reports", report.report_type),
                })
            })
            .collect();
        Ok(json!({ "resources": resources }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{ProviderError, ScriptedProvider};
    use crate::use_cases::test_support::{MapReader, job, report};

    #[test]
    fn fallback_reads_static_table() {
        let reader = Arc::new(MapReader::with(vec![report("r1", "flood", 2, Utc::now(), None)]));
        let uc = ResourceRecommendUseCase::new(Arc::new(ScriptedProvider::new()), reader);

        let out = uc.fallback(&job(ID, "r1")).unwrap();
        assert_eq!(out["resources"][0]["kind"], "rescue boat");
        assert_eq!(out["resources"][1]["quantity"], 50);
    }

    #[test]
    fn execute_surfaces_provider_error() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_err(ProviderError::ServiceUnavailable);
        let reader = Arc::new(MapReader::with(vec![report("r1", "fire", 2, Utc::now(), None)]));
        let uc = ResourceRecommendUseCase::new(provider, reader);

        let err = uc.execute(&job(ID, "r1")).unwrap_err();
        assert_eq!(err, UseCaseError::Provider(ProviderError::ServiceUnavailable));
    }
}
