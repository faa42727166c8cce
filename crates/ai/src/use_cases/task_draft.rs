use std::sync::Arc;

use serde_json::{Value as JsonValue, json};

use crate::context::JobContext;
use crate::error::UseCaseError;
use crate::prompt;
use crate::provider::AiProvider;
use crate::reports::ReportReader;
use crate::use_case::{UseCase, UseCaseOutput};

use super::{load_report, priority_bucket, report_block, run_structured};

pub const ID: &str = "task.draft";

const PROMPT: &str = "Draft a field task for a response team based on this report.

{{report}}

Give a short title, a description, a priority (urgent/high/normal/low), a step checklist,
required equipment, relevant SOP slugs and an estimated duration in minutes.
Output valid JSON matching the schema.";

fn schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "title": {"type": "string"},
            "description": {"type": "string"},
            "priority": {"type": "string", "enum": ["urgent", "high", "normal", "low"]},
            "checklist": {"type": "array", "items": {"type": "string"}},
            "required_items": {"type": "array", "items": {"type": "string"}},
            "sop_slugs": {"type": "array", "items": {"type": "string"}},
            "estimated_duration_min": {"type": "integer"}
        },
        "required": ["title", "priority", "checklist"]
    })
}

struct Template {
    checklist: &'static [&'static str],
    required_items: &'static [&'static str],
    sop_slug: &'static str,
    duration_min: u32,
}

fn template_for(report_type: &str) -> Template {
    match report_type {
        "medical" => Template {
            checklist: &["Assess scene safety", "Triage casualties", "Provide first aid", "Request transport if needed"],
            required_items: &["first aid kit", "stretcher", "gloves"],
            sop_slug: "medical-response",
            duration_min: 45,
        },
        "fire" => Template {
            checklist: &["Confirm fire location", "Notify fire brigade", "Evacuate nearby residents", "Secure perimeter"],
            required_items: &["extinguisher", "radio", "barrier tape"],
            sop_slug: "fire-response",
            duration_min: 60,
        },
        "flood" => Template {
            checklist: &["Check water level", "Evacuate low-lying areas", "Place sandbags", "Monitor drainage"],
            required_items: &["sandbags", "life jackets", "pump"],
            sop_slug: "flood-response",
            duration_min: 90,
        },
        "collapse" => Template {
            checklist: &["Cordon off structure", "Search for trapped people", "Request USAR team", "Assess structural stability"],
            required_items: &["helmet", "search light", "hydraulic tools"],
            sop_slug: "structural-collapse",
            duration_min: 120,
        },
        _ => Template {
            checklist: &["Verify report on site", "Assess needs", "Report back to command"],
            required_items: &["radio"],
            sop_slug: "general-response",
            duration_min: 30,
        },
    }
}

pub struct TaskDraftUseCase {
    provider: Arc<dyn AiProvider>,
    reports: Arc<dyn ReportReader>,
}

impl TaskDraftUseCase {
    pub fn new(provider: Arc<dyn AiProvider>, reports: Arc<dyn ReportReader>) -> Self {
        Self { provider, reports }
    }
}

impl UseCase for TaskDraftUseCase {
    fn id(&self) -> &str {
        ID
    }

    fn execute(&self, job: &JobContext) -> Result<UseCaseOutput, UseCaseError> {
        let report = load_report(self.reports.as_ref(), job)?;
        let block = report_block(&report, 1000);
        let text = prompt::render(PROMPT, &[("report", block.as_str())]);
        run_structured(self.provider.as_ref(), ID, text, schema(), 1024)
    }

    fn fallback(&self, job: &JobContext) -> Result<JsonValue, UseCaseError> {
        let report = load_report(self.reports.as_ref(), job)?;
        let t = template_for(&report.report_type);
        Ok(json!({
            "title": format!("Respond to {} report", report.report_type),
            "description": prompt::truncate(&report.message, 200),
            "priority": priority_bucket(report.severity),
            "checklist": t.checklist,
            "required_items": t.required_items,
            "sop_slugs": [t.sop_slug],
            "estimated_duration_min": t.duration_min,
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
    fn fallback_uses_type_template_and_severity_bucket() {
        let reader = Arc::new(MapReader::with(vec![report("r1", "collapse", 4, Utc::now(), None)]));
        let uc = TaskDraftUseCase::new(Arc::new(ScriptedProvider::new()), reader);

        let out = uc.fallback(&job(ID, "r1")).unwrap();
        assert_eq!(out["priority"], "urgent");
        assert_eq!(out["sop_slugs"], json!(["structural-collapse"]));
        assert_eq!(out["estimated_duration_min"], 120);
        assert_eq!(out["checklist"].as_array().map(Vec::len), Some(4));
    }

    #[test]
    fn unknown_type_gets_general_template() {
        let reader = Arc::new(MapReader::with(vec![report("r1", "other", 0, Utc::now(), None)]));
        let uc = TaskDraftUseCase::new(Arc::new(ScriptedProvider::new()), reader);

        let out = uc.fallback(&job(ID, "r1")).unwrap();
        assert_eq!(out["priority"], "low");
        assert_eq!(out["sop_slugs"], json!(["general-response"]));
    }
}
