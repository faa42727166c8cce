//! Duplicate/related report clustering.
//!
//! The job's entity id is a comma-separated list of report ids. Fewer than two
//! readable reports yields an empty cluster list on both paths.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crate::context::JobContext;
use crate::error::UseCaseError;
use crate::prompt;
use crate::provider::AiProvider;
use crate::reports::{FieldReport, GeoPoint, ReportReader};
use crate::use_case::{UseCase, UseCaseOutput};

use super::{report_block, run_structured};

pub const ID: &str = "report.cluster";

/// Reports farther apart than this are never grouped by the fallback.
pub const MAX_DISTANCE_M: f64 = 500.0;
/// Reports created further apart than this are never grouped by the fallback.
pub const MAX_TIME_GAP_SECS: i64 = 600;

const FALLBACK_CONFIDENCE: u8 = 50;

const PROMPT: &str = "You are analyzing multiple field reports from a disaster response mission to identify duplicates and related reports that should be merged.

Reports:
{{reports}}

Group reports that describe the same incident. Consider location proximity (within 500m),
time proximity (within 10 min) and similar descriptions. For each cluster explain why,
suggest a merged description and rate confidence (0-100).
Only group reports if you're confident they describe the same incident.
Output valid JSON matching the schema.";

fn schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "clusters": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "report_ids": {"type": "array", "items": {"type": "string"}},
                        "centroid": {
                            "type": "object",
                            "properties": {"lat": {"type": "number"}, "lng": {"type": "number"}}
                        },
                        "merge_suggestion": {"type": "string"},
                        "reason": {"type": "string"},
                        "confidence": {"type": "integer", "minimum": 0, "maximum": 100}
                    }
                }
            }
        },
        "required": ["clusters"]
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub report_ids: Vec<String>,
    pub centroid: GeoPoint,
    pub merge_suggestion: String,
    pub reason: String,
    pub confidence: u8,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterOutput {
    pub clusters: Vec<Cluster>,
}

pub struct ReportClusterUseCase {
    provider: Arc<dyn AiProvider>,
    reports: Arc<dyn ReportReader>,
}

impl ReportClusterUseCase {
    pub fn new(provider: Arc<dyn AiProvider>, reports: Arc<dyn ReportReader>) -> Self {
        Self { provider, reports }
    }

    fn load(&self, job: &JobContext) -> Result<Vec<FieldReport>, UseCaseError> {
        Ok(self.reports.get_reports(&job.entity.ids())?)
    }
}

impl UseCase for ReportClusterUseCase {
    fn id(&self) -> &str {
        ID
    }

    fn execute(&self, job: &JobContext) -> Result<UseCaseOutput, UseCaseError> {
        let reports = self.load(job)?;
        if reports.len() < 2 {
            return Ok(UseCaseOutput::new(empty()));
        }

        let text = reports
            .iter()
            .map(|r| report_block(r, 200))
            .collect::<Vec<_>>()
            .join("\n---\n");
        let prompt_text = prompt::render(PROMPT, &[("reports", text.as_str())]);
        run_structured(self.provider.as_ref(), ID, prompt_text, schema(), 1024)
    }

    fn fallback(&self, job: &JobContext) -> Result<JsonValue, UseCaseError> {
        let reports = self.load(job)?;
        if reports.len() < 2 {
            return Ok(empty());
        }
        serde_json::to_value(distance_clusters(&reports))
            .map_err(|e| UseCaseError::InvalidInput(e.to_string()))
    }
}

fn empty() -> JsonValue {
    json!({ "clusters": [] })
}

/// Greedy grouping: each unused located report pulls in every other unused
/// report of the same type within the distance and time windows.
pub fn distance_clusters(reports: &[FieldReport]) -> ClusterOutput {
    let mut used: HashSet<&str> = HashSet::new();
    let mut clusters = Vec::new();

    for report in reports {
        if used.contains(report.id.as_str()) {
            continue;
        }
        let Some(origin) = report.location else {
            continue;
        };

        let nearby: Vec<&FieldReport> = reports
            .iter()
            .filter(|r| r.id != report.id && !used.contains(r.id.as_str()))
            .filter(|r| r.report_type == report.report_type)
            .filter(|r| {
                r.location
                    .map(|p| origin.haversine_m(&p) <= MAX_DISTANCE_M)
                    .unwrap_or(false)
            })
            .filter(|r| (report.created_at - r.created_at).num_seconds().abs() <= MAX_TIME_GAP_SECS)
            .collect();

        if nearby.is_empty() {
            continue;
        }

        let members: Vec<&FieldReport> = std::iter::once(report).chain(nearby).collect();
        for m in &members {
            used.insert(m.id.as_str());
        }

        clusters.push(Cluster {
            report_ids: members.iter().map(|r| r.id.clone()).collect(),
            centroid: centroid(&members),
            merge_suggestion: format!("merge {} {} reports", members.len(), report.report_type),
            reason: "located within 500 m and reported within 10 minutes".to_string(),
            confidence: FALLBACK_CONFIDENCE,
        });
    }

    ClusterOutput { clusters }
}

fn centroid(reports: &[&FieldReport]) -> GeoPoint {
    let points: Vec<GeoPoint> = reports.iter().filter_map(|r| r.location).collect();
    if points.is_empty() {
        return GeoPoint::new(0.0, 0.0);
    }
    let n = points.len() as f64;
    GeoPoint::new(
        points.iter().map(|p| p.lat).sum::<f64>() / n,
        points.iter().map(|p| p.lng).sum::<f64>() / n,
    )
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::ScriptedProvider;
    use crate::use_cases::test_support::{MapReader, job, report};

    #[test]
    fn groups_same_type_nearby_reports() {
        let t = Utc::now();
        let reports = vec![
            report("a", "fire", 3, t, Some(GeoPoint::new(25.0, 121.0))),
            report("b", "fire", 3, t + Duration::minutes(3), Some(GeoPoint::new(25.001, 121.0))),
            // different type
            report("c", "flood", 3, t, Some(GeoPoint::new(25.0, 121.0))),
            // too far
            report("d", "fire", 3, t, Some(GeoPoint::new(25.1, 121.0))),
            // too late
            report("e", "fire", 3, t + Duration::minutes(30), Some(GeoPoint::new(25.0, 121.0))),
        ];

        let out = distance_clusters(&reports);
        assert_eq!(out.clusters.len(), 1);
        let c = &out.clusters[0];
        assert_eq!(c.report_ids, vec!["a", "b"]);
        assert_eq!(c.confidence, 50);
        assert!((c.centroid.lat - 25.0005).abs() < 1e-9);
    }

    #[test]
    fn reports_without_location_are_never_grouped() {
        let t = Utc::now();
        let reports = vec![report("a", "fire", 1, t, None), report("b", "fire", 1, t, None)];
        assert!(distance_clusters(&reports).clusters.is_empty());
    }

    #[test]
    fn fewer_than_two_reports_yield_empty_output_without_provider_call() {
        let provider = Arc::new(ScriptedProvider::new());
        let reader = Arc::new(MapReader::with(vec![report("a", "fire", 1, Utc::now(), None)]));
        let uc = ReportClusterUseCase::new(provider.clone(), reader);

        let out = uc.execute(&job(ID, "a,missing")).unwrap();
        assert_eq!(out.output, json!({"clusters": []}));
        assert_eq!(provider.calls(), 0);
        assert_eq!(uc.fallback(&job(ID, "a")).unwrap(), json!({"clusters": []}));
    }

    #[test]
    fn fallback_serializes_clusters() {
        let t = Utc::now();
        let reader = Arc::new(MapReader::with(vec![
            report("a", "medical", 2, t, Some(GeoPoint::new(24.0, 120.0))),
            report("b", "medical", 2, t, Some(GeoPoint::new(24.0, 120.0))),
        ]));
        let uc = ReportClusterUseCase::new(Arc::new(ScriptedProvider::new()), reader);

        let out = uc.fallback(&job(ID, "a,b")).unwrap();
        assert_eq!(out["clusters"][0]["report_ids"], json!(["a", "b"]));
    }
}
