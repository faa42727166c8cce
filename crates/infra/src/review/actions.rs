//! Accept actions: the closed set of mutations an accepted result may apply.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

use missionai_core::{EntityRef, TaskId, UserId};

use crate::jobs::Job;

use super::entities::{TaskRecord, task_priority};
use super::unit_of_work::{ReviewStoreError, ReviewTx};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptAction {
    /// Store the output as `metadata.ai_summary` on the source report.
    ApplySummary,
    /// Merge every multi-report cluster into its first report.
    MergeReports,
    /// Create an open task from a task draft and link it to the source report.
    CreateTask,
}

impl AcceptAction {
    pub const ALL: [AcceptAction; 3] = [
        AcceptAction::ApplySummary,
        AcceptAction::MergeReports,
        AcceptAction::CreateTask,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AcceptAction::ApplySummary => "apply_summary",
            AcceptAction::MergeReports => "merge_reports",
            AcceptAction::CreateTask => "create_task",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl fmt::Display for AcceptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AcceptAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| s.to_string())
    }
}

/// Why an action could not be applied. Rolls back the whole review.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("report not found: {0}")]
    ReportNotFound(String),

    #[error("job has no output")]
    MissingOutput,

    #[error(transparent)]
    Store(#[from] ReviewStoreError),
}

/// Output with caller parameters shallow-merged on top.
pub fn effective_output(job: &Job, parameters: Option<&JsonValue>) -> Result<JsonValue, ActionError> {
    let mut output = job.output.clone().ok_or(ActionError::MissingOutput)?;
    if let (Some(JsonValue::Object(overrides)), JsonValue::Object(target)) = (parameters, &mut output) {
        for (k, v) in overrides {
            target.insert(k.clone(), v.clone());
        }
    }
    Ok(output)
}

/// Report ids whose state the action may change (before-snapshot scope).
pub fn touched_reports(action: AcceptAction, job: &Job, output: &JsonValue) -> Vec<String> {
    match action {
        AcceptAction::ApplySummary | AcceptAction::CreateTask => vec![job.entity.id.clone()],
        AcceptAction::MergeReports => {
            let ids: Vec<String> = merge_groups(output).into_iter().flatten().collect();
            if ids.is_empty() {
                job.entity.ids().into_iter().map(str::to_string).collect()
            } else {
                ids
            }
        }
    }
}

/// Apply `action` inside `tx`, returning every affected entity.
pub fn apply(
    tx: &mut dyn ReviewTx,
    action: AcceptAction,
    job: &Job,
    output: &JsonValue,
    actor: UserId,
    now: DateTime<Utc>,
) -> Result<Vec<EntityRef>, ActionError> {
    match action {
        AcceptAction::ApplySummary => apply_summary(tx, job, output),
        AcceptAction::MergeReports => merge_reports(tx, output),
        AcceptAction::CreateTask => create_task(tx, job, output, actor, now),
    }
}

fn apply_summary(tx: &mut dyn ReviewTx, job: &Job, output: &JsonValue) -> Result<Vec<EntityRef>, ActionError> {
    let id = &job.entity.id;
    let mut report = tx.report(id)?.ok_or_else(|| ActionError::ReportNotFound(id.clone()))?;
    set_metadata(&mut report.metadata, "ai_summary", output.clone());
    tx.update_report(report)?;
    Ok(vec![EntityRef::report(id.clone())])
}

fn merge_reports(tx: &mut dyn ReviewTx, output: &JsonValue) -> Result<Vec<EntityRef>, ActionError> {
    let mut affected = Vec::new();

    for group in merge_groups(output) {
        let Some((primary_id, secondaries)) = group.split_first() else {
            continue;
        };

        for id in secondaries {
            let mut report = tx.report(id)?.ok_or_else(|| ActionError::ReportNotFound(id.clone()))?;
            report.status = "merged".into();
            set_metadata(&mut report.metadata, "merged_into", json!(primary_id));
            tx.update_report(report)?;
        }

        let mut primary = tx
            .report(primary_id)?
            .ok_or_else(|| ActionError::ReportNotFound(primary_id.clone()))?;
        set_metadata(&mut primary.metadata, "merged_from", json!(secondaries));
        tx.update_report(primary)?;

        affected.push(EntityRef::report(primary_id.clone()));
        affected.extend(secondaries.iter().map(|id| EntityRef::report(id.clone())));
    }
    Ok(affected)
}

fn create_task(
    tx: &mut dyn ReviewTx,
    job: &Job,
    output: &JsonValue,
    actor: UserId,
    now: DateTime<Utc>,
) -> Result<Vec<EntityRef>, ActionError> {
    let source_id = &job.entity.id;
    let mut source = tx
        .report(source_id)?
        .ok_or_else(|| ActionError::ReportNotFound(source_id.clone()))?;

    let task = TaskRecord {
        id: TaskId::new(),
        mission_id: job.mission_id,
        title: output["title"].as_str().unwrap_or("AI drafted task").to_string(),
        description: output["description"].as_str().unwrap_or_default().to_string(),
        status: "open".into(),
        priority: task_priority(output["priority"].as_str().unwrap_or_default()),
        metadata: json!({
            "source_report_id": source_id,
            "ai_job_id": job.id.to_string(),
            "checklist": output["checklist"],
            "required_items": output["required_items"],
            "sop_slugs": output["sop_slugs"],
            "estimated_duration_min": output["estimated_duration_min"],
        }),
        created_by: Some(actor),
        created_at: now,
    };
    let task_id = task.id;
    tx.insert_task(task)?;

    let mut links = source.metadata["linked_task_ids"].as_array().cloned().unwrap_or_default();
    links.push(json!(task_id.to_string()));
    set_metadata(&mut source.metadata, "linked_task_ids", JsonValue::Array(links));
    tx.update_report(source)?;

    Ok(vec![EntityRef::task(task_id.to_string()), EntityRef::report(source_id.clone())])
}

/// Report-id groups with more than one member from a cluster output.
fn merge_groups(output: &JsonValue) -> Vec<Vec<String>> {
    output["clusters"]
        .as_array()
        .map(|clusters| {
            clusters
                .iter()
                .map(|c| {
                    c["report_ids"]
                        .as_array()
                        .map(|ids| {
                            ids.iter()
                                .filter_map(|v| v.as_str().map(str::to_string))
                                .collect::<Vec<String>>()
                        })
                        .unwrap_or_default()
                })
                .filter(|ids| ids.len() > 1)
                .collect()
        })
        .unwrap_or_default()
}

/// Set one metadata key, replacing a non-object metadata value with `{}`.
fn set_metadata(metadata: &mut JsonValue, key: &str, value: JsonValue) {
    let mut map = match metadata.take() {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    };
    map.insert(key.to_string(), value);
    *metadata = JsonValue::Object(map);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_actions_only() {
        assert_eq!(AcceptAction::parse("create_task"), Some(AcceptAction::CreateTask));
        assert_eq!("merge_reports".parse::<AcceptAction>(), Ok(AcceptAction::MergeReports));
        assert_eq!(AcceptAction::parse("delete_everything"), None);
    }

    #[test]
    fn merge_groups_skip_singletons() {
        let output = json!({"clusters": [
            {"report_ids": ["a", "b", "c"]},
            {"report_ids": ["d"]},
            {"reason": "no ids"}
        ]});
        assert_eq!(merge_groups(&output), vec![vec!["a".to_string(), "b".into(), "c".into()]]);
        assert!(merge_groups(&json!({})).is_empty());
    }

    #[test]
    fn set_metadata_replaces_non_objects() {
        let mut v = JsonValue::Null;
        set_metadata(&mut v, "k", json!(1));
        assert_eq!(v, json!({"k": 1}));
        set_metadata(&mut v, "j", json!(2));
        assert_eq!(v, json!({"k": 1, "j": 2}));
    }
}
