//! Domain entities touched by accepted AI results: field reports and tasks.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use missionai_ai::{FieldReport, ReadError, ReportReader};
use missionai_core::{MissionId, TaskId, UserId};

/// Field task created from an accepted `task.draft` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub mission_id: MissionId,
    pub title: String,
    pub description: String,
    /// Always `open` on creation.
    pub status: String,
    /// 1 (low) to 4 (urgent).
    pub priority: u8,
    pub metadata: JsonValue,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn snapshot(&self) -> JsonValue {
        json!({
            "id": self.id.to_string(),
            "title": self.title,
            "status": self.status,
            "priority": self.priority,
            "metadata": self.metadata,
        })
    }
}

pub fn report_snapshot(report: &FieldReport) -> JsonValue {
    json!({
        "id": report.id,
        "status": report.status,
        "metadata": report.metadata,
    })
}

/// Numeric task priority from a draft's bucket name.
pub fn task_priority(bucket: &str) -> u8 {
    match bucket {
        "urgent" => 4,
        "high" => 3,
        "normal" => 2,
        _ => 1,
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct EntityTables {
    pub(crate) reports: HashMap<String, FieldReport>,
    pub(crate) tasks: HashMap<TaskId, TaskRecord>,
}

/// In-memory reports and tasks (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    tables: RwLock<EntityTables>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert_report(&self, report: FieldReport) {
        self.tables.write().reports.insert(report.id.clone(), report);
    }

    pub fn report(&self, id: &str) -> Option<FieldReport> {
        self.tables.read().reports.get(id).cloned()
    }

    pub fn task(&self, id: TaskId) -> Option<TaskRecord> {
        self.tables.read().tasks.get(&id).cloned()
    }

    /// Tasks of one mission, oldest first.
    pub fn tasks_for_mission(&self, mission_id: MissionId) -> Vec<TaskRecord> {
        let mut tasks: Vec<TaskRecord> = self
            .tables
            .read()
            .tasks
            .values()
            .filter(|t| t.mission_id == mission_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Apply staged writes from a committed review.
    pub(crate) fn apply(&self, reports: HashMap<String, FieldReport>, tasks: Vec<TaskRecord>) {
        let mut tables = self.tables.write();
        tables.reports.extend(reports);
        for task in tasks {
            tables.tasks.insert(task.id, task);
        }
    }
}

impl ReportReader for InMemoryEntityStore {
    fn get_report(&self, id: &str) -> Result<Option<FieldReport>, ReadError> {
        Ok(self.report(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_buckets_map_to_numbers() {
        assert_eq!(task_priority("urgent"), 4);
        assert_eq!(task_priority("high"), 3);
        assert_eq!(task_priority("normal"), 2);
        assert_eq!(task_priority("low"), 1);
        assert_eq!(task_priority("whatever"), 1);
    }

    #[test]
    fn report_snapshot_keeps_status_and_metadata() {
        let report = FieldReport {
            id: "r1".into(),
            mission_id: MissionId::new(),
            report_type: "flood".into(),
            severity: 3,
            message: "water rising".into(),
            location: None,
            status: "new".into(),
            created_at: Utc::now(),
            metadata: json!({"k": 1}),
        };
        assert_eq!(
            report_snapshot(&report),
            json!({"id": "r1", "status": "new", "metadata": {"k": 1}})
        );
    }
}
