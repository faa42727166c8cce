//! Append-only audit trail for review decisions.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use missionai_core::{MissionId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor: UserId,
    pub actor_name: Option<String>,
    /// `ai:accept:<action>` or `ai:reject`.
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub mission_id: MissionId,
    pub before: Option<JsonValue>,
    pub after: Option<JsonValue>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append_all(&self, entries: Vec<AuditEntry>) {
        self.entries.write().extend(entries);
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }

    pub fn for_entity(&self, entity_type: &str, entity_id: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect()
    }
}
