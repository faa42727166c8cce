//! Reference to a domain entity an AI job analyzes or an accepted result touches.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// `{type, id}` pair naming an external domain entity (report, task, ...).
///
/// Ids are opaque strings: the queue never interprets them beyond equality,
/// except for multi-entity jobs where the id is a comma-separated list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn report(id: impl Into<String>) -> Self {
        Self::new("report", id)
    }

    pub fn task(id: impl Into<String>) -> Self {
        Self::new("task", id)
    }

    /// Reject empty type or id.
    pub fn validate(&self) -> DomainResult<()> {
        if self.entity_type.trim().is_empty() {
            return Err(DomainError::validation("entity type must not be empty"));
        }
        if self.id.trim().is_empty() {
            return Err(DomainError::validation("entity id must not be empty"));
        }
        Ok(())
    }

    /// Split a comma-separated id into its parts (single ids yield one part).
    pub fn ids(&self) -> Vec<&str> {
        self.id
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Snapshot key used in before/after captures, e.g. `"report:42"`.
    pub fn snapshot_key(&self) -> String {
        format!("{}:{}", self.entity_type, self.id)
    }
}

impl core::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_splits_comma_lists() {
        let r = EntityRef::report("a, b,,c");
        assert_eq!(r.ids(), vec!["a", "b", "c"]);
        assert_eq!(EntityRef::report("single").ids(), vec!["single"]);
    }

    #[test]
    fn validate_rejects_blank_parts() {
        assert!(EntityRef::new("", "1").validate().is_err());
        assert!(EntityRef::new("report", " ").validate().is_err());
        assert!(EntityRef::report("1").validate().is_ok());
    }
}
