use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::use_case::UseCase;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no handler registered for use case '{0}'")]
    Unregistered(String),
}

/// Task-type id → handler table, built once at startup.
#[derive(Default, Clone)]
pub struct UseCaseRegistry {
    handlers: HashMap<String, Arc<dyn UseCase>>,
}

impl UseCaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own id, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn UseCase>) -> &mut Self {
        self.handlers.insert(handler.id().to_string(), handler);
        self
    }

    pub fn get(&self, use_case_id: &str) -> Result<Arc<dyn UseCase>, RegistryError> {
        self.handlers
            .get(use_case_id)
            .cloned()
            .ok_or_else(|| RegistryError::Unregistered(use_case_id.to_string()))
    }

    pub fn contains(&self, use_case_id: &str) -> bool {
        self.handlers.contains_key(use_case_id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Fail on the first id in `ids` that has no handler.
    pub fn ensure_registered<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Result<(), RegistryError> {
        for id in ids {
            if !self.contains(id) {
                return Err(RegistryError::Unregistered(id.to_string()));
            }
        }
        Ok(())
    }
}

impl core::fmt::Debug for UseCaseRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UseCaseRegistry")
            .field("handlers", &self.ids())
            .finish()
    }
}
