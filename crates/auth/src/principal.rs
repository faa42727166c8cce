use serde::{Deserialize, Serialize};

use missionai_core::UserId;

use crate::PrivilegeLevel;

/// The acting user, as resolved by the caller (session, token, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub level: PrivilegeLevel,
}

impl Principal {
    pub fn new(user_id: UserId, level: PrivilegeLevel) -> Self {
        Self {
            user_id,
            display_name: None,
            level,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}
