use serde::Serialize;
use thiserror::Error;

use missionai_core::UserId;

use crate::{Principal, PrivilegeLevel};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("insufficient privilege: requires {required}, has {actual}")]
    InsufficientPrivilege {
        required: PrivilegeLevel,
        actual: PrivilegeLevel,
    },
}

impl AuthzError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthzError::InsufficientPrivilege { .. } => "INSUFFICIENT_PRIVILEGE",
        }
    }
}

/// Check that `principal` holds at least `required`.
///
/// - No IO
/// - No panics
pub fn authorize(principal: &Principal, required: PrivilegeLevel) -> Result<(), AuthzError> {
    if principal.level.satisfies(required) {
        Ok(())
    } else {
        Err(AuthzError::InsufficientPrivilege {
            required,
            actual: principal.level,
        })
    }
}

/// Detailed, serializable explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub user_id: UserId,
    pub required: PrivilegeLevel,
    pub actual: PrivilegeLevel,
    pub granted: bool,
    pub reason: String,
}

/// Explain why a request would be allowed or denied (for audit/debug output).
pub fn explain_authorization(
    principal: &Principal,
    required: PrivilegeLevel,
) -> AuthorizationExplanation {
    let granted = principal.level.satisfies(required);
    let reason = if granted {
        format!(
            "level {} ({}) meets required level {} ({})",
            principal.level,
            principal.level.level(),
            required,
            required.level()
        )
    } else {
        format!(
            "level {} ({}) is below required level {} ({})",
            principal.level,
            principal.level.level(),
            required,
            required.level()
        )
    };

    AuthorizationExplanation {
        user_id: principal.user_id,
        required,
        actual: principal.level,
        granted,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(level: PrivilegeLevel) -> Principal {
        Principal::new(UserId::new(), level)
    }

    #[test]
    fn allows_equal_or_higher_level() {
        assert!(authorize(&principal(PrivilegeLevel::Officer), PrivilegeLevel::Officer).is_ok());
        assert!(authorize(&principal(PrivilegeLevel::Owner), PrivilegeLevel::Officer).is_ok());
    }

    #[test]
    fn denies_lower_level_with_details() {
        let err = authorize(&principal(PrivilegeLevel::Volunteer), PrivilegeLevel::Officer)
            .unwrap_err();
        assert_eq!(
            err,
            AuthzError::InsufficientPrivilege {
                required: PrivilegeLevel::Officer,
                actual: PrivilegeLevel::Volunteer,
            }
        );
        assert_eq!(err.code(), "INSUFFICIENT_PRIVILEGE");
    }

    #[test]
    fn explanation_matches_decision() {
        let p = principal(PrivilegeLevel::Public);
        let denied = explain_authorization(&p, PrivilegeLevel::Volunteer);
        assert!(!denied.granted);
        assert!(denied.reason.contains("below"));

        let granted = explain_authorization(&p, PrivilegeLevel::Public);
        assert!(granted.granted);
    }
}
