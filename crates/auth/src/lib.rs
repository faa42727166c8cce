//! `missionai-auth`: privilege checks for queue operations.
//!
//! Pure policy: no IO, no sessions. Callers resolve the acting user into a
//! [`Principal`] and pass it into submission/review operations.

pub mod authorize;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, explain_authorization, AuthorizationExplanation, AuthzError};
pub use principal::Principal;
pub use roles::PrivilegeLevel;
