//! Human review of AI results.
//!
//! - `results`: accept/reject service
//! - `actions`: the closed set of accept mutations
//! - `unit_of_work`: transactional staging of review writes
//! - `entities`, `audit`: the stores those writes land in

pub mod actions;
pub mod audit;
pub mod entities;
pub mod results;
pub mod unit_of_work;

pub use actions::{AcceptAction, ActionError};
pub use audit::{AuditEntry, InMemoryAuditLog};
pub use entities::{InMemoryEntityStore, TaskRecord};
pub use results::{AcceptReceipt, RejectReceipt, ResultService, ReviewError};
pub use unit_of_work::{InMemoryReviewStore, ReviewStore, ReviewStoreError, ReviewTx};
