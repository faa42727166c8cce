//! Job lifecycle notifications.
//!
//! The queue broadcasts four event kinds per mission (queued, updated,
//! result-ready, failed). Delivery is best-effort: the job store stays the
//! source of truth and subscribers must tolerate missed events.

pub mod bus;
pub mod envelope;
pub mod in_memory_bus;
pub mod job_event;
pub mod mission;
pub mod notifier;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use job_event::JobEvent;
pub use mission::{MissionScoped, MissionSubscription};
pub use notifier::{BusNotifier, EventNotifier, JobEnvelope, NoopNotifier};
