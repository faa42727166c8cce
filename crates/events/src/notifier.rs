//! Mission-scoped notification fan-out.

use chrono::Utc;

use missionai_core::MissionId;

use crate::{EventBus, EventEnvelope, JobEvent, MissionSubscription};

/// Envelope type carried on the notification bus.
pub type JobEnvelope = EventEnvelope<JobEvent>;

/// Sink for job lifecycle events.
///
/// `notify` never fails from the caller's point of view: delivery is
/// best-effort and errors are logged by the implementation.
pub trait EventNotifier: Send + Sync {
    fn notify(&self, mission_id: MissionId, event: JobEvent);
}

impl<T: EventNotifier + ?Sized> EventNotifier for std::sync::Arc<T> {
    fn notify(&self, mission_id: MissionId, event: JobEvent) {
        (**self).notify(mission_id, event)
    }
}

/// Publishes job events onto an [`EventBus`].
#[derive(Debug)]
pub struct BusNotifier<B> {
    bus: B,
}

impl<B> BusNotifier<B>
where
    B: EventBus<JobEnvelope>,
{
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Subscribe to events of a single mission.
    pub fn subscribe_mission(&self, mission_id: MissionId) -> MissionSubscription<JobEnvelope> {
        MissionSubscription::new(mission_id, self.bus.subscribe())
    }
}

impl<B> EventNotifier for BusNotifier<B>
where
    B: EventBus<JobEnvelope>,
{
    fn notify(&self, mission_id: MissionId, event: JobEvent) {
        let job_id = event.job_id();
        let kind = event.kind();
        let envelope = EventEnvelope::new(mission_id, Utc::now(), event);

        match self.bus.publish(envelope) {
            Ok(()) => {
                tracing::debug!(
                    mission_id = %mission_id,
                    job_id = %job_id,
                    kind,
                    "job event published"
                );
            }
            Err(e) => {
                tracing::warn!(
                    mission_id = %mission_id,
                    job_id = %job_id,
                    kind,
                    error = ?e,
                    "job event dropped"
                );
            }
        }
    }
}

/// Discards every event. Useful when no transport is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl EventNotifier for NoopNotifier {
    fn notify(&self, _mission_id: MissionId, _event: JobEvent) {}
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use missionai_core::{JobId, JobStatus};

    use super::*;
    use crate::InMemoryEventBus;

    fn updated(job_id: JobId) -> JobEvent {
        JobEvent::Updated {
            job_id,
            status: JobStatus::Running,
            attempt: 1,
            estimated_complete_at: None,
        }
    }

    #[test]
    fn mission_subscription_filters_other_missions() {
        let notifier = BusNotifier::new(Arc::new(InMemoryEventBus::new()));
        let m1 = MissionId::new();
        let m2 = MissionId::new();
        let sub = notifier.subscribe_mission(m1);

        let j1 = JobId::new();
        notifier.notify(m2, updated(JobId::new()));
        notifier.notify(m1, updated(j1));

        let got = sub.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].mission_id(), m1);
        assert_eq!(got[0].payload().job_id(), j1);
    }

    #[test]
    fn notify_without_subscribers_is_fine() {
        let notifier = BusNotifier::new(InMemoryEventBus::new());
        notifier.notify(MissionId::new(), updated(JobId::new()));
    }
}
