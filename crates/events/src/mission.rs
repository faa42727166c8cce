use std::sync::mpsc::{RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

use missionai_core::MissionId;

use crate::{EventEnvelope, Subscription};

/// Messages that belong to exactly one mission.
pub trait MissionScoped {
    fn mission_id(&self) -> MissionId;
}

impl<E> MissionScoped for EventEnvelope<E> {
    fn mission_id(&self) -> MissionId {
        self.mission_id()
    }
}

/// A subscription that only yields messages for one mission.
///
/// Messages for other missions are read off the underlying channel and
/// discarded.
#[derive(Debug)]
pub struct MissionSubscription<M> {
    mission_id: MissionId,
    inner: Subscription<M>,
}

impl<M: MissionScoped> MissionSubscription<M> {
    pub fn new(mission_id: MissionId, inner: Subscription<M>) -> Self {
        Self { mission_id, inner }
    }

    pub fn mission_id(&self) -> MissionId {
        self.mission_id
    }

    /// Next buffered message for this mission, if any.
    pub fn try_recv(&self) -> Option<M> {
        loop {
            match self.inner.try_recv() {
                Ok(m) if m.mission_id() == self.mission_id => return Some(m),
                Ok(_) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    /// Wait up to `timeout` for the next message for this mission.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<M> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.inner.recv_timeout(remaining) {
                Ok(m) if m.mission_id() == self.mission_id => return Some(m),
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
    }

    /// Drain all buffered messages for this mission.
    pub fn drain(&self) -> Vec<M> {
        let mut out = Vec::new();
        while let Some(m) = self.try_recv() {
            out.push(m);
        }
        out
    }
}
