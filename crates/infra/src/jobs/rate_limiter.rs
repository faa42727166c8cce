//! Three-tier concurrency limiter: global, per task type, per mission.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use missionai_core::MissionId;

/// Ceilings for the three tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimits {
    pub global: u32,
    pub per_mission: u32,
    /// Per task-type ceilings; unknown types use `default_use_case`.
    pub per_use_case: HashMap<String, u32>,
    pub default_use_case: u32,
}

impl RateLimits {
    pub fn use_case_limit(&self, use_case_id: &str) -> u32 {
        self.per_use_case
            .get(use_case_id)
            .copied()
            .unwrap_or(self.default_use_case)
    }
}

#[derive(Debug, Default)]
struct Counters {
    global: u32,
    per_use_case: HashMap<String, u32>,
    per_mission: HashMap<MissionId, u32>,
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RateLimiterSnapshot {
    pub global: u32,
    pub per_use_case: HashMap<String, u32>,
    pub per_mission: HashMap<MissionId, u32>,
}

/// In-memory running-job counters.
///
/// All three counters sit behind one lock, so `acquire` is all-or-nothing and
/// `release` can never leave the tiers out of step.
#[derive(Debug)]
pub struct RateLimiter {
    limits: RateLimits,
    counters: Mutex<Counters>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn limits(&self) -> &RateLimits {
        &self.limits
    }

    /// Take one slot in every tier, or none at all.
    pub fn acquire(&self, use_case_id: &str, mission_id: MissionId) -> bool {
        let mut c = self.counters.lock();

        let use_case_running = c.per_use_case.get(use_case_id).copied().unwrap_or(0);
        let mission_running = c.per_mission.get(&mission_id).copied().unwrap_or(0);

        if c.global >= self.limits.global
            || use_case_running >= self.limits.use_case_limit(use_case_id)
            || mission_running >= self.limits.per_mission
        {
            return false;
        }

        c.global += 1;
        *c.per_use_case.entry(use_case_id.to_string()).or_insert(0) += 1;
        *c.per_mission.entry(mission_id).or_insert(0) += 1;
        true
    }

    /// Return one slot to every tier. Counters never drop below zero, so a
    /// double release is harmless.
    pub fn release(&self, use_case_id: &str, mission_id: MissionId) {
        let mut c = self.counters.lock();

        c.global = c.global.saturating_sub(1);
        if let Some(n) = c.per_use_case.get_mut(use_case_id) {
            *n = n.saturating_sub(1);
            if *n == 0 {
                c.per_use_case.remove(use_case_id);
            }
        }
        if let Some(n) = c.per_mission.get_mut(&mission_id) {
            *n = n.saturating_sub(1);
            if *n == 0 {
                c.per_mission.remove(&mission_id);
            }
        }
    }

    /// Acquire slots guarded by a permit that releases them on drop.
    pub fn try_acquire(self: &Arc<Self>, use_case_id: &str, mission_id: MissionId) -> Option<RatePermit> {
        if self.acquire(use_case_id, mission_id) {
            Some(RatePermit {
                limiter: Arc::clone(self),
                use_case_id: use_case_id.to_string(),
                mission_id,
            })
        } else {
            None
        }
    }

    pub fn is_global_saturated(&self) -> bool {
        self.counters.lock().global >= self.limits.global
    }

    pub fn global_running(&self) -> u32 {
        self.counters.lock().global
    }

    pub fn snapshot(&self) -> RateLimiterSnapshot {
        let c = self.counters.lock();
        RateLimiterSnapshot {
            global: c.global,
            per_use_case: c.per_use_case.clone(),
            per_mission: c.per_mission.clone(),
        }
    }
}

/// Slots held for one dispatched job; released exactly once on drop.
#[derive(Debug)]
pub struct RatePermit {
    limiter: Arc<RateLimiter>,
    use_case_id: String,
    mission_id: MissionId,
}

impl Drop for RatePermit {
    fn drop(&mut self) {
        self.limiter.release(&self.use_case_id, self.mission_id);
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn limiter(global: u32, mission: u32, use_case: u32) -> RateLimiter {
        RateLimiter::new(RateLimits {
            global,
            per_mission: mission,
            per_use_case: HashMap::from([("report.summarize".to_string(), use_case)]),
            default_use_case: 1,
        })
    }

    #[test]
    fn mission_saturation_grants_nothing() {
        let rl = limiter(10, 1, 10);
        let m = MissionId::new();
        assert!(rl.acquire("report.summarize", m));

        let before = rl.snapshot();
        assert!(!rl.acquire("report.summarize", m));
        assert_eq!(rl.snapshot(), before);
    }

    #[test]
    fn use_case_saturation_grants_nothing() {
        let rl = limiter(10, 10, 1);
        assert!(rl.acquire("report.summarize", MissionId::new()));
        assert!(!rl.acquire("report.summarize", MissionId::new()));
        assert_eq!(rl.global_running(), 1);
    }

    #[test]
    fn unknown_use_case_gets_default_ceiling() {
        let rl = limiter(10, 10, 5);
        assert!(rl.acquire("priority.score", MissionId::new()));
        assert!(!rl.acquire("priority.score", MissionId::new()));
    }

    #[test]
    fn double_release_is_floored_at_zero() {
        let rl = limiter(2, 2, 2);
        let m = MissionId::new();
        assert!(rl.acquire("report.summarize", m));
        rl.release("report.summarize", m);
        rl.release("report.summarize", m);

        assert_eq!(rl.snapshot(), RateLimiterSnapshot::default());
        assert!(rl.acquire("report.summarize", m));
        assert!(rl.acquire("report.summarize", m));
        assert!(rl.is_global_saturated());
    }

    #[test]
    fn permit_releases_on_drop() {
        let rl = Arc::new(limiter(1, 1, 1));
        let m = MissionId::new();
        {
            let _permit = rl.try_acquire("report.summarize", m).unwrap();
            assert!(rl.try_acquire("report.summarize", m).is_none());
        }
        assert_eq!(rl.global_running(), 0);
    }

    #[test]
    fn concurrent_acquire_never_exceeds_global() {
        let rl = Arc::new(limiter(4, 100, 100));
        let granted = Arc::new(std::sync::atomic::AtomicU32::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let rl = rl.clone();
                let granted = granted.clone();
                std::thread::spawn(move || {
                    if rl.acquire("report.summarize", MissionId::new()) {
                        granted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(granted.load(std::sync::atomic::Ordering::SeqCst), 4);
        assert_eq!(rl.global_running(), 4);
    }

    proptest! {
        #[test]
        fn acquire_is_all_or_nothing(ops in proptest::collection::vec((0u8..3, 0u8..3, any::<bool>()), 1..60)) {
            let rl = RateLimiter::new(RateLimits {
                global: 4,
                per_mission: 2,
                per_use_case: HashMap::new(),
                default_use_case: 3,
            });
            let missions = [MissionId::new(), MissionId::new(), MissionId::new()];
            let use_cases = ["a", "b", "c"];

            for (m, u, is_acquire) in ops {
                let mission = missions[m as usize];
                let use_case = use_cases[u as usize];
                let before = rl.snapshot();
                if is_acquire {
                    let ok = rl.acquire(use_case, mission);
                    let after = rl.snapshot();
                    if ok {
                        prop_assert_eq!(after.global, before.global + 1);
                    } else {
                        prop_assert_eq!(after, before);
                    }
                } else {
                    rl.release(use_case, mission);
                }

                let s = rl.snapshot();
                prop_assert!(s.global <= 4);
                prop_assert!(s.per_mission.values().all(|n| *n <= 2));
                prop_assert!(s.per_use_case.values().all(|n| *n <= 3));
            }
        }
    }
}
