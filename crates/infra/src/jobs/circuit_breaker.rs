//! Per task-type circuit breaker.
//!
//! Opens a cooldown window once `threshold` consecutive failures are recorded.
//! A success resets the consecutive counter but never lifts an active
//! cooldown; only time or a manual [`CircuitBreaker::reset`] does.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

/// Threshold and cooldown for one task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            threshold: 3,
            cooldown: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerState {
    pub use_case_id: String,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl CircuitBreakerState {
    pub fn new(use_case_id: impl Into<String>) -> Self {
        Self {
            use_case_id: use_case_id.into(),
            consecutive_failures: 0,
            total_failures: 0,
            total_successes: 0,
            last_failure_at: None,
            cooldown_until: None,
        }
    }

    /// Open iff a cooldown is set and still in the future.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    pub fn remaining_cooldown_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.cooldown_until
            .filter(|until| *until > now)
            .and_then(|until| (until - now).to_std().ok())
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    settings: HashMap<String, BreakerSettings>,
    default_settings: BreakerSettings,
    states: Mutex<HashMap<String, CircuitBreakerState>>,
}

impl CircuitBreaker {
    pub fn new(settings: HashMap<String, BreakerSettings>) -> Self {
        Self {
            settings,
            default_settings: BreakerSettings::default(),
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_settings(mut self, settings: BreakerSettings) -> Self {
        self.default_settings = settings;
        self
    }

    pub fn settings_for(&self, use_case_id: &str) -> BreakerSettings {
        self.settings
            .get(use_case_id)
            .copied()
            .unwrap_or(self.default_settings)
    }

    pub fn record_failure(&self, use_case_id: &str) -> CircuitBreakerState {
        self.record_failure_at(use_case_id, Utc::now())
    }

    /// Count a failure; opens the cooldown once the threshold is reached.
    pub fn record_failure_at(&self, use_case_id: &str, now: DateTime<Utc>) -> CircuitBreakerState {
        let settings = self.settings_for(use_case_id);
        let mut states = self.states.lock();
        let state = states
            .entry(use_case_id.to_string())
            .or_insert_with(|| CircuitBreakerState::new(use_case_id));

        state.consecutive_failures += 1;
        state.total_failures += 1;
        state.last_failure_at = Some(now);

        if state.consecutive_failures >= settings.threshold {
            let cooldown = chrono::Duration::from_std(settings.cooldown).unwrap_or(chrono::Duration::zero());
            state.cooldown_until = Some(now + cooldown);
            warn!(
                use_case = %use_case_id,
                consecutive_failures = state.consecutive_failures,
                cooldown_secs = settings.cooldown.as_secs(),
                "circuit breaker open"
            );
        }

        state.clone()
    }

    /// Reset the consecutive counter. An active cooldown is left untouched.
    pub fn record_success(&self, use_case_id: &str) -> CircuitBreakerState {
        let mut states = self.states.lock();
        let state = states
            .entry(use_case_id.to_string())
            .or_insert_with(|| CircuitBreakerState::new(use_case_id));

        state.consecutive_failures = 0;
        state.total_successes += 1;
        state.clone()
    }

    pub fn is_open(&self, use_case_id: &str) -> bool {
        self.is_open_at(use_case_id, Utc::now())
    }

    pub fn is_open_at(&self, use_case_id: &str, now: DateTime<Utc>) -> bool {
        self.states
            .lock()
            .get(use_case_id)
            .is_some_and(|s| s.is_open_at(now))
    }

    pub fn remaining_cooldown(&self, use_case_id: &str) -> Option<Duration> {
        self.remaining_cooldown_at(use_case_id, Utc::now())
    }

    pub fn remaining_cooldown_at(&self, use_case_id: &str, now: DateTime<Utc>) -> Option<Duration> {
        self.states
            .lock()
            .get(use_case_id)
            .and_then(|s| s.remaining_cooldown_at(now))
    }

    /// Manual recovery: clear the failure counter and any cooldown.
    pub fn reset(&self, use_case_id: &str) {
        if let Some(state) = self.states.lock().get_mut(use_case_id) {
            state.consecutive_failures = 0;
            state.cooldown_until = None;
        }
    }

    pub fn state(&self, use_case_id: &str) -> CircuitBreakerState {
        self.states
            .lock()
            .get(use_case_id)
            .cloned()
            .unwrap_or_else(|| CircuitBreakerState::new(use_case_id))
    }

    /// Every task type seen so far, sorted by id.
    pub fn states(&self) -> Vec<CircuitBreakerState> {
        let mut all: Vec<_> = self.states.lock().values().cloned().collect();
        all.sort_by(|a, b| a.use_case_id.cmp(&b.use_case_id));
        all
    }
}
