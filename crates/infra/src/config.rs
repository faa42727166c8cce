//! Queue configuration.
//!
//! Loaded once at startup from TOML, then adjusted by `MISSIONAI_*`
//! environment variables. Example:
//!
//! ```toml
//! [global]
//! global_max_concurrency = 10
//! mission_max_concurrency = 5
//! poll_interval_ms = 1000
//!
//! [use_cases."report.summarize"]
//! min_level = "volunteer"
//! max_concurrency = 3
//! default_priority = 5
//! max_attempts = 3
//! breaker_threshold = 3
//! breaker_cooldown_secs = 300
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use missionai_auth::PrivilegeLevel;

use crate::jobs::{BreakerSettings, RateLimits};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: '{value}'")]
    Env { var: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Process-wide queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub global_max_concurrency: u32,
    pub mission_max_concurrency: u32,
    pub poll_interval_ms: u64,
    pub batch_size: u32,
    /// Per-job cost used for the estimated-wait heuristic.
    pub per_job_estimate_ms: u64,
    pub accept_min_level: PrivilegeLevel,
    pub reject_min_level: PrivilegeLevel,
    /// Level allowed to cancel jobs created by someone else.
    pub cancel_min_level: PrivilegeLevel,
    pub worker_enabled: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            global_max_concurrency: 10,
            mission_max_concurrency: 5,
            poll_interval_ms: 1_000,
            batch_size: 10,
            per_job_estimate_ms: 5_000,
            accept_min_level: PrivilegeLevel::Officer,
            reject_min_level: PrivilegeLevel::Volunteer,
            cancel_min_level: PrivilegeLevel::Officer,
            worker_enabled: true,
        }
    }
}

impl GlobalConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn per_job_estimate(&self) -> Duration {
        Duration::from_millis(self.per_job_estimate_ms)
    }
}

/// Settings for one task type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UseCaseConfig {
    pub min_level: PrivilegeLevel,
    pub max_concurrency: u32,
    pub default_priority: i32,
    pub max_attempts: u32,
    pub breaker_threshold: u32,
    pub breaker_cooldown_secs: u64,
}

impl Default for UseCaseConfig {
    fn default() -> Self {
        Self {
            min_level: PrivilegeLevel::Volunteer,
            max_concurrency: 3,
            default_priority: 5,
            max_attempts: 3,
            breaker_threshold: 3,
            breaker_cooldown_secs: 300,
        }
    }
}

impl UseCaseConfig {
    pub fn breaker_settings(&self) -> BreakerSettings {
        BreakerSettings {
            threshold: self.breaker_threshold,
            cooldown: Duration::from_secs(self.breaker_cooldown_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub global: GlobalConfig,
    pub use_cases: BTreeMap<String, UseCaseConfig>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let uc = |min_level, max_concurrency, default_priority| UseCaseConfig {
            min_level,
            max_concurrency,
            default_priority,
            ..UseCaseConfig::default()
        };

        let use_cases = BTreeMap::from([
            ("report.summarize".to_string(), uc(PrivilegeLevel::Volunteer, 3, 5)),
            ("report.cluster".to_string(), uc(PrivilegeLevel::Officer, 2, 4)),
            ("task.draft".to_string(), uc(PrivilegeLevel::Officer, 3, 5)),
            ("resource.recommend".to_string(), uc(PrivilegeLevel::Officer, 2, 3)),
            ("priority.score".to_string(), uc(PrivilegeLevel::Volunteer, 5, 7)),
        ]);

        Self {
            global: GlobalConfig::default(),
            use_cases,
        }
    }
}

impl QueueConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Apply `MISSIONAI_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary lookup (used by tests).
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(var: &str, value: String) -> Result<T, ConfigError> {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|_| ConfigError::Env { var: var.to_string(), value })
        }

        const GLOBAL_MAX: &str = "MISSIONAI_GLOBAL_MAX_CONCURRENCY";
        const MISSION_MAX: &str = "MISSIONAI_MISSION_MAX_CONCURRENCY";
        const POLL: &str = "MISSIONAI_POLL_INTERVAL_MS";
        const BATCH: &str = "MISSIONAI_BATCH_SIZE";
        const ENABLED: &str = "MISSIONAI_WORKER_ENABLED";

        if let Some(v) = lookup(GLOBAL_MAX) {
            self.global.global_max_concurrency = parse(GLOBAL_MAX, v)?;
        }
        if let Some(v) = lookup(MISSION_MAX) {
            self.global.mission_max_concurrency = parse(MISSION_MAX, v)?;
        }
        if let Some(v) = lookup(POLL) {
            self.global.poll_interval_ms = parse(POLL, v)?;
        }
        if let Some(v) = lookup(BATCH) {
            self.global.batch_size = parse(BATCH, v)?;
        }
        if let Some(v) = lookup(ENABLED) {
            self.global.worker_enabled = parse(ENABLED, v)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.global;
        if g.global_max_concurrency == 0 || g.mission_max_concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency ceilings must be > 0".into()));
        }
        if g.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".into()));
        }
        if g.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be > 0".into()));
        }
        for (id, uc) in &self.use_cases {
            if uc.max_concurrency == 0 {
                return Err(ConfigError::Invalid(format!("{id}: max_concurrency must be > 0")));
            }
            if uc.max_attempts == 0 {
                return Err(ConfigError::Invalid(format!("{id}: max_attempts must be > 0")));
            }
            if uc.breaker_threshold == 0 {
                return Err(ConfigError::Invalid(format!("{id}: breaker_threshold must be > 0")));
            }
        }
        Ok(())
    }

    pub fn use_case(&self, id: &str) -> Option<&UseCaseConfig> {
        self.use_cases.get(id)
    }

    pub fn rate_limits(&self) -> RateLimits {
        RateLimits {
            global: self.global.global_max_concurrency,
            per_mission: self.global.mission_max_concurrency,
            per_use_case: self
                .use_cases
                .iter()
                .map(|(id, uc)| (id.clone(), uc.max_concurrency))
                .collect(),
            default_use_case: UseCaseConfig::default().max_concurrency,
        }
    }

    pub fn breaker_settings(&self) -> HashMap<String, BreakerSettings> {
        self.use_cases
            .iter()
            .map(|(id, uc)| (id.clone(), uc.breaker_settings()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_ship_five_task_types_and_validate() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.use_cases.len(), 5);
        assert!(cfg.use_case("report.summarize").is_some());
        cfg.validate().unwrap();
        assert_eq!(cfg.global.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg = QueueConfig::from_toml_str(
            r#"
            [global]
            batch_size = 3
            accept_min_level = "director"

            [use_cases."report.summarize"]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(cfg.global.batch_size, 3);
        assert_eq!(cfg.global.global_max_concurrency, 10);
        assert_eq!(cfg.global.accept_min_level, PrivilegeLevel::Director);
        assert_eq!(cfg.use_cases.len(), 1);
        let uc = cfg.use_case("report.summarize").unwrap();
        assert_eq!(uc.max_attempts, 5);
        assert_eq!(uc.breaker_threshold, 3);
    }

    #[test]
    fn env_overrides_apply_and_reject_garbage() {
        let cfg = QueueConfig::default()
            .with_overrides_from(|var| match var {
                "MISSIONAI_BATCH_SIZE" => Some("25".into()),
                "MISSIONAI_WORKER_ENABLED" => Some("false".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(cfg.global.batch_size, 25);
        assert!(!cfg.global.worker_enabled);

        let err = QueueConfig::default()
            .with_overrides_from(|var| (var == "MISSIONAI_POLL_INTERVAL_MS").then(|| "soon".into()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut cfg = QueueConfig::default();
        cfg.global.batch_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = QueueConfig::default();
        if let Some(uc) = cfg.use_cases.get_mut("task.draft") {
            uc.max_attempts = 0;
        }
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn derived_limits_follow_use_cases() {
        let cfg = QueueConfig::default();
        let limits = cfg.rate_limits();
        assert_eq!(limits.global, 10);
        assert_eq!(limits.use_case_limit("report.cluster"), 2);
        assert_eq!(cfg.breaker_settings()["report.summarize"].cooldown, Duration::from_secs(300));
    }
}
