//! Startup wiring: one place that turns a [`QueueConfig`] and a handler
//! registry into the services and the worker.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use missionai_ai::{RegistryError, UseCaseRegistry};
use missionai_events::EventNotifier;

use crate::config::{ConfigError, QueueConfig};
use crate::jobs::{
    CircuitBreaker, JobStore, RateLimiter, SubmissionService, Worker, WorkerConfig, WorkerHandle,
};
use crate::review::{ResultService, ReviewStore};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A configured task type has no handler.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Shared queue components, built once per process.
pub struct QueueRuntime<S, N> {
    config: Arc<QueueConfig>,
    store: S,
    registry: Arc<UseCaseRegistry>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    notifier: N,
}

impl<S, N> QueueRuntime<S, N>
where
    S: JobStore + Clone + 'static,
    N: EventNotifier + Clone + 'static,
{
    /// Validate the config and check every configured task type is registered.
    pub fn build(config: QueueConfig, store: S, registry: UseCaseRegistry, notifier: N) -> Result<Self, RuntimeError> {
        config.validate()?;
        registry.ensure_registered(config.use_cases.keys().map(String::as_str))?;

        let limiter = Arc::new(RateLimiter::new(config.rate_limits()));
        let breaker = Arc::new(CircuitBreaker::new(config.breaker_settings()));

        info!(
            use_cases = config.use_cases.len(),
            global_max_concurrency = config.global.global_max_concurrency,
            mission_max_concurrency = config.global.mission_max_concurrency,
            "AI queue runtime built"
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            registry: Arc::new(registry),
            limiter,
            breaker,
            notifier,
        })
    }

    pub fn config(&self) -> &Arc<QueueConfig> {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn submission(&self) -> SubmissionService<S, N> {
        SubmissionService::new(
            self.store.clone(),
            self.breaker.clone(),
            self.notifier.clone(),
            self.config.clone(),
        )
    }

    pub fn results<R: ReviewStore>(&self, review_store: R) -> ResultService<R> {
        ResultService::new(review_store, self.config.clone())
    }

    pub fn worker(&self) -> Worker<S, N> {
        Worker::new(
            self.store.clone(),
            self.registry.clone(),
            self.limiter.clone(),
            self.breaker.clone(),
            self.notifier.clone(),
        )
        .with_batch_size(self.config.global.batch_size as usize)
    }

    /// Start the polling thread, unless `worker_enabled` is off.
    pub fn spawn_worker(&self) -> Result<Option<WorkerHandle>, RuntimeError> {
        if !self.config.global.worker_enabled {
            info!("AI worker disabled by configuration");
            return Ok(None);
        }
        let config = WorkerConfig::from_global(&self.config.global);
        Ok(Some(self.worker().spawn(config)?))
    }
}
