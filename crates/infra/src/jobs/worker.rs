//! Worker loop: claim, dispatch, classify, retry or fall back.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use missionai_ai::{JobContext, UseCase, UseCaseError, UseCaseRegistry};
use missionai_events::{EventNotifier, JobEvent};

use crate::config::GlobalConfig;

use super::circuit_breaker::CircuitBreaker;
use super::policy::{ErrorClass, FailureStage, JobTransition, next_state, random_jitter};
use super::rate_limiter::{RateLimiter, RatePermit};
use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobCompletion, JobFailure};

/// How far past `not_before` a requeued job is expected to finish.
const REQUEUE_COMPLETION_ESTIMATE: Duration = Duration::from_secs(5);

/// Worker loop configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Delay between ticks.
    pub poll_interval: Duration,
    /// Jobs claimed per tick.
    pub batch_size: usize,
    /// Thread name, also used in logs.
    pub name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 10,
            name: "ai-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn from_global(global: &GlobalConfig) -> Self {
        Self {
            poll_interval: global.poll_interval(),
            batch_size: global.batch_size as usize,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub ticks: u64,
    pub claimed: u64,
    pub succeeded: u64,
    pub fallbacks: u64,
    pub requeued: u64,
    pub failed: u64,
    pub rate_limit_denials: u64,
    pub in_flight: usize,
    pub uptime_secs: u64,
}

/// Handle to control a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Stop polling, wait for in-flight jobs, then return.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().clone()
    }
}

/// Polls the job store and runs claimed jobs through their use case.
///
/// Claiming happens on the polling thread; each claimed job then runs on its
/// own thread holding a [`RatePermit`], so a slow provider call never delays
/// the next tick.
pub struct Worker<S, N> {
    store: S,
    registry: Arc<UseCaseRegistry>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    notifier: N,
    batch_size: usize,
    stats: Arc<Mutex<WorkerStats>>,
}

impl<S, N> Worker<S, N>
where
    S: JobStore + 'static,
    N: EventNotifier + 'static,
{
    pub fn new(
        store: S,
        registry: Arc<UseCaseRegistry>,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        notifier: N,
    ) -> Self {
        Self {
            store,
            registry,
            limiter,
            breaker,
            notifier,
            batch_size: WorkerConfig::default().batch_size,
            stats: Arc::new(Mutex::new(WorkerStats::default())),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().clone()
    }

    /// Run the loop on a background thread until [`WorkerHandle::shutdown`].
    pub fn spawn(self, config: WorkerConfig) -> std::io::Result<WorkerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = self.stats.clone();
        let worker = Arc::new(self.with_batch_size(config.batch_size));

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || worker_loop(worker, config, shutdown_rx))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }

    /// One scheduling pass: claim a batch and start a dispatch thread per job.
    ///
    /// Returns the dispatch threads so callers (tests, shutdown) can wait on
    /// them. Jobs the rate limiter refuses go straight back to the queue.
    pub fn tick(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>, JobStoreError> {
        self.stats.lock().ticks += 1;

        if self.limiter.is_global_saturated() {
            debug!(running = self.limiter.global_running(), "global concurrency saturated, skipping tick");
            return Ok(Vec::new());
        }

        let jobs = self.store.claim_batch(self.batch_size, Utc::now())?;
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        self.stats.lock().claimed += jobs.len() as u64;
        debug!(claimed = jobs.len(), "claimed jobs");

        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let Some(permit) = self.limiter.try_acquire(&job.use_case_id, job.mission_id) else {
                self.release_denied(&job);
                continue;
            };
            let worker = Arc::clone(self);
            handles.push(thread::spawn(move || worker.dispatch(job, permit)));
        }
        Ok(handles)
    }

    /// Run one tick and wait for every job it dispatched.
    pub fn run_tick(self: &Arc<Self>) -> Result<usize, JobStoreError> {
        let handles = self.tick()?;
        let dispatched = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                error!("job dispatch thread panicked");
            }
        }
        Ok(dispatched)
    }

    fn release_denied(&self, job: &Job) {
        self.stats.lock().rate_limit_denials += 1;
        debug!(
            job_id = %job.id,
            use_case = %job.use_case_id,
            mission_id = %job.mission_id,
            "rate limiter denied slots, returning job to queue"
        );
        if let Err(e) = self.store.release(job.id, Utc::now()) {
            error!(job_id = %job.id, error = %e, "failed to return job to queue");
        }
    }

    fn dispatch(&self, job: Job, permit: RatePermit) {
        let in_flight = InFlight::enter(&self.stats);
        let outcome = self.process(&job);
        drop(in_flight);
        drop(permit);

        if let Err(e) = outcome {
            error!(job_id = %job.id, use_case = %job.use_case_id, error = %e, "failed to record job outcome");
        }
    }

    fn process(&self, job: &Job) -> Result<(), JobStoreError> {
        let started = Instant::now();

        let handler = match self.registry.get(&job.use_case_id) {
            Ok(h) => h,
            Err(e) => {
                error!(job_id = %job.id, use_case = %job.use_case_id, "no handler registered for claimed job");
                let failure = JobFailure::new("UNKNOWN_USE_CASE", e.to_string());
                return self.fail_terminal(job, &failure);
            }
        };
        let ctx = job.to_context();

        self.notifier.notify(
            job.mission_id,
            JobEvent::Updated {
                job_id: job.id,
                status: job.status,
                attempt: job.attempt,
                estimated_complete_at: None,
            },
        );

        if self.breaker.is_open(&job.use_case_id) {
            info!(job_id = %job.id, use_case = %job.use_case_id, "circuit breaker open, running fallback");
            return self.run_fallback(job, handler.as_ref(), &ctx, started);
        }

        debug!(job_id = %job.id, use_case = %job.use_case_id, attempt = job.attempt, "executing job");
        match guarded(|| handler.execute(&ctx)) {
            Ok(out) => {
                let completion = JobCompletion {
                    output: out.output,
                    is_fallback: false,
                    model_name: out.model_name,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                };
                let done = self.store.complete(job.id, &completion, Utc::now())?;
                self.breaker.record_success(&job.use_case_id);
                self.stats.lock().succeeded += 1;
                info!(
                    job_id = %done.id,
                    use_case = %done.use_case_id,
                    processing_time_ms = completion.processing_time_ms,
                    "job succeeded"
                );
                self.notify_result(&done);
                Ok(())
            }
            Err(err) => self.handle_failure(job, handler.as_ref(), &ctx, err, started),
        }
    }

    fn handle_failure(
        &self,
        job: &Job,
        handler: &dyn UseCase,
        ctx: &JobContext,
        err: UseCaseError,
        started: Instant,
    ) -> Result<(), JobStoreError> {
        if let UseCaseError::Panicked(msg) = &err {
            error!(job_id = %job.id, use_case = %job.use_case_id, panic = %msg, "handler panicked");
        }
        let class = ErrorClass::classify(&err);
        if class.counts_toward_breaker() {
            self.breaker.record_failure(&job.use_case_id);
        }
        let failure = JobFailure::new(err.code(), err.to_string());

        match next_state(job.attempt, job.max_attempts, FailureStage::Execute(class), random_jitter()) {
            JobTransition::Requeue { delay } => {
                let now = Utc::now();
                let not_before = now + chrono::Duration::from_std(delay).unwrap_or_default();
                let requeued = self.store.requeue(job.id, not_before, Some(&failure), now)?;
                self.stats.lock().requeued += 1;
                warn!(
                    job_id = %job.id,
                    use_case = %job.use_case_id,
                    attempt = job.attempt,
                    error_code = %failure.code,
                    delay_ms = delay.as_millis() as u64,
                    "job failed, requeued"
                );

                self.notifier.notify(
                    job.mission_id,
                    JobEvent::Failed {
                        job_id: job.id,
                        error_code: failure.code,
                        error_message: failure.message,
                        will_retry: true,
                        next_attempt_at: Some(not_before),
                    },
                );
                let estimate = chrono::Duration::from_std(REQUEUE_COMPLETION_ESTIMATE).unwrap_or_default();
                self.notifier.notify(
                    job.mission_id,
                    JobEvent::Updated {
                        job_id: requeued.id,
                        status: requeued.status,
                        attempt: requeued.attempt,
                        estimated_complete_at: Some(not_before + estimate),
                    },
                );
                Ok(())
            }
            JobTransition::RunFallback => {
                warn!(
                    job_id = %job.id,
                    use_case = %job.use_case_id,
                    attempt = job.attempt,
                    max_attempts = job.max_attempts,
                    error_code = %failure.code,
                    "job failed, running fallback"
                );
                self.run_fallback(job, handler, ctx, started)
            }
            JobTransition::TerminalFail => self.fail_terminal(job, &failure),
        }
    }

    fn run_fallback(
        &self,
        job: &Job,
        handler: &dyn UseCase,
        ctx: &JobContext,
        started: Instant,
    ) -> Result<(), JobStoreError> {
        match guarded(|| handler.fallback(ctx)) {
            Ok(output) => {
                let completion = JobCompletion {
                    output,
                    is_fallback: true,
                    model_name: None,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                };
                let done = self.store.complete(job.id, &completion, Utc::now())?;
                self.stats.lock().fallbacks += 1;
                info!(job_id = %done.id, use_case = %done.use_case_id, "job succeeded with fallback");
                self.notify_result(&done);
                Ok(())
            }
            Err(e) => {
                let failure = JobFailure::new("FALLBACK_FAILED", e.to_string());
                self.fail_terminal(job, &failure)
            }
        }
    }

    fn fail_terminal(&self, job: &Job, failure: &JobFailure) -> Result<(), JobStoreError> {
        self.store.fail(job.id, failure, Utc::now())?;
        self.stats.lock().failed += 1;
        error!(
            job_id = %job.id,
            use_case = %job.use_case_id,
            error_code = %failure.code,
            error = %failure.message,
            "job failed"
        );
        self.notifier.notify(
            job.mission_id,
            JobEvent::Failed {
                job_id: job.id,
                error_code: failure.code.clone(),
                error_message: failure.message.clone(),
                will_retry: false,
                next_attempt_at: None,
            },
        );
        Ok(())
    }

    fn notify_result(&self, job: &Job) {
        self.notifier.notify(
            job.mission_id,
            JobEvent::ResultReady {
                job_id: job.id,
                use_case_id: job.use_case_id.clone(),
                entity: job.entity.clone(),
                output: job.output.clone().unwrap_or_default(),
                is_fallback: job.is_fallback,
                can_accept: true,
            },
        );
    }
}

/// Counts a dispatch in `WorkerStats::in_flight` until dropped.
struct InFlight<'a>(&'a Mutex<WorkerStats>);

impl<'a> InFlight<'a> {
    fn enter(stats: &'a Mutex<WorkerStats>) -> Self {
        stats.lock().in_flight += 1;
        Self(stats)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut stats = self.0.lock();
        stats.in_flight = stats.in_flight.saturating_sub(1);
    }
}

/// Run a handler call, turning a panic into [`UseCaseError::Panicked`] so the
/// job still reaches a recorded outcome.
fn guarded<T>(call: impl FnOnce() -> Result<T, UseCaseError>) -> Result<T, UseCaseError> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(UseCaseError::Panicked(panic_message(payload))))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn worker_loop<S, N>(worker: Arc<Worker<S, N>>, config: WorkerConfig, shutdown_rx: mpsc::Receiver<()>)
where
    S: JobStore + 'static,
    N: EventNotifier + 'static,
{
    info!(worker = %config.name, batch_size = config.batch_size, "AI worker started");
    let start_time = Instant::now();
    let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

    loop {
        worker.stats.lock().uptime_secs = start_time.elapsed().as_secs();

        match worker.tick() {
            Ok(handles) => in_flight.extend(handles),
            Err(e) => error!(worker = %config.name, error = %e, "failed to claim jobs"),
        }
        in_flight.retain(|h| !h.is_finished());

        match shutdown_rx.recv_timeout(config.poll_interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    for handle in in_flight {
        let _ = handle.join();
    }
    info!(worker = %config.name, "AI worker stopped");
}
