//! Job runner
//!
//! Owns the lifecycle of every export job: creates the record, spawns the
//! worker task, applies the retry/backoff engine around transient failures,
//! honors cancellation and timeouts, and records the terminal state.
//! Submission is safe to call concurrently for different jobs; status reads
//! go straight to the job store and never block a running export.

pub mod store;

pub use store::{JobStore, MemoryJobStore};

use crate::adapters::rows::RowSourceFactory;
use crate::config::RetryConfig;
use crate::core::clock::Clock;
use crate::core::export::{ExportOutcome, ExportProgress, ExporterService, FinishedFile};
use crate::core::retry::RetryPolicy;
use crate::domain::{
    CaravanError, ExportFilter, ExportFormat, ExportJob, JobId, Result,
};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use metrics::{counter, histogram};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Injectable sleep, so retry delays cost nothing in tests
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspends the calling task for the given duration
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer
#[derive(Debug, Clone, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Orchestrates export jobs end to end
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    exporter: Arc<ExporterService>,
    sources: Arc<dyn RowSourceFactory>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    job_timeout: ChronoDuration,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    running: Mutex<HashMap<String, watch::Sender<bool>>>,
}

impl JobRunner {
    /// Creates a runner
    pub fn new(
        store: Arc<dyn JobStore>,
        exporter: Arc<ExporterService>,
        sources: Arc<dyn RowSourceFactory>,
        retry: &RetryConfig,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            store,
            exporter,
            sources,
            policy: RetryPolicy {
                base_delay: Duration::from_millis(retry.base_delay_ms),
                max_delay: Duration::from_millis(retry.max_delay_ms),
                max_attempts: retry.max_attempts,
            },
            attempt_timeout: Duration::from_secs(retry.attempt_timeout_secs),
            job_timeout: ChronoDuration::seconds(retry.job_timeout_secs as i64),
            clock,
            sleeper,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Creates the job record and spawns its worker task
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad filter parameters; no job is
    /// created in that case.
    pub async fn submit(
        self: Arc<Self>,
        format: ExportFormat,
        filter: ExportFilter,
        correlation_id: String,
    ) -> Result<JobId> {
        filter.validate()?;

        let id = JobId::generate();
        let job = ExportJob::new(
            id.clone(),
            format,
            filter,
            correlation_id.clone(),
            self.clock.now(),
        );
        self.store.insert(job).await?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.running
            .lock()
            .expect("running jobs lock poisoned")
            .insert(id.as_str().to_string(), cancel_tx);

        counter!("caravan_jobs_submitted_total", "format" => format.to_string()).increment(1);
        tracing::info!(
            job_id = %id,
            format = %format,
            correlation_id = %correlation_id,
            "Job submitted"
        );

        let runner = Arc::clone(&self);
        let task_id = id.clone();
        tokio::spawn(async move {
            runner.run_job(task_id, cancel_rx).await;
        });

        Ok(id)
    }

    /// Current state of a job
    ///
    /// Reads the persisted record only; never waits on the worker.
    ///
    /// # Errors
    ///
    /// Returns [`CaravanError::JobNotFound`] for unknown ids.
    pub async fn get_status(&self, id: &JobId) -> Result<ExportJob> {
        self.store.get(id).await
    }

    /// Requests cancellation of a running job
    ///
    /// Takes effect at the job's next chunk boundary; an in-flight chunk
    /// write completes first.
    ///
    /// # Errors
    ///
    /// Returns [`CaravanError::JobNotFound`] if the job is not running.
    pub fn cancel(&self, id: &JobId) -> Result<()> {
        let running = self.running.lock().expect("running jobs lock poisoned");
        match running.get(id.as_str()) {
            Some(cancel_tx) => {
                let _ = cancel_tx.send(true);
                Ok(())
            }
            None => Err(CaravanError::JobNotFound(id.as_str().to_string())),
        }
    }

    /// Cancels every running job, for graceful shutdown
    pub fn cancel_all(&self) {
        let running = self.running.lock().expect("running jobs lock poisoned");
        for cancel_tx in running.values() {
            let _ = cancel_tx.send(true);
        }
    }

    /// Number of jobs currently running
    pub fn running_count(&self) -> usize {
        self.running
            .lock()
            .expect("running jobs lock poisoned")
            .len()
    }

    /// Runs one job to a terminal state, retrying transient failures
    async fn run_job(&self, id: JobId, cancel: watch::Receiver<bool>) {
        let started = self.clock.now();
        let deadline = started + self.job_timeout;

        let mut job = match self.store.get(&id).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Job vanished before start");
                return;
            }
        };

        let mut progress = ExportProgress::default();
        let outcome = loop {
            job.mark_running(self.clock.now());
            if let Err(e) = self.store.update(&job).await {
                break Err(e);
            }

            let result = self.run_attempt(&job, &mut progress, &cancel).await;
            match result {
                Ok(outcome) => break Ok(outcome),
                Err(err) if err.is_transient() && self.policy.allows_retry(job.attempts) => {
                    let delay = match self.policy.next_delay(id.as_str(), job.attempts) {
                        Ok(delay) => delay,
                        Err(e) => break Err(e),
                    };
                    if self.clock.now() + chrono_from_std(delay) >= deadline {
                        tracing::warn!(
                            job_id = %id,
                            "Job timeout ceiling reached, not retrying"
                        );
                        break Err(err);
                    }
                    tracing::warn!(
                        job_id = %id,
                        attempt = job.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, backing off before retry"
                    );
                    counter!("caravan_job_retries_total").increment(1);
                    self.sleeper.sleep(delay).await;

                    if !ExporterService::is_resumable(job.format) {
                        progress.reset();
                    }
                }
                Err(err) => break Err(err),
            }
        };

        let now = self.clock.now();
        match outcome {
            Ok(outcome) => {
                let ExportOutcome {
                    files,
                    manifest_file,
                    rows_exported,
                    rows_skipped,
                } = outcome;
                job.mark_succeeded(
                    files.iter().map(FinishedFile::to_output_file).collect(),
                    manifest_file,
                    now,
                );
                if let Err(e) = self.store.update(&job).await {
                    tracing::error!(job_id = %id, error = %e, "Failed to persist success");
                }
                counter!("caravan_jobs_total", "outcome" => "succeeded").increment(1);
                tracing::info!(
                    job_id = %id,
                    correlation_id = %job.correlation_id,
                    rows = rows_exported,
                    skipped = rows_skipped,
                    attempts = job.attempts,
                    "Job succeeded"
                );
            }
            Err(err) => {
                job.mark_failed(&err, now);
                if let Err(e) = self.store.update(&job).await {
                    tracing::error!(job_id = %id, error = %e, "Failed to persist failure");
                }
                self.discard_outputs(&job);
                counter!("caravan_jobs_total", "outcome" => "failed").increment(1);
                counter!("caravan_job_failures_total", "reason" => err.code()).increment(1);
                tracing::error!(
                    job_id = %id,
                    correlation_id = %job.correlation_id,
                    reason = err.code(),
                    attempts = job.attempts,
                    error = %err,
                    "Job failed"
                );
            }
        }

        let elapsed = (now - started).num_milliseconds().max(0) as f64 / 1000.0;
        histogram!("caravan_job_duration_seconds").record(elapsed);

        self.running
            .lock()
            .expect("running jobs lock poisoned")
            .remove(id.as_str());
    }

    /// One export attempt under the per-attempt timeout
    async fn run_attempt(
        &self,
        job: &ExportJob,
        progress: &mut ExportProgress,
        cancel: &watch::Receiver<bool>,
    ) -> Result<ExportOutcome> {
        let mut source = self.sources.open(&job.filter).await?;
        let attempt = self
            .exporter
            .export(job, source.as_mut(), progress, cancel);

        match tokio::time::timeout(self.attempt_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(CaravanError::TransientIo(format!(
                "export attempt exceeded {}s",
                self.attempt_timeout.as_secs()
            ))),
        }
    }

    /// Removes a failed job's output directory, temp files included
    fn discard_outputs(&self, job: &ExportJob) {
        let dir = self.exporter.job_dir(job);
        if dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                tracing::warn!(
                    job_id = %job.id,
                    dir = %dir.display(),
                    error = %e,
                    "Failed to remove outputs of failed job"
                );
            }
        }
    }
}

fn chrono_from_std(duration: Duration) -> ChronoDuration {
    ChronoDuration::milliseconds(duration.as_millis() as i64)
}
