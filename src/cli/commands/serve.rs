//! Serve command - runs the export job service

use crate::adapters::rows::{MemoryRowSourceFactory, RowSourceFactory};
use crate::config::CaravanConfig;
use crate::core::clock::{Clock, SystemClock};
use crate::core::export::ExporterService;
use crate::core::runner::{JobRunner, MemoryJobStore, TokioSleeper};
use crate::domain::SourceRow;
use crate::gateway::{
    IdempotencyGateway, MemoryBucketStore, MemoryIdempotencyStore, RateLimiter,
};
use crate::http::{serve, AppState};
use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// JSON file with an array of source rows served as the dataset
    /// (stand-in until a relational row-source adapter is wired in)
    #[arg(long)]
    pub seed_file: Option<String>,
}

impl ServeArgs {
    /// Runs the service until a shutdown signal arrives
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or the listener fails.
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let config = CaravanConfig::from_file(config_path)?;

        let rows: Vec<SourceRow> = match &self.seed_file {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                serde_json::from_str(&contents)?
            }
            None => Vec::new(),
        };
        tracing::info!(rows = rows.len(), "Loaded source dataset");

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let sources: Arc<dyn RowSourceFactory> = Arc::new(MemoryRowSourceFactory::new(rows));

        let exporter = Arc::new(ExporterService::new(config.export.clone(), clock.clone()));
        let runner = Arc::new(JobRunner::new(
            Arc::new(MemoryJobStore::new()),
            exporter,
            sources,
            &config.retry,
            clock.clone(),
            Arc::new(TokioSleeper),
        ));

        let limiter = Arc::new(RateLimiter::new(
            Arc::new(MemoryBucketStore::new()),
            config.rate_limit.clone(),
            clock.clone(),
        ));
        let idempotency = Arc::new(IdempotencyGateway::new(
            Arc::new(MemoryIdempotencyStore::new(config.idempotency.ttl_hours)),
            clock.clone(),
        ));

        let state = AppState {
            runner: runner.clone(),
            limiter,
            idempotency,
        };

        serve(&config, state, shutdown).await?;

        // The listener has drained; stop in-flight jobs at their next
        // chunk boundary before exiting
        runner.cancel_all();
        tracing::info!("Service stopped");
        Ok(0)
    }
}
