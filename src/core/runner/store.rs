//! Job store abstraction
//!
//! Job records live behind a trait so a persistent backend can replace the
//! in-memory store without touching the runner. Status reads go straight to
//! the store and never wait on a running export.

use crate::domain::{CaravanError, ExportJob, JobId, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Storage for export job records
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a newly created job
    ///
    /// # Errors
    ///
    /// Returns an error if a job with the same id already exists.
    async fn insert(&self, job: ExportJob) -> Result<()>;

    /// Fetches a job by id
    ///
    /// # Errors
    ///
    /// Returns [`CaravanError::JobNotFound`] for unknown ids.
    async fn get(&self, id: &JobId) -> Result<ExportJob>;

    /// Persists the current state of a job
    ///
    /// # Errors
    ///
    /// Returns [`CaravanError::JobNotFound`] for unknown ids.
    async fn update(&self, job: &ExportJob) -> Result<()>;
}

/// In-memory job store
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, ExportJob>>,
}

impl MemoryJobStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: ExportJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job.id.as_str()) {
            return Err(CaravanError::Export(format!(
                "job {} already exists",
                job.id
            )));
        }
        jobs.insert(job.id.as_str().to_string(), job);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<ExportJob> {
        let jobs = self.jobs.read().await;
        jobs.get(id.as_str())
            .cloned()
            .ok_or_else(|| CaravanError::JobNotFound(id.as_str().to_string()))
    }

    async fn update(&self, job: &ExportJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(job.id.as_str()) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(CaravanError::JobNotFound(job.id.as_str().to_string())),
        }
    }
}
