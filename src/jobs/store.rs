//! Job storage.
//!
//! `JobStore` is the seam a persistent backend would implement; the
//! in-memory store is the only one shipped. Every mutating call is a single
//! lock acquisition with no await inside, so one job's read-modify-write
//! sequences never interleave.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::jobs::state::{Job, JobOutcome, JobStatus};

/// Backend-agnostic job storage.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a freshly created job.
    async fn insert(&self, job: Job);

    /// Get a snapshot of a job.
    async fn get(&self, id: Uuid) -> Option<Job>;

    /// Append a progress entry. False if unknown or terminal.
    async fn record_progress(&self, id: Uuid, status: JobStatus, message: &str) -> bool;

    /// Apply the terminal outcome. False if unknown or already terminal.
    async fn finish(&self, id: Uuid, outcome: JobOutcome) -> bool;

    /// Remove terminal jobs last updated before `cutoff`. Returns how many went.
    async fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> usize;

    /// Snapshot of every job, newest first.
    async fn list(&self) -> Vec<Job>;
}

/// Process-lifetime job store.
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) {
        self.jobs.write().await.insert(job.id, job);
    }

    async fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }

    async fn record_progress(&self, id: Uuid, status: JobStatus, message: &str) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) => job.record_progress(status, message),
            None => false,
        }
    }

    async fn finish(&self, id: Uuid, outcome: JobOutcome) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) => job.finish(outcome),
            None => false,
        }
    }

    async fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status.is_terminal() && job.updated_at < cutoff));
        before - jobs.len()
    }

    async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }
}
