//! Job manager: lifecycle operations, background execution and retention.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{Error, ErrorDetail, JobError};
use crate::jobs::state::{Job, JobOutcome, JobStatus};
use crate::jobs::store::JobStore;
use crate::progress::ProgressNotifier;

/// Returned to the caller that started a background job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub job_id: Uuid,
    pub initial_message: String,
}

/// Counts per status.
#[derive(Debug, Default, Clone, Serialize)]
pub struct JobSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Owns job records and drives them through their state machine.
#[derive(Clone)]
pub struct JobManager {
    store: Arc<dyn JobStore>,
    notifier: Arc<ProgressNotifier>,
}

impl JobManager {
    pub fn new(store: Arc<dyn JobStore>, notifier: Arc<ProgressNotifier>) -> Self {
        Self { store, notifier }
    }

    pub fn notifier(&self) -> &Arc<ProgressNotifier> {
        &self.notifier
    }

    /// Create a PENDING job with no session.
    pub async fn create_job(&self, tool_name: &str, params: serde_json::Value) -> Uuid {
        self.create_job_for_session(tool_name, params, None).await
    }

    /// Create a PENDING job that reports progress to `session_id`.
    pub async fn create_job_for_session(
        &self,
        tool_name: &str,
        params: serde_json::Value,
        session_id: Option<String>,
    ) -> Uuid {
        let job = Job::new(tool_name, params, session_id);
        let job_id = job.id;
        self.store.insert(job).await;
        tracing::debug!(job_id = %job_id, tool = %tool_name, "Job created");
        job_id
    }

    /// Append a progress message and move the job to RUNNING.
    ///
    /// Returns false if the job is unknown, already terminal, or `status`
    /// is itself terminal (terminal states go through `set_job_result`).
    pub async fn update_job_status(&self, job_id: Uuid, status: JobStatus, message: &str) -> bool {
        let updated = self.store.record_progress(job_id, status, message).await;
        if !updated {
            tracing::debug!(job_id = %job_id, status = %status, "Ignored progress update");
        }
        updated
    }

    /// Store the terminal outcome. First write wins; later calls return false.
    pub async fn set_job_result(&self, job_id: Uuid, outcome: JobOutcome) -> bool {
        let status = outcome.status();
        let applied = self.store.finish(job_id, outcome).await;
        if applied {
            tracing::info!(job_id = %job_id, status = %status, "Job finished");
        } else {
            tracing::debug!(job_id = %job_id, "Ignored terminal write for unknown or finished job");
        }
        applied
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Job, JobError> {
        self.store
            .get(job_id)
            .await
            .ok_or(JobError::NotFound { id: job_id })
    }

    /// Create a job and run `body` as an independent task.
    ///
    /// Returns as soon as the job exists. The body's `Ok` value becomes the
    /// COMPLETED result; an `Err` or a panic becomes a FAILED record.
    pub async fn spawn_job<F, Fut>(
        &self,
        tool_name: &str,
        params: serde_json::Value,
        session_id: Option<String>,
        initial_message: impl Into<String>,
        body: F,
    ) -> JobHandle
    where
        F: FnOnce(JobReporter) -> Fut + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value, Error>> + Send + 'static,
    {
        let job_id = self
            .create_job_for_session(tool_name, params, session_id.clone())
            .await;
        let reporter = JobReporter {
            jobs: self.clone(),
            job_id,
            session_id: session_id.clone(),
        };
        let manager = self.clone();
        let tool = tool_name.to_string();

        tokio::spawn(async move {
            let outcome = match tokio::spawn(body(reporter)).await {
                Ok(Ok(value)) => JobOutcome::Success(value),
                Ok(Err(e)) => {
                    tracing::warn!(job_id = %job_id, tool = %tool, error = %e, "Job failed");
                    JobOutcome::Failure(ErrorDetail::from_error(&e, format!("tool {tool}")))
                }
                Err(join_err) => {
                    let reason = panic_message(join_err);
                    tracing::error!(job_id = %job_id, tool = %tool, reason = %reason, "Job panicked");
                    let err = Error::Job(JobError::Panicked { id: job_id, reason });
                    JobOutcome::Failure(ErrorDetail::from_error(&err, format!("tool {tool}")))
                }
            };
            manager.finish_and_notify(job_id, session_id.as_deref(), outcome).await;
        });

        JobHandle {
            job_id,
            initial_message: initial_message.into(),
        }
    }

    async fn finish_and_notify(&self, job_id: Uuid, session_id: Option<&str>, outcome: JobOutcome) {
        let (status, message) = match &outcome {
            JobOutcome::Success(_) => (JobStatus::Completed, "Completed".to_string()),
            JobOutcome::Failure(detail) => (JobStatus::Failed, format!("Failed: {}", detail.message)),
        };
        if self.set_job_result(job_id, outcome).await
            && let Some(session) = session_id
        {
            self.notifier
                .send_progress(session, job_id, status, message)
                .await;
        }
    }

    /// Poll until the job is terminal. Unbounded; callers wrap it in a timeout.
    pub async fn wait_for_terminal(
        &self,
        job_id: Uuid,
        poll_interval: Duration,
    ) -> Result<Job, JobError> {
        loop {
            let job = self.get_job(job_id).await?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Evict terminal jobs not updated within `ttl`.
    pub async fn sweep_expired(&self, ttl: Duration) -> usize {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(ttl)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let evicted = self.store.evict_terminal_before(cutoff).await;
        if evicted > 0 {
            tracing::info!(count = evicted, "Evicted expired jobs");
        }
        evicted
    }

    /// Get summary of all jobs.
    pub async fn summary(&self) -> JobSummary {
        let jobs = self.store.list().await;
        let mut summary = JobSummary {
            total: jobs.len(),
            ..Default::default()
        };
        for job in &jobs {
            match job.status {
                JobStatus::Pending => summary.pending += 1,
                JobStatus::Running => summary.running += 1,
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }
}

/// Spawn a background task that periodically evicts expired jobs.
pub fn spawn_sweep_task(jobs: JobManager, ttl: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            jobs.sweep_expired(ttl).await;
        }
    })
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Handle given to a running job body for reporting progress.
#[derive(Clone)]
pub struct JobReporter {
    jobs: JobManager,
    job_id: Uuid,
    session_id: Option<String>,
}

impl JobReporter {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    /// Record a progress message on the job and push it to the session.
    pub async fn progress(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(job_id = %self.job_id, message = %message, "Job progress");
        self.emit(message).await;
    }

    /// Same as `progress`, logged at warn level.
    pub async fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(job_id = %self.job_id, message = %message, "Job warning");
        self.emit(message).await;
    }

    async fn emit(&self, message: String) {
        self.jobs
            .update_job_status(self.job_id, JobStatus::Running, &message)
            .await;
        if let Some(ref session) = self.session_id {
            self.jobs
                .notifier
                .send_progress(session, self.job_id, JobStatus::Running, message)
                .await;
        }
    }
}
