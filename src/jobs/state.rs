//! Job state machine and record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorDetail;

/// Cap on the per-job progress log; oldest entries are dropped first.
pub const MAX_PROGRESS_ENTRIES: usize = 500;

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Created, body has not reported yet.
    Pending,
    /// Body is reporting progress.
    Running,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
}

impl JobStatus {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            // From Pending
            (Pending, Running) | (Pending, Completed) | (Pending, Failed) |
            // From Running (progress updates self-transition)
            (Running, Running) | (Running, Completed) | (Running, Failed)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// One line of a job's progress log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub status: JobStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Terminal payload handed to `set_job_result`.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Success(serde_json::Value),
    Failure(ErrorDetail),
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Success(_) => JobStatus::Completed,
            Self::Failure(_) => JobStatus::Failed,
        }
    }
}

/// A tracked job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub tool_name: String,
    pub params: serde_json::Value,
    /// Session the job reports progress to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub progress: Vec<ProgressEntry>,
    /// Present iff the job is terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Present iff the job failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl Job {
    /// Create a fresh PENDING job.
    pub fn new(
        tool_name: impl Into<String>,
        params: serde_json::Value,
        session_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tool_name: tool_name.into(),
            params,
            session_id,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            progress: Vec::new(),
            result: None,
            error: None,
        }
    }

    /// Record a progress message. Returns false if the job is terminal.
    pub fn record_progress(&mut self, status: JobStatus, message: impl Into<String>) -> bool {
        if status.is_terminal() || !self.status.can_transition_to(JobStatus::Running) {
            return false;
        }

        let now = Utc::now();
        self.progress.push(ProgressEntry {
            status,
            message: message.into(),
            timestamp: now,
        });
        if self.progress.len() > MAX_PROGRESS_ENTRIES {
            let drain_count = self.progress.len() - MAX_PROGRESS_ENTRIES;
            self.progress.drain(..drain_count);
        }

        self.status = JobStatus::Running;
        self.updated_at = now;
        true
    }

    /// Apply the terminal outcome. First write wins; returns false afterwards.
    pub fn finish(&mut self, outcome: JobOutcome) -> bool {
        let target = outcome.status();
        if !self.status.can_transition_to(target) {
            return false;
        }

        match outcome {
            JobOutcome::Success(value) => {
                self.result = Some(value);
                self.error = None;
            }
            JobOutcome::Failure(detail) => {
                self.result = Some(error_envelope(&detail.message));
                self.error = Some(detail);
            }
        }
        self.status = target;
        self.updated_at = Utc::now();
        true
    }
}

/// Text content envelope used for tool output.
pub fn text_content(text: impl Into<String>) -> serde_json::Value {
    serde_json::json!({
        "content": [{"type": "text", "text": text.into()}]
    })
}

/// Error-flagged content envelope stored as a failed job's result.
pub fn error_envelope(message: &str) -> serde_json::Value {
    serde_json::json!({
        "isError": true,
        "content": [{"type": "text", "text": message}]
    })
}
