//! Job query tool.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Error, ToolError};
use crate::jobs::JobManager;
use crate::tools::tool::{Tool, ToolConfig, ToolContext, ToolResponse, require_str};

/// Returns a job's current status and, once terminal, its result or error.
pub struct GetJobResultTool {
    jobs: JobManager,
}

impl GetJobResultTool {
    pub fn new(jobs: JobManager) -> Self {
        Self { jobs }
    }
}

#[async_trait]
impl Tool for GetJobResultTool {
    fn name(&self) -> &str {
        "get-job-result"
    }

    fn description(&self) -> &str {
        "Get the status of a background job and its result once it has finished."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "jobId": {
                    "type": "string",
                    "description": "Id returned when the job was started"
                }
            },
            "required": ["jobId"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _config: &ToolConfig,
        _ctx: &ToolContext,
    ) -> Result<ToolResponse, Error> {
        let raw = require_str(self.name(), &params, "jobId")?;
        let job_id = Uuid::parse_str(raw).map_err(|e| ToolError::InvalidParameters {
            name: self.name().to_string(),
            reason: format!("jobId is not a valid id: {e}"),
        })?;
        let job = self.jobs.get_job(job_id).await?;

        let mut out = serde_json::json!({
            "jobId": job.id,
            "toolName": job.tool_name,
            "status": job.status,
            "updatedAt": job.updated_at,
            "latestMessage": job.progress.last().map(|p| p.message.clone()),
        });
        if job.status.is_terminal() {
            out["result"] = job.result.unwrap_or(serde_json::Value::Null);
            if let Some(error) = job.error {
                out["error"] = serde_json::to_value(error)?;
            }
        }
        Ok(ToolResponse::Immediate(out))
    }
}
