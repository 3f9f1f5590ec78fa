//! Workflow tools: start a workflow run as a job, list loaded workflows.

use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::error::{Error, ToolError};
use crate::jobs::JobManager;
use crate::tools::tool::{
    Tool, ToolConfig, ToolContext, ToolResponse, require_str, validate_required,
};
use crate::workflow::{WorkflowDefinition, WorkflowExecutor, WorkflowRegistry};

/// Runs a named workflow in the background.
///
/// The job result is the serialized run result. A failed run ends the job
/// FAILED with the run result (trace included) in the error details.
pub struct RunWorkflowTool {
    workflows: Arc<WorkflowRegistry>,
    // Weak: the executor holds the tool registry this tool lives in.
    executor: Weak<WorkflowExecutor>,
    jobs: JobManager,
}

impl RunWorkflowTool {
    pub fn new(
        workflows: Arc<WorkflowRegistry>,
        executor: Weak<WorkflowExecutor>,
        jobs: JobManager,
    ) -> Self {
        Self {
            workflows,
            executor,
            jobs,
        }
    }
}

#[async_trait]
impl Tool for RunWorkflowTool {
    fn name(&self) -> &str {
        "run-workflow"
    }

    fn description(&self) -> &str {
        "Run a named multi-step workflow. Steps run in order, each step's output \
         can feed later steps, and the run stops at the first failing step."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "workflow": {
                    "type": "string",
                    "description": "Workflow name (see list-workflows)"
                },
                "input": {
                    "type": "object",
                    "description": "Workflow input, checked against the workflow's inputSchema"
                }
            },
            "required": ["workflow"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _config: &ToolConfig,
        ctx: &ToolContext,
    ) -> Result<ToolResponse, Error> {
        let name = require_str(self.name(), &params, "workflow")?;
        let definition = self.workflows.get(name)?;

        let input = params
            .get("input")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));
        validate_required(&definition.name, &definition.input_schema, &input).map_err(|e| match e {
            ToolError::InvalidParameters { reason, .. } => ToolError::InvalidParameters {
                name: self.name().to_string(),
                reason: format!("input for workflow {}: {reason}", definition.name),
            },
            other => other,
        })?;

        let executor = self.executor.clone();
        let initial = format!(
            "Workflow {} started ({} steps)",
            definition.name,
            definition.steps.len()
        );
        let handle = self
            .jobs
            .spawn_job(
                self.name(),
                params,
                ctx.session_id.clone(),
                initial,
                move |reporter| async move {
                    let executor = executor.upgrade().ok_or_else(|| ToolError::ExecutionFailed {
                        name: "run-workflow".to_string(),
                        reason: "workflow executor is no longer running".to_string(),
                    })?;
                    let step_ctx =
                        ToolContext::for_session(reporter.session_id().map(str::to_string));
                    let result = executor
                        .run(&definition, input, &step_ctx, Some(&reporter))
                        .await;
                    if result.is_success() {
                        Ok(serde_json::to_value(&result)?)
                    } else {
                        Err(result.into_error())
                    }
                },
            )
            .await;

        Ok(ToolResponse::Job(handle))
    }
}

/// Lists loaded workflows.
pub struct ListWorkflowsTool {
    workflows: Arc<WorkflowRegistry>,
}

impl ListWorkflowsTool {
    pub fn new(workflows: Arc<WorkflowRegistry>) -> Self {
        Self { workflows }
    }
}

/// Public summary of a workflow definition.
pub fn workflow_summary(definition: &WorkflowDefinition) -> serde_json::Value {
    serde_json::json!({
        "name": definition.name,
        "description": definition.description,
        "inputSchema": definition.input_schema,
        "steps": definition
            .steps
            .iter()
            .map(|s| serde_json::json!({"id": s.id, "toolName": s.tool_name}))
            .collect::<Vec<_>>(),
    })
}

#[async_trait]
impl Tool for ListWorkflowsTool {
    fn name(&self) -> &str {
        "list-workflows"
    }

    fn description(&self) -> &str {
        "List the available workflows with their inputs and steps."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(
        &self,
        _params: serde_json::Value,
        _config: &ToolConfig,
        _ctx: &ToolContext,
    ) -> Result<ToolResponse, Error> {
        let workflows: Vec<_> = self
            .workflows
            .list()
            .iter()
            .map(|d| workflow_summary(d))
            .collect();
        Ok(ToolResponse::Immediate(
            serde_json::json!({ "workflows": workflows }),
        ))
    }
}
