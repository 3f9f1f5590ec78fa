//! Sequential workflow execution.
//!
//! Steps run strictly in declared order. Each step's params are resolved
//! against the context, the tool is invoked through the registry, and a
//! job-based response is polled until terminal under the step timeout.
//! The first failing step stops the run; nothing already done is undone.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, ErrorDetail, ErrorKind, WorkflowError};
use crate::jobs::{JobManager, JobReporter, JobStatus};
use crate::template;
use crate::tools::{ToolConfig, ToolContext, ToolRegistry, ToolResponse};
use crate::workflow::context::ExecutionContext;
use crate::workflow::definition::{Step, WorkflowDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Succeeded,
    Failed,
}

/// One attempted step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTrace {
    pub step_id: String,
    pub tool_name: String,
    pub outcome: StepOutcome,
    /// Set when the tool answered with a job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

/// Outcome of one workflow run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunResult {
    pub workflow: String,
    /// `COMPLETED` or `FAILED`.
    pub status: JobStatus,
    pub trace: Vec<StepTrace>,
    /// Outputs of the steps that succeeded, keyed by step id.
    pub outputs: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl WorkflowRunResult {
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }

    /// Turn a failed run into an error that keeps the whole result as
    /// `details` on the failure record.
    pub fn into_error(self) -> Error {
        let mut detail = self
            .error
            .clone()
            .unwrap_or_else(|| ErrorDetail::new(ErrorKind::Internal, "workflow failed"));
        detail.details = serde_json::to_value(&self).ok();
        WorkflowError::RunFailed {
            name: self.workflow,
            detail: Box::new(detail),
        }
        .into()
    }
}

/// Drives workflow runs against the tool registry.
pub struct WorkflowExecutor {
    tools: Arc<ToolRegistry>,
    jobs: JobManager,
    config: ToolConfig,
    step_timeout: Duration,
    poll_interval: Duration,
}

impl WorkflowExecutor {
    pub fn new(
        tools: Arc<ToolRegistry>,
        jobs: JobManager,
        config: ToolConfig,
        step_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            tools,
            jobs,
            config,
            step_timeout,
            poll_interval,
        }
    }

    /// Run every step of `definition` in order.
    ///
    /// Never returns an error: failures are reported in the result. When a
    /// reporter is given, each step start and outcome is logged on its job.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        input: serde_json::Value,
        ctx: &ToolContext,
        reporter: Option<&JobReporter>,
    ) -> WorkflowRunResult {
        let total = definition.steps.len();
        let mut context = ExecutionContext::new(input);
        let mut trace = Vec::with_capacity(total);
        tracing::info!(workflow = %definition.name, steps = total, "Workflow started");

        for (index, step) in definition.steps.iter().enumerate() {
            report(
                reporter,
                format!(
                    "Step {}/{} ({}): running {}",
                    index + 1,
                    total,
                    step.id,
                    step.tool_name
                ),
            )
            .await;

            let started = Instant::now();
            let (job_id, result) = self.run_step(step, &context, ctx).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    tracing::debug!(workflow = %definition.name, step = %step.id, duration_ms, "Step succeeded");
                    context.record_success(&step.id, output);
                    trace.push(StepTrace {
                        step_id: step.id.clone(),
                        tool_name: step.tool_name.clone(),
                        outcome: StepOutcome::Succeeded,
                        job_id,
                        duration_ms,
                        error: None,
                    });
                    report(reporter, format!("Step {} completed", step.id)).await;
                }
                Err(err) => {
                    let err = Error::from(err);
                    tracing::warn!(workflow = %definition.name, step = %step.id, error = %err, "Step failed");
                    let detail = ErrorDetail::from_error(&err, format!("step {}", step.id));
                    trace.push(StepTrace {
                        step_id: step.id.clone(),
                        tool_name: step.tool_name.clone(),
                        outcome: StepOutcome::Failed,
                        job_id,
                        duration_ms,
                        error: Some(detail.clone()),
                    });
                    report(reporter, format!("Step {} failed: {}", step.id, detail.message)).await;
                    return failed(definition, trace, &context, detail);
                }
            }
        }

        match render_output(definition, &context) {
            Ok((summary, details)) => {
                tracing::info!(workflow = %definition.name, "Workflow completed");
                WorkflowRunResult {
                    workflow: definition.name.clone(),
                    status: JobStatus::Completed,
                    trace,
                    outputs: context.outputs_json(),
                    summary,
                    details,
                    error: None,
                }
            }
            Err(err) => {
                let err = Error::from(err);
                tracing::warn!(workflow = %definition.name, error = %err, "Workflow output failed to render");
                let detail = ErrorDetail::from_error(&err, "workflow output");
                failed(definition, trace, &context, detail)
            }
        }
    }

    /// Resolve, invoke and await one step. The job id is returned even when
    /// the step fails so the trace can point at it.
    async fn run_step(
        &self,
        step: &Step,
        context: &ExecutionContext,
        ctx: &ToolContext,
    ) -> (Option<Uuid>, Result<serde_json::Value, WorkflowError>) {
        let response = match self.invoke(step, context, ctx).await {
            Ok(response) => response,
            Err(e) => return (None, Err(e)),
        };

        match response {
            ToolResponse::Immediate(value) => {
                let result = if value.get("isError").and_then(|v| v.as_bool()) == Some(true) {
                    Err(step_failed(step, immediate_error_text(&value)))
                } else {
                    Ok(value)
                };
                (None, result)
            }
            ToolResponse::Job(handle) => {
                let job_id = handle.job_id;
                (Some(job_id), self.await_job(step, job_id).await)
            }
        }
    }

    async fn invoke(
        &self,
        step: &Step,
        context: &ExecutionContext,
        ctx: &ToolContext,
    ) -> Result<ToolResponse, WorkflowError> {
        // Resolution happens before the tool is touched.
        let params =
            template::resolve(&step.params, context).map_err(|source| WorkflowError::StepTemplate {
                step_id: step.id.clone(),
                source,
            })?;

        let tool = self
            .tools
            .get(&step.tool_name)
            .await
            .ok_or_else(|| step_failed(step, "tool is not registered".to_string()))?;
        tool.validate_input(&params)
            .map_err(|e| step_failed(step, e.to_string()))?;

        let step_ctx = ToolContext::for_session(ctx.session_id.clone());
        tool.execute(params, &self.config, &step_ctx)
            .await
            .map_err(|e| step_failed(step, e.to_string()))
    }

    async fn await_job(&self, step: &Step, job_id: Uuid) -> Result<serde_json::Value, WorkflowError> {
        let waited = tokio::time::timeout(
            self.step_timeout,
            self.jobs.wait_for_terminal(job_id, self.poll_interval),
        )
        .await;

        let job = match waited {
            Ok(Ok(job)) => job,
            Ok(Err(e)) => return Err(step_failed(step, e.to_string())),
            Err(_) => {
                // The job itself is not cancelled and may still finish.
                tracing::warn!(step = %step.id, job_id = %job_id, timeout = ?self.step_timeout, "Step timed out; job left running");
                return Err(WorkflowError::StepTimeout {
                    step_id: step.id.clone(),
                    tool: step.tool_name.clone(),
                    timeout: self.step_timeout,
                });
            }
        };

        match job.status {
            JobStatus::Completed => Ok(job.result.unwrap_or(serde_json::Value::Null)),
            _ => {
                let reason = job
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| format!("job ended {}", job.status));
                Err(step_failed(step, reason))
            }
        }
    }
}

fn step_failed(step: &Step, reason: String) -> WorkflowError {
    WorkflowError::StepFailed {
        step_id: step.id.clone(),
        tool: step.tool_name.clone(),
        reason,
    }
}

fn immediate_error_text(value: &serde_json::Value) -> String {
    value
        .pointer("/content/0/text")
        .and_then(|t| t.as_str())
        .unwrap_or("tool returned an error result")
        .to_string()
}

type RenderedOutput = (Option<String>, Option<serde_json::Value>);

fn render_output(
    definition: &WorkflowDefinition,
    context: &ExecutionContext,
) -> Result<RenderedOutput, WorkflowError> {
    let to_error = |source| WorkflowError::OutputTemplate {
        name: definition.name.clone(),
        source,
    };
    let summary = definition
        .output
        .summary
        .as_deref()
        .map(|t| template::render(t, context))
        .transpose()
        .map_err(to_error)?;
    let details = definition
        .output
        .details
        .as_ref()
        .map(|d| template::resolve(d, context))
        .transpose()
        .map_err(to_error)?;
    Ok((summary, details))
}

fn failed(
    definition: &WorkflowDefinition,
    trace: Vec<StepTrace>,
    context: &ExecutionContext,
    detail: ErrorDetail,
) -> WorkflowRunResult {
    WorkflowRunResult {
        workflow: definition.name.clone(),
        status: JobStatus::Failed,
        trace,
        outputs: context.outputs_json(),
        summary: None,
        details: None,
        error: Some(detail),
    }
}

async fn report(reporter: Option<&JobReporter>, message: String) {
    if let Some(reporter) = reporter {
        reporter.progress(message).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::{LlmError, ToolError};
    use crate::jobs::{InMemoryJobStore, text_content};
    use crate::llm::LlmBackend;
    use crate::llm::stub::{StubLlm, prompt_of};
    use crate::progress::ProgressNotifier;
    use crate::tools::builtin::GenerateDocumentTool;
    use crate::tools::{Tool, ToolConfig};

    /// Immediate tool that echoes its params and counts calls.
    struct EchoTool {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echo"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(
            &self,
            params: serde_json::Value,
            _config: &ToolConfig,
            _ctx: &ToolContext,
        ) -> Result<ToolResponse, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ToolError::ExecutionFailed {
                    name: self.name.to_string(),
                    reason: "disk full".to_string(),
                }
                .into());
            }
            Ok(ToolResponse::Immediate(params))
        }
    }

    /// Job-based tool whose job sleeps before finishing.
    struct SlowJobTool {
        jobs: JobManager,
        delay: Duration,
    }

    #[async_trait]
    impl Tool for SlowJobTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "slow"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(
            &self,
            params: serde_json::Value,
            _config: &ToolConfig,
            ctx: &ToolContext,
        ) -> Result<ToolResponse, Error> {
            let delay = self.delay;
            let handle = self
                .jobs
                .spawn_job("slow", params, ctx.session_id.clone(), "Started", move |_| async move {
                    tokio::time::sleep(delay).await;
                    Ok(text_content("slow done"))
                })
                .await;
            Ok(ToolResponse::Job(handle))
        }
    }

    struct Harness {
        jobs: JobManager,
        tools: Arc<ToolRegistry>,
        calls: Arc<AtomicUsize>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                jobs: JobManager::new(
                    Arc::new(InMemoryJobStore::new()),
                    Arc::new(ProgressNotifier::new()),
                ),
                tools: Arc::new(ToolRegistry::new()),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn echo(&self, name: &'static str, fail: bool) {
            self.tools.register_sync(Arc::new(EchoTool {
                name,
                calls: self.calls.clone(),
                fail,
            }));
        }

        fn executor(
            &self,
            llm: Option<Arc<dyn crate::llm::LlmProvider>>,
            step_timeout: Duration,
        ) -> WorkflowExecutor {
            WorkflowExecutor::new(
                self.tools.clone(),
                self.jobs.clone(),
                ToolConfig::new(llm, LlmBackend::Anthropic, 256),
                step_timeout,
                Duration::from_millis(5),
            )
        }
    }

    fn workflow(value: serde_json::Value) -> WorkflowDefinition {
        let def: WorkflowDefinition = serde_json::from_value(value).unwrap();
        def.validate().unwrap();
        def
    }

    #[tokio::test]
    async fn failure_stops_remaining_steps() {
        let h = Harness::new();
        h.echo("tool-a", false);
        h.echo("tool-b", true);
        h.echo("tool-c", false);
        let def = workflow(serde_json::json!({
            "name": "abc",
            "steps": [
                {"id": "A", "toolName": "tool-a", "params": {"v": 1}},
                {"id": "B", "toolName": "tool-b", "params": {"v": "{{steps.A.output.v}}"}},
                {"id": "C", "toolName": "tool-c", "params": {}}
            ]
        }));

        let result = h
            .executor(None, Duration::from_secs(5))
            .run(&def, serde_json::json!({}), &ToolContext::default(), None)
            .await;

        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(result.trace.len(), 2);
        assert_eq!(result.trace[0].step_id, "A");
        assert_eq!(result.trace[0].outcome, StepOutcome::Succeeded);
        assert_eq!(result.trace[1].step_id, "B");
        assert_eq!(result.trace[1].outcome, StepOutcome::Failed);
        // A and B were invoked, C never was.
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);

        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::WorkflowStep);
        assert_eq!(error.context.as_deref(), Some("step B"));
        assert!(error.message.contains("disk full"));
        assert_eq!(result.outputs["A"]["v"], 1);
        assert!(result.outputs.get("B").is_none());
    }

    #[tokio::test]
    async fn template_error_fails_before_invocation() {
        let h = Harness::new();
        h.echo("tool-a", false);
        let def = workflow(serde_json::json!({
            "name": "missing-input",
            "steps": [{"id": "A", "toolName": "tool-a", "params": {"x": "{{workflow.input.nope}}"}}]
        }));

        let result = h
            .executor(None, Duration::from_secs(5))
            .run(&def, serde_json::json!({"other": 1}), &ToolContext::default(), None)
            .await;

        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.trace[0].error.as_ref().unwrap().kind, ErrorKind::TemplateResolution);
    }

    #[tokio::test]
    async fn unknown_tool_is_a_step_failure() {
        let h = Harness::new();
        let def = workflow(serde_json::json!({
            "name": "ghost",
            "steps": [{"id": "A", "toolName": "does-not-exist"}]
        }));

        let result = h
            .executor(None, Duration::from_secs(5))
            .run(&def, serde_json::json!({}), &ToolContext::default(), None)
            .await;
        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::WorkflowStep);
        assert!(error.message.contains("not registered"));
    }

    #[tokio::test]
    async fn job_step_is_awaited() {
        let h = Harness::new();
        h.tools.register_sync(Arc::new(SlowJobTool {
            jobs: h.jobs.clone(),
            delay: Duration::from_millis(20),
        }));
        h.echo("tool-a", false);
        let def = workflow(serde_json::json!({
            "name": "job-then-echo",
            "steps": [
                {"id": "s", "toolName": "slow"},
                {"id": "e", "toolName": "tool-a", "params": {"got": "{{steps.s.output.content[0].text}}"}}
            ]
        }));

        let result = h
            .executor(None, Duration::from_secs(5))
            .run(&def, serde_json::json!({}), &ToolContext::default(), None)
            .await;

        assert!(result.is_success());
        assert!(result.trace[0].job_id.is_some());
        assert!(result.trace[1].job_id.is_none());
        assert_eq!(result.outputs["e"]["got"], "slow done");
    }

    #[tokio::test]
    async fn step_timeout_is_a_step_failure() {
        let h = Harness::new();
        h.tools.register_sync(Arc::new(SlowJobTool {
            jobs: h.jobs.clone(),
            delay: Duration::from_secs(30),
        }));
        let def = workflow(serde_json::json!({
            "name": "too-slow",
            "steps": [{"id": "s", "toolName": "slow"}]
        }));

        let result = h
            .executor(None, Duration::from_millis(50))
            .run(&def, serde_json::json!({}), &ToolContext::default(), None)
            .await;

        assert_eq!(result.status, JobStatus::Failed);
        let error = result.trace[0].error.clone().unwrap();
        assert_eq!(error.kind, ErrorKind::WorkflowStep);
        assert!(error.message.contains("timed out"));
        // The job is not cancelled.
        let job_id = result.trace[0].job_id.unwrap();
        assert_eq!(h.jobs.get_job(job_id).await.unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn failed_job_step_carries_job_error() {
        let h = Harness::new();
        let llm = StubLlm::with(|_| {
            Err(LlmError::Api {
                provider: "stub".into(),
                status: 529,
                body: "overloaded".into(),
            })
        });
        for tool in GenerateDocumentTool::all(&h.jobs) {
            h.tools.register_sync(tool);
        }
        let def = workflow(serde_json::json!({
            "name": "prd",
            "steps": [{"id": "prd", "toolName": "generate-prd", "params": {"input": "x"}}]
        }));

        let result = h
            .executor(Some(llm), Duration::from_secs(5))
            .run(&def, serde_json::json!({}), &ToolContext::default(), None)
            .await;

        let trace = &result.trace[0];
        assert_eq!(trace.outcome, StepOutcome::Failed);
        assert!(trace.job_id.is_some());
        assert!(trace.error.as_ref().unwrap().message.contains("529"));
    }

    #[tokio::test]
    async fn stories_thread_into_prd() {
        let h = Harness::new();
        let llm = StubLlm::with(|req| {
            let prompt = prompt_of(req);
            if req.system.as_deref().is_some_and(|s| s.contains("user stories")) {
                Ok("T1".to_string())
            } else {
                Ok(format!("PRD from [{prompt}]"))
            }
        });
        for tool in GenerateDocumentTool::all(&h.jobs) {
            h.tools.register_sync(tool);
        }
        let def = workflow(serde_json::json!({
            "name": "prd-pipeline",
            "steps": [
                {"id": "step1", "toolName": "generate-user-stories",
                 "params": {"input": "{{workflow.input.productDescription}}"}},
                {"id": "step2", "toolName": "generate-prd",
                 "params": {"input": "{{steps.step1.output.content[0].text}}"}}
            ],
            "output": {
                "summary": "PRD for {{workflow.input.productDescription}} is ready",
                "details": {"stories": "{{steps.step1.output.content[0].text}}"}
            }
        }));

        let result = h
            .executor(Some(llm.clone()), Duration::from_secs(5))
            .run(
                &def,
                serde_json::json!({"productDescription": "Todo app"}),
                &ToolContext::default(),
                None,
            )
            .await;

        assert!(result.is_success(), "{:?}", result.error);
        // step2 was started with exactly the text step1 produced.
        let step2_job = h.jobs.get_job(result.trace[1].job_id.unwrap()).await.unwrap();
        assert_eq!(step2_job.params, serde_json::json!({"input": "T1"}));
        assert_eq!(result.outputs["step2"]["content"][0]["text"], "PRD from [T1]");
        assert_eq!(result.summary.as_deref(), Some("PRD for Todo app is ready"));
        assert_eq!(result.details, Some(serde_json::json!({"stories": "T1"})));
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn output_render_failure_fails_the_run() {
        let h = Harness::new();
        h.echo("tool-a", false);
        let def = workflow(serde_json::json!({
            "name": "bad-output",
            "steps": [{"id": "A", "toolName": "tool-a", "params": {"v": 1}}],
            "output": {"summary": "{{steps.A.output.missing}}"}
        }));

        let result = h
            .executor(None, Duration::from_secs(5))
            .run(&def, serde_json::json!({}), &ToolContext::default(), None)
            .await;

        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(result.trace.len(), 1);
        assert_eq!(result.trace[0].outcome, StepOutcome::Succeeded);
        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::TemplateResolution);
        assert_eq!(error.context.as_deref(), Some("workflow output"));
    }

    #[tokio::test]
    async fn failed_run_becomes_error_with_trace() {
        let h = Harness::new();
        h.echo("tool-b", true);
        let def = workflow(serde_json::json!({
            "name": "fails",
            "steps": [{"id": "B", "toolName": "tool-b"}]
        }));
        let result = h
            .executor(None, Duration::from_secs(5))
            .run(&def, serde_json::json!({}), &ToolContext::default(), None)
            .await;

        let err = result.into_error();
        assert_eq!(err.kind(), ErrorKind::WorkflowStep);
        let detail = ErrorDetail::from_error(&err, "tool run-workflow");
        assert_eq!(detail.context.as_deref(), Some("step B"));
        let details = detail.details.unwrap();
        assert_eq!(details["trace"][0]["stepId"], "B");
        assert_eq!(details["trace"][0]["outcome"], "failed");
    }
}
