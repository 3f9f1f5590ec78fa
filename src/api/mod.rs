//! REST endpoints for tools, jobs and workflows, plus the progress socket.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, ErrorDetail, JobError, ToolError, WorkflowError};
use crate::jobs::JobManager;
use crate::progress::ws::progress_routes;
use crate::tools::builtin::{register_builtin_tools, workflow_summary};
use crate::tools::{ToolConfig, ToolContext, ToolRegistry, ToolResponse};
use crate::workflow::{WorkflowExecutor, WorkflowRegistry};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub tools: Arc<ToolRegistry>,
    pub jobs: JobManager,
    pub workflows: Arc<WorkflowRegistry>,
    /// Owned here; `run-workflow` only holds a weak reference.
    pub executor: Arc<WorkflowExecutor>,
    pub config: ToolConfig,
}

impl AppState {
    /// Wire the tool registry, workflow executor and built-in tools together.
    pub fn build(
        jobs: JobManager,
        workflows: Arc<WorkflowRegistry>,
        config: ToolConfig,
        step_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        let tools = Arc::new(ToolRegistry::new());
        let executor = Arc::new(WorkflowExecutor::new(
            tools.clone(),
            jobs.clone(),
            config.clone(),
            step_timeout,
            poll_interval,
        ));
        register_builtin_tools(&tools, &jobs, workflows.clone(), Arc::downgrade(&executor));
        Self {
            tools,
            jobs,
            workflows,
            executor,
            config,
        }
    }
}

/// Build the Axum router with REST and progress WebSocket routes.
pub fn api_routes(state: AppState) -> Router {
    let notifier = state.jobs.notifier().clone();

    Router::new()
        .route("/health", get(health))
        .route("/api/tools", get(list_tools))
        .route("/api/tools/{name}", post(call_tool))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/{name}/run", post(run_workflow))
        .with_state(state)
        .merge(progress_routes(notifier))
        .layer(CorsLayer::permissive())
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCall {
    session_id: Option<String>,
    #[serde(default = "empty_object")]
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowRun {
    session_id: Option<String>,
    #[serde(default = "empty_object")]
    input: serde_json::Value,
}

fn error_response(err: &Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match err {
        Error::Tool(ToolError::NotFound { .. })
        | Error::Job(JobError::NotFound { .. })
        | Error::Workflow(WorkflowError::NotFound { .. }) => StatusCode::NOT_FOUND,
        Error::Tool(ToolError::InvalidParameters { .. }) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let detail = ErrorDetail::from_error(err, "api");
    (status, Json(serde_json::json!({ "error": detail })))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let summary = state.jobs.summary().await;
    Json(serde_json::json!({
        "status": "ok",
        "service": "docforge",
        "jobs": summary,
    }))
}

// ── Tools ───────────────────────────────────────────────────────────────

async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.tools.tool_definitions().await)
}

async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(call): Json<ToolCall>,
) -> impl IntoResponse {
    let Some(tool) = state.tools.get(&name).await else {
        return error_response(&ToolError::NotFound { name }.into());
    };
    if let Err(e) = tool.validate_input(&call.params) {
        debug!(tool = %name, error = %e, "Rejected tool call");
        return error_response(&e.into());
    }

    let ctx = ToolContext::for_session(call.session_id);
    match tool.execute(call.params, &state.config, &ctx).await {
        Ok(ToolResponse::Job(handle)) => {
            info!(tool = %name, job_id = %handle.job_id, "Tool started job");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "type": "job",
                    "jobId": handle.job_id,
                    "initialMessage": handle.initial_message,
                })),
            )
        }
        Ok(ToolResponse::Immediate(result)) => (
            StatusCode::OK,
            Json(serde_json::json!({"type": "immediate", "result": result})),
        ),
        Err(e) => {
            warn!(tool = %name, error = %e, "Tool call failed");
            error_response(&e)
        }
    }
}

// ── Jobs ────────────────────────────────────────────────────────────────

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let job_id = match Uuid::parse_str(&id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid job ID"})),
            );
        }
    };

    match state.jobs.get_job(job_id).await {
        Ok(job) => (StatusCode::OK, Json(serde_json::json!(job))),
        Err(e) => error_response(&e.into()),
    }
}

// ── Workflows ───────────────────────────────────────────────────────────

async fn list_workflows(State(state): State<AppState>) -> impl IntoResponse {
    let workflows: Vec<_> = state
        .workflows
        .list()
        .iter()
        .map(|d| workflow_summary(d))
        .collect();
    Json(workflows)
}

async fn run_workflow(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(run): Json<WorkflowRun>,
) -> impl IntoResponse {
    let Some(tool) = state.tools.get("run-workflow").await else {
        return error_response(
            &ToolError::NotFound {
                name: "run-workflow".to_string(),
            }
            .into(),
        );
    };

    let params = serde_json::json!({"workflow": name, "input": run.input});
    let ctx = ToolContext::for_session(run.session_id);
    match tool.execute(params, &state.config, &ctx).await {
        Ok(ToolResponse::Job(handle)) => {
            info!(workflow = %name, job_id = %handle.job_id, "Workflow run started");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "jobId": handle.job_id,
                    "initialMessage": handle.initial_message,
                })),
            )
        }
        Ok(ToolResponse::Immediate(result)) => (StatusCode::OK, Json(result)),
        Err(e) => {
            warn!(workflow = %name, error = %e, "Workflow run rejected");
            error_response(&e)
        }
    }
}
