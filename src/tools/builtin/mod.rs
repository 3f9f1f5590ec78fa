//! Built-in tools: document generation, research, job queries and workflows.

pub mod generate;
pub mod job_result;
pub mod research;
pub mod workflow;

pub use generate::{DOCUMENT_KINDS, DocumentKind, GenerateDocumentTool};
pub use job_result::GetJobResultTool;
pub use research::ResearchTool;
pub use workflow::{ListWorkflowsTool, RunWorkflowTool, workflow_summary};

use std::sync::{Arc, Weak};

use crate::jobs::JobManager;
use crate::tools::ToolRegistry;
use crate::workflow::{WorkflowExecutor, WorkflowRegistry};

/// Register every built-in tool.
pub fn register_builtin_tools(
    registry: &ToolRegistry,
    jobs: &JobManager,
    workflows: Arc<WorkflowRegistry>,
    executor: Weak<WorkflowExecutor>,
) {
    for tool in GenerateDocumentTool::all(jobs) {
        registry.register_sync(tool);
    }
    registry.register_sync(Arc::new(ResearchTool::new(jobs.clone())));
    registry.register_sync(Arc::new(GetJobResultTool::new(jobs.clone())));
    registry.register_sync(Arc::new(RunWorkflowTool::new(
        workflows.clone(),
        executor,
        jobs.clone(),
    )));
    registry.register_sync(Arc::new(ListWorkflowsTool::new(workflows)));
    tracing::info!(count = registry.count(), "Built-in tools registered");
}
