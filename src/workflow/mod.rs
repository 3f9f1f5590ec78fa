//! Declarative multi-step workflows.
//!
//! - `definition`: the workflow document and its load-time checks
//! - `context`: per-run input and completed step outputs
//! - `registry`: definitions loaded from a directory at startup
//! - `executor`: sequential step execution with a trace

pub mod context;
pub mod definition;
pub mod executor;
pub mod registry;

pub use context::ExecutionContext;
pub use definition::{Step, WorkflowDefinition, WorkflowOutput};
pub use executor::{StepOutcome, StepTrace, WorkflowExecutor, WorkflowRunResult};
pub use registry::WorkflowRegistry;
