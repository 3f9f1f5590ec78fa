//! Job system: asynchronous tool executions with terminal-once status.
//!
//! Core components:
//! - `state`: Job record and state machine (Pending → Running → Completed/Failed)
//! - `store`: `JobStore` trait and the in-memory implementation
//! - `manager`: lifecycle API, background spawning, TTL sweeping

pub mod manager;
pub mod state;
pub mod store;

pub use manager::{JobHandle, JobManager, JobReporter, JobSummary, spawn_sweep_task};
pub use state::{Job, JobOutcome, JobStatus, ProgressEntry, error_envelope, text_content};
pub use store::{InMemoryJobStore, JobStore};
