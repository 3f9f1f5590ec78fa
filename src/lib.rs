//! docforge: background jobs and declarative workflows for AI document generation.

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod llm;
pub mod phase;
pub mod progress;
pub mod template;
pub mod tools;
pub mod workflow;
