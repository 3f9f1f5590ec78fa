//! Error types for docforge.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} returned HTTP {status}: {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Placeholder resolution errors. Always raised before the owning step runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("Unknown placeholder reference '{reference}'")]
    UnknownReference { reference: String },

    #[error("Workflow input has no field at '{path}'")]
    UnknownInputField { path: String },

    #[error("Step '{step_id}' has not completed")]
    StepNotCompleted { step_id: String },

    #[error("Output of step '{step_id}' has no value at '{path}'")]
    MissingOutputPath { step_id: String, path: String },

    #[error("Malformed path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },
}

/// Workflow definition and execution errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow {name} not found")]
    NotFound { name: String },

    #[error("Invalid workflow {name}: {reason}")]
    InvalidDefinition { name: String, reason: String },

    #[error("Step {step_id} ({tool}) failed: {reason}")]
    StepFailed {
        step_id: String,
        tool: String,
        reason: String,
    },

    #[error("Step {step_id} ({tool}) timed out after {timeout:?}")]
    StepTimeout {
        step_id: String,
        tool: String,
        timeout: Duration,
    },

    #[error("Step {step_id} parameters could not be resolved: {source}")]
    StepTemplate {
        step_id: String,
        #[source]
        source: TemplateError,
    },

    #[error("Workflow {name} output could not be rendered: {source}")]
    OutputTemplate {
        name: String,
        #[source]
        source: TemplateError,
    },

    /// A finished run that ended FAILED. Carries the structured detail
    /// (with the execution trace) so it survives into the job record.
    #[error("Workflow {name} failed: {}", .detail.message)]
    RunFailed {
        name: String,
        detail: Box<ErrorDetail>,
    },
}

/// Tool execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool {name} not found")]
    NotFound { name: String },

    #[error("Tool {name} execution failed: {reason}")]
    ExecutionFailed { name: String, reason: String },

    #[error("Invalid parameters for tool {name}: {reason}")]
    InvalidParameters { name: String, reason: String },
}

/// Job-related errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job {id} panicked: {reason}")]
    Panicked { id: Uuid, reason: String },
}

/// Coarse classification carried in a failed job's error detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Api,
    Parsing,
    TemplateResolution,
    WorkflowStep,
    Tool,
    Internal,
}

impl Error {
    /// Classify this error for the structured failure record.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Llm(LlmError::InvalidResponse { .. } | LlmError::Json(_)) => ErrorKind::Parsing,
            Self::Llm(_) => ErrorKind::Api,
            Self::Template(_) => ErrorKind::TemplateResolution,
            Self::Workflow(WorkflowError::NotFound { .. })
            | Self::Workflow(WorkflowError::InvalidDefinition { .. }) => ErrorKind::Configuration,
            Self::Workflow(WorkflowError::OutputTemplate { .. })
            | Self::Workflow(WorkflowError::StepTemplate { .. }) => ErrorKind::TemplateResolution,
            Self::Workflow(WorkflowError::RunFailed { detail, .. }) => detail.kind,
            Self::Workflow(_) => ErrorKind::WorkflowStep,
            Self::Tool(_) => ErrorKind::Tool,
            Self::Json(_) => ErrorKind::Parsing,
            Self::Job(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Structured failure stored on a FAILED job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
    /// Where the failure happened (tool name, step id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
            details: None,
        }
    }

    /// Build a detail record from an error, tagged with where it happened.
    ///
    /// A failed workflow run already carries its own detail; that record is
    /// kept, and `context` only fills in a missing context.
    pub fn from_error(err: &Error, context: impl Into<String>) -> Self {
        if let Error::Workflow(WorkflowError::RunFailed { detail, .. }) = err {
            let mut detail = (**detail).clone();
            if detail.context.is_none() {
                detail.context = Some(context.into());
            }
            return detail;
        }
        Self {
            kind: err.kind(),
            message: err.to_string(),
            context: Some(context.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_error_source() {
        let err: Error = ConfigError::MissingEnvVar("ANTHROPIC_API_KEY".into()).into();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err: Error = LlmError::Api {
            provider: "anthropic".into(),
            status: 529,
            body: "overloaded".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Api);
        assert!(err.to_string().contains("529"));

        let err: Error = LlmError::InvalidResponse {
            provider: "openai".into(),
            reason: "no choices".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Parsing);

        let err: Error = TemplateError::StepNotCompleted {
            step_id: "step2".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::TemplateResolution);

        let err: Error = WorkflowError::StepTimeout {
            step_id: "a".into(),
            tool: "slow".into(),
            timeout: Duration::from_secs(1),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::WorkflowStep);
    }

    #[test]
    fn config_errors_are_configuration_failures() {
        for err in [
            ConfigError::MissingEnvVar("OPENAI_API_KEY".into()),
            ConfigError::MissingRequired {
                key: "ANTHROPIC_API_KEY".into(),
                hint: "set it".into(),
            },
            ConfigError::InvalidValue {
                key: "DOCFORGE_PORT".into(),
                message: "not a number".into(),
            },
        ] {
            let err: Error = err.into();
            assert_eq!(err.kind(), ErrorKind::Configuration);
            let detail = ErrorDetail::from_error(&err, "startup");
            assert_eq!(detail.kind, ErrorKind::Configuration);
        }
    }

    #[test]
    fn detail_serializes_snake_case_kind() {
        let err: Error = TemplateError::UnknownInputField {
            path: "missing".into(),
        }
        .into();
        let detail = ErrorDetail::from_error(&err, "step step1");
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["kind"], "template_resolution");
        assert_eq!(json["context"], "step step1");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn failed_run_keeps_its_own_detail() {
        let detail = ErrorDetail::new(ErrorKind::TemplateResolution, "bad placeholder")
            .with_details(serde_json::json!({"trace": []}));
        let detail = ErrorDetail {
            context: Some("step step2".into()),
            ..detail
        };
        let err: Error = WorkflowError::RunFailed {
            name: "prd-pipeline".into(),
            detail: Box::new(detail.clone()),
        }
        .into();

        assert_eq!(err.kind(), ErrorKind::TemplateResolution);
        assert!(err.to_string().contains("bad placeholder"));
        assert_eq!(ErrorDetail::from_error(&err, "tool run-workflow"), detail);
    }
}
