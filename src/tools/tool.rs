//! Tool trait and the values that flow through a tool call.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{ConfigError, Error, ToolError};
use crate::jobs::JobHandle;
use crate::llm::{LlmBackend, LlmProvider};

/// Name, description and parameter schema of a registered tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// What a tool call hands back to its caller.
#[derive(Debug, Clone)]
pub enum ToolResponse {
    /// Finished inline.
    Immediate(serde_json::Value),
    /// Continues in the background; poll the job for the outcome.
    Job(JobHandle),
}

/// Provider and model selection passed to every call.
#[derive(Clone)]
pub struct ToolConfig {
    /// `None` when no credential was configured.
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub backend: LlmBackend,
    pub max_tokens: u32,
}

impl ToolConfig {
    pub fn new(llm: Option<Arc<dyn LlmProvider>>, backend: LlmBackend, max_tokens: u32) -> Self {
        Self {
            llm,
            backend,
            max_tokens,
        }
    }

    /// The configured provider, or a configuration error naming the
    /// missing credential.
    pub fn llm(&self) -> Result<Arc<dyn LlmProvider>, Error> {
        self.llm.clone().ok_or_else(|| {
            ConfigError::MissingRequired {
                key: self.backend.api_key_var().to_string(),
                hint: format!(
                    "Set {} to use the {} backend.",
                    self.backend.api_key_var(),
                    self.backend
                ),
            }
            .into()
        })
    }
}

/// Caller identity for a call.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Progress for jobs started by this call is pushed to this session.
    pub session_id: Option<String>,
}

impl ToolContext {
    pub fn for_session(session_id: Option<String>) -> Self {
        Self { session_id }
    }
}

/// A named capability callable through the registry.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema for the `params` object.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Structural check run before `execute`.
    fn validate_input(&self, params: &serde_json::Value) -> Result<(), ToolError> {
        validate_required(self.name(), &self.parameters_schema(), params)
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        config: &ToolConfig,
        ctx: &ToolContext,
    ) -> Result<ToolResponse, Error>;
}

/// Params must be an object holding every field the schema lists as required.
pub fn validate_required(
    tool: &str,
    schema: &serde_json::Value,
    params: &serde_json::Value,
) -> Result<(), ToolError> {
    let Some(fields) = params.as_object() else {
        return Err(ToolError::InvalidParameters {
            name: tool.to_string(),
            reason: "params must be a JSON object".to_string(),
        });
    };

    let missing: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .into_iter()
        .flatten()
        .filter_map(|f| f.as_str())
        .filter(|f| fields.get(*f).is_none_or(|v| v.is_null()))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ToolError::InvalidParameters {
            name: tool.to_string(),
            reason: format!("missing required field(s): {}", missing.join(", ")),
        })
    }
}

/// Extract a required string parameter.
pub fn require_str<'a>(
    tool: &str,
    params: &'a serde_json::Value,
    name: &str,
) -> Result<&'a str, ToolError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidParameters {
            name: tool.to_string(),
            reason: format!("missing '{name}' parameter"),
        })
}
