//! Document generation tools.
//!
//! Each tool turns a free-text `input` into one kind of document with a
//! single LLM completion, run as a background job.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::jobs::{JobManager, text_content};
use crate::llm::{CompletionRequest, FinishReason};
use crate::tools::tool::{Tool, ToolConfig, ToolContext, ToolResponse, require_str};

/// One kind of generated document.
#[derive(Debug)]
pub struct DocumentKind {
    pub tool_name: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub system_prompt: &'static str,
}

pub const DOCUMENT_KINDS: &[DocumentKind] = &[
    DocumentKind {
        tool_name: "generate-user-stories",
        label: "user stories",
        description: "Generate user stories with acceptance criteria from a product description.",
        system_prompt: "You are a product manager. Write user stories in the form \
            'As a <role>, I want <goal> so that <benefit>', each followed by testable \
            acceptance criteria. Group them by feature area. Output Markdown only.",
    },
    DocumentKind {
        tool_name: "generate-prd",
        label: "product requirements document",
        description: "Generate a product requirements document (PRD) from a description or user stories.",
        system_prompt: "You are a senior product manager. Write a product requirements document \
            with sections: Overview, Goals, Non-goals, Users, Functional Requirements, \
            Non-functional Requirements, Success Metrics, Open Questions. Output Markdown only.",
    },
    DocumentKind {
        tool_name: "generate-technical-spec",
        label: "technical specification",
        description: "Generate a technical design specification from product requirements.",
        system_prompt: "You are a staff engineer. Write a technical specification covering \
            architecture, data model, interfaces, error handling, testing strategy and rollout. \
            Be concrete and name trade-offs. Output Markdown only.",
    },
    DocumentKind {
        tool_name: "generate-readme",
        label: "README",
        description: "Generate a project README from a project description.",
        system_prompt: "You are a technical writer. Write a README with a one-paragraph summary, \
            features, installation, usage examples and configuration. Output Markdown only.",
    },
];

/// LLM-backed generator for one document kind.
pub struct GenerateDocumentTool {
    kind: &'static DocumentKind,
    jobs: JobManager,
}

impl GenerateDocumentTool {
    pub fn new(kind: &'static DocumentKind, jobs: JobManager) -> Self {
        Self { kind, jobs }
    }

    /// One tool per known document kind.
    pub fn all(jobs: &JobManager) -> Vec<Arc<dyn Tool>> {
        DOCUMENT_KINDS
            .iter()
            .map(|kind| Arc::new(Self::new(kind, jobs.clone())) as Arc<dyn Tool>)
            .collect()
    }
}

#[async_trait]
impl Tool for GenerateDocumentTool {
    fn name(&self) -> &str {
        self.kind.tool_name
    }

    fn description(&self) -> &str {
        self.kind.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "Source material: a product description or an earlier document"
                },
                "context": {
                    "type": "string",
                    "description": "Extra notes to take into account"
                }
            },
            "required": ["input"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        config: &ToolConfig,
        ctx: &ToolContext,
    ) -> Result<ToolResponse, Error> {
        let mut prompt = require_str(self.name(), &params, "input")?.to_string();
        if let Some(extra) = params.get("context").and_then(|v| v.as_str())
            && !extra.trim().is_empty()
        {
            prompt.push_str("\n\nAdditional context:\n");
            prompt.push_str(extra);
        }

        let kind = self.kind;
        let config = config.clone();
        let handle = self
            .jobs
            .spawn_job(
                kind.tool_name,
                params,
                ctx.session_id.clone(),
                format!("Generating {}", kind.label),
                move |reporter| async move {
                    let llm = config.llm()?;
                    reporter
                        .progress(format!("Drafting {} with {}", kind.label, llm.model_name()))
                        .await;

                    let response = llm
                        .complete(CompletionRequest::new(kind.system_prompt, prompt, config.max_tokens))
                        .await?;
                    if response.finish_reason == FinishReason::Length {
                        reporter
                            .warn(format!(
                                "Warning: {} was cut off at {} tokens",
                                kind.label, config.max_tokens
                            ))
                            .await;
                    }

                    let mut output = text_content(response.content);
                    output["usage"] = serde_json::json!({
                        "inputTokens": response.input_tokens,
                        "outputTokens": response.output_tokens,
                    });
                    Ok(output)
                },
            )
            .await;

        Ok(ToolResponse::Job(handle))
    }
}
