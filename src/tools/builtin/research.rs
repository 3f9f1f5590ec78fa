//! Multi-angle research tool.
//!
//! Asks the LLM one question per research angle concurrently, then
//! synthesizes the answers into a single report. Individual angles may
//! fail; the report is written from whatever came back.

use async_trait::async_trait;

use crate::error::{Error, ToolError};
use crate::jobs::{JobManager, text_content};
use crate::llm::CompletionRequest;
use crate::phase::{MISSING_DATA_SENTINEL, run_resilient_phase};
use crate::tools::tool::{Tool, ToolConfig, ToolContext, ToolResponse, require_str};

const DEFAULT_ANGLES: &[&str] = &[
    "market landscape and existing alternatives",
    "target users and their pain points",
    "technical approaches, risks and constraints",
];

const MAX_ANGLES: usize = 8;

/// Angle queries ask for recall, not creativity.
const QUERY_TEMPERATURE: f32 = 0.3;

const QUERY_SYSTEM_PROMPT: &str = "You are a research analyst. Answer the question about the \
    topic factually and concisely in Markdown bullet points. Say so when you are unsure.";

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a research lead. Combine the findings below into \
    one structured report with an executive summary, key findings per angle and recommended next \
    steps. Some findings may be marked as unavailable; mention those gaps instead of filling them.";

pub struct ResearchTool {
    jobs: JobManager,
}

impl ResearchTool {
    pub fn new(jobs: JobManager) -> Self {
        Self { jobs }
    }
}

fn angles_from(params: &serde_json::Value) -> Result<Vec<String>, ToolError> {
    let Some(raw) = params.get("angles") else {
        return Ok(DEFAULT_ANGLES.iter().map(|a| a.to_string()).collect());
    };
    let angles: Vec<String> = raw
        .as_array()
        .ok_or_else(|| ToolError::InvalidParameters {
            name: "research-topic".to_string(),
            reason: "'angles' must be an array of strings".to_string(),
        })?
        .iter()
        .filter_map(|a| a.as_str())
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();

    if angles.is_empty() || angles.len() > MAX_ANGLES {
        return Err(ToolError::InvalidParameters {
            name: "research-topic".to_string(),
            reason: format!("'angles' must hold between 1 and {MAX_ANGLES} non-empty strings"),
        });
    }
    Ok(angles)
}

#[async_trait]
impl Tool for ResearchTool {
    fn name(&self) -> &str {
        "research-topic"
    }

    fn description(&self) -> &str {
        "Research a topic from several angles in parallel and synthesize a report. \
         Keeps going when some angles fail."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "topic": {
                    "type": "string",
                    "description": "What to research"
                },
                "angles": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Questions to investigate (default: market, users, technical)"
                }
            },
            "required": ["topic"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        config: &ToolConfig,
        ctx: &ToolContext,
    ) -> Result<ToolResponse, Error> {
        let topic = require_str(self.name(), &params, "topic")?.to_string();
        let angles = angles_from(&params)?;
        let config = config.clone();

        let handle = self
            .jobs
            .spawn_job(
                self.name(),
                params,
                ctx.session_id.clone(),
                format!("Researching {topic}"),
                move |reporter| async move {
                    let llm = config.llm()?;
                    reporter
                        .progress(format!("Querying {} research angles", angles.len()))
                        .await;

                    let queries: Vec<_> = angles
                        .iter()
                        .map(|angle| {
                            let llm = llm.clone();
                            let request = CompletionRequest::new(
                                QUERY_SYSTEM_PROMPT,
                                format!("Topic: {topic}\nQuestion: {angle}"),
                                config.max_tokens,
                            )
                            .with_temperature(QUERY_TEMPERATURE);
                            async move {
                                llm.complete(request)
                                    .await
                                    .map(|response| response.content)
                                    .map_err(Error::from)
                            }
                        })
                        .collect();

                    let phase = run_resilient_phase(
                        &reporter,
                        "research",
                        queries,
                        MISSING_DATA_SENTINEL.to_string(),
                    )
                    .await;

                    reporter.progress("Synthesizing findings").await;
                    let findings = angles
                        .iter()
                        .zip(&phase.slots)
                        .map(|(angle, finding)| format!("## {angle}\n{finding}"))
                        .collect::<Vec<_>>()
                        .join("\n\n");
                    let report = llm
                        .complete(CompletionRequest::new(
                            SYNTHESIS_SYSTEM_PROMPT,
                            format!("Topic: {topic}\n\n{findings}"),
                            config.max_tokens,
                        ))
                        .await?;

                    let mut output = text_content(report.content);
                    output["angles"] = serde_json::json!(angles);
                    output["failedQueries"] = serde_json::json!(phase.failed_count());
                    Ok(output)
                },
            )
            .await;

        Ok(ToolResponse::Job(handle))
    }
}
