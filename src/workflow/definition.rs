//! Declarative workflow documents.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::template;

/// One tool invocation inside a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub tool_name: String,
    /// May embed `{{workflow.input.*}}` and `{{steps.<id>.output*}}` placeholders.
    #[serde(default = "empty_object")]
    pub params: serde_json::Value,
}

/// What a successful run reports, rendered against the final context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object")]
    pub input_schema: serde_json::Value,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub output: WorkflowOutput,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

impl WorkflowDefinition {
    /// Parse and validate a JSON document.
    pub fn from_json(raw: &str) -> Result<Self, WorkflowError> {
        let definition: Self =
            serde_json::from_str(raw).map_err(|e| WorkflowError::InvalidDefinition {
                name: "<unparsed>".to_string(),
                reason: e.to_string(),
            })?;
        definition.validate()?;
        Ok(definition)
    }

    /// Structural checks done once at load time.
    ///
    /// Step ids are unique and non-empty, every step names a tool, and
    /// params only reference steps declared earlier. Output templates may
    /// reference any step.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let invalid = |reason: String| WorkflowError::InvalidDefinition {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(invalid("workflow has no steps".to_string()));
        }

        let mut earlier: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(invalid("step with an empty id".to_string()));
            }
            if step.tool_name.trim().is_empty() {
                return Err(invalid(format!("step {} has no toolName", step.id)));
            }
            if earlier.contains(step.id.as_str()) {
                return Err(invalid(format!("duplicate step id {}", step.id)));
            }

            let referenced = template::referenced_steps(&step.params)
                .map_err(|e| invalid(format!("step {}: {e}", step.id)))?;
            if let Some(bad) = referenced.iter().find(|r| !earlier.contains(r.as_str())) {
                let reason = if *bad == step.id {
                    format!("step {} references its own output", step.id)
                } else {
                    format!("step {} references step {bad}, which does not run before it", step.id)
                };
                return Err(invalid(reason));
            }

            earlier.insert(&step.id);
        }

        let mut output_refs = Vec::new();
        if let Some(summary) = &self.output.summary {
            output_refs.extend(
                template::referenced_steps(&serde_json::Value::String(summary.clone()))
                    .map_err(|e| invalid(format!("output summary: {e}")))?,
            );
        }
        if let Some(details) = &self.output.details {
            output_refs.extend(
                template::referenced_steps(details)
                    .map_err(|e| invalid(format!("output details: {e}")))?,
            );
        }
        if let Some(bad) = output_refs.iter().find(|r| !earlier.contains(r.as_str())) {
            return Err(invalid(format!("output references unknown step {bad}")));
        }

        Ok(())
    }

    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRD_PIPELINE: &str = r#"{
        "name": "prd-pipeline",
        "description": "Stories, then a PRD built from them",
        "inputSchema": {
            "type": "object",
            "properties": {"productDescription": {"type": "string"}},
            "required": ["productDescription"]
        },
        "steps": [
            {"id": "step1", "toolName": "generate-user-stories",
             "params": {"input": "{{workflow.input.productDescription}}"}},
            {"id": "step2", "toolName": "generate-prd",
             "params": {"input": "{{steps.step1.output.content[0].text}}"}}
        ],
        "output": {
            "summary": "PRD ready for {{workflow.input.productDescription}}",
            "details": {"prd": "{{steps.step2.output.content[0].text}}"}
        }
    }"#;

    fn with_steps(steps: serde_json::Value) -> Result<WorkflowDefinition, WorkflowError> {
        WorkflowDefinition::from_json(
            &serde_json::json!({"name": "w", "steps": steps}).to_string(),
        )
    }

    #[test]
    fn parses_camel_case_document() {
        let def = WorkflowDefinition::from_json(PRD_PIPELINE).unwrap();
        assert_eq!(def.name, "prd-pipeline");
        assert_eq!(def.step_ids(), vec!["step1", "step2"]);
        assert_eq!(def.steps[1].tool_name, "generate-prd");
        assert_eq!(def.input_schema["required"][0], "productDescription");
        assert!(def.output.summary.is_some());
    }

    #[test]
    fn defaults_for_optional_fields() {
        let def = with_steps(serde_json::json!([{"id": "a", "toolName": "t"}])).unwrap();
        assert_eq!(def.steps[0].params, serde_json::json!({}));
        assert!(def.output.summary.is_none());
        assert_eq!(def.description, "");
    }

    #[test]
    fn rejects_forward_reference() {
        let err = with_steps(serde_json::json!([
            {"id": "a", "toolName": "t", "params": {"x": "{{steps.b.output}}"}},
            {"id": "b", "toolName": "t"}
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("does not run before it"));
    }

    #[test]
    fn rejects_self_reference() {
        let err = with_steps(serde_json::json!([
            {"id": "a", "toolName": "t", "params": {"x": "{{steps.a.output}}"}}
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("its own output"));
    }

    #[test]
    fn rejects_duplicate_ids_and_missing_tool() {
        assert!(
            with_steps(serde_json::json!([
                {"id": "a", "toolName": "t"},
                {"id": "a", "toolName": "t"}
            ]))
            .is_err()
        );
        assert!(with_steps(serde_json::json!([{"id": "a", "toolName": " "}])).is_err());
        assert!(with_steps(serde_json::json!([])).is_err());
    }

    #[test]
    fn rejects_malformed_placeholder() {
        let err = with_steps(serde_json::json!([
            {"id": "a", "toolName": "t", "params": {"x": "{{steps.a.output[}}"}}
        ]))
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidDefinition { .. }));
    }

    #[test]
    fn rejects_unterminated_placeholder() {
        for bad in ["{{workflow.input.x", "{{steps.a.output}"] {
            let err = with_steps(serde_json::json!([
                {"id": "a", "toolName": "t"},
                {"id": "b", "toolName": "t", "params": {"x": bad}}
            ]))
            .unwrap_err();
            assert!(matches!(err, WorkflowError::InvalidDefinition { .. }), "{bad} loaded");
        }

        let raw = serde_json::json!({
            "name": "w",
            "steps": [{"id": "a", "toolName": "t"}],
            "output": {"summary": "Done: {{steps.a.output"}
        });
        assert!(WorkflowDefinition::from_json(&raw.to_string()).is_err());
    }

    #[test]
    fn rejects_output_referencing_unknown_step() {
        let raw = serde_json::json!({
            "name": "w",
            "steps": [{"id": "a", "toolName": "t"}],
            "output": {"summary": "{{steps.zzz.output}}"}
        });
        assert!(WorkflowDefinition::from_json(&raw.to_string()).is_err());
    }

    #[test]
    fn rejects_unparseable_document() {
        let err = WorkflowDefinition::from_json("{\"name\": 3}").unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidDefinition { .. }));
    }
}
