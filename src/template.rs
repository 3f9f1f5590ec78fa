//! Placeholder substitution for workflow step parameters.
//!
//! Placeholders look like `{{workflow.input.<path>}}` or
//! `{{steps.<stepId>.output[.<path>]}}`. A string that is exactly one
//! placeholder is replaced by the referenced value with its JSON type
//! intact; placeholders embedded in text are stringified and spliced in.
//! Resolution is pure and fails closed: any unresolvable reference is an
//! error, never an empty or partial substitution.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::TemplateError;
use crate::workflow::context::ExecutionContext;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("placeholder regex is valid")
});

/// One step of a value path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// What a placeholder points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Input(Vec<Segment>),
    StepOutput { step_id: String, path: Vec<Segment> },
}

impl Reference {
    /// Parse the text between the braces.
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        if raw == "workflow.input" {
            return Ok(Self::Input(Vec::new()));
        }
        if let Some(path) = raw.strip_prefix("workflow.input.") {
            return Ok(Self::Input(parse_path(path, false)?));
        }

        if let Some(rest) = raw.strip_prefix("steps.") {
            let (step_id, tail) = rest.split_once('.').ok_or_else(|| TemplateError::MalformedPath {
                path: raw.to_string(),
                reason: "expected steps.<stepId>.output".to_string(),
            })?;
            if step_id.is_empty() {
                return Err(TemplateError::MalformedPath {
                    path: raw.to_string(),
                    reason: "empty step id".to_string(),
                });
            }
            let Some(after_output) = tail.strip_prefix("output") else {
                return Err(TemplateError::UnknownReference {
                    reference: raw.to_string(),
                });
            };
            let path = if after_output.is_empty() {
                Vec::new()
            } else if let Some(dotted) = after_output.strip_prefix('.') {
                parse_path(dotted, false)?
            } else if after_output.starts_with('[') {
                parse_path(after_output, true)?
            } else {
                return Err(TemplateError::UnknownReference {
                    reference: raw.to_string(),
                });
            };
            return Ok(Self::StepOutput {
                step_id: step_id.to_string(),
                path,
            });
        }

        Err(TemplateError::UnknownReference {
            reference: raw.to_string(),
        })
    }
}

/// Parse `a.b[0].c` into segments.
fn parse_path(path: &str, leading_index: bool) -> Result<Vec<Segment>, TemplateError> {
    let malformed = |reason: &str| TemplateError::MalformedPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let mut segments = Vec::new();
    for (i, part) in path.split('.').enumerate() {
        if part.is_empty() {
            return Err(malformed("empty segment"));
        }
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if key.contains(']') {
            return Err(malformed("unexpected ']'"));
        }
        if key.is_empty() && !(i == 0 && leading_index) {
            return Err(malformed("empty key before index"));
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key.to_string()));
        }

        while !rest.is_empty() {
            let inner = rest
                .strip_prefix('[')
                .ok_or_else(|| malformed("unexpected characters after index"))?;
            let end = inner.find(']').ok_or_else(|| malformed("unclosed '['"))?;
            let digits = &inner[..end];
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed("index must be a non-negative integer"));
            }
            let index = digits
                .parse::<usize>()
                .map_err(|_| malformed("index is out of range"))?;
            segments.push(Segment::Index(index));
            rest = &inner[end + 1..];
        }
    }
    Ok(segments)
}

fn walk<'a>(mut value: &'a serde_json::Value, path: &[Segment]) -> Option<&'a serde_json::Value> {
    for segment in path {
        value = match segment {
            Segment::Key(key) => value.as_object()?.get(key)?,
            Segment::Index(index) => value.as_array()?.get(*index)?,
        };
    }
    Some(value)
}

fn path_string(path: &[Segment]) -> String {
    let mut out = String::new();
    for segment in path {
        match segment {
            Segment::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            Segment::Index(index) => out.push_str(&format!("[{index}]")),
        }
    }
    out
}

fn lookup<'a>(raw: &str, ctx: &'a ExecutionContext) -> Result<&'a serde_json::Value, TemplateError> {
    match Reference::parse(raw)? {
        Reference::Input(path) => {
            walk(ctx.input(), &path).ok_or_else(|| TemplateError::UnknownInputField {
                path: path_string(&path),
            })
        }
        Reference::StepOutput { step_id, path } => {
            let output = ctx
                .step_output(&step_id)
                .ok_or_else(|| TemplateError::StepNotCompleted {
                    step_id: step_id.clone(),
                })?;
            walk(output, &path).ok_or_else(|| TemplateError::MissingOutputPath {
                path: path_string(&path),
                step_id,
            })
        }
    }
}

/// Braces left over once every well-formed placeholder is taken out mean a
/// placeholder was never closed (or opened).
fn reject_stray_braces(template: &str) -> Result<(), TemplateError> {
    let rest = PLACEHOLDER.replace_all(template, " ");
    if rest.contains("{{") || rest.contains("}}") {
        return Err(TemplateError::MalformedPath {
            path: template.to_string(),
            reason: "unterminated placeholder".to_string(),
        });
    }
    Ok(())
}

/// Text form of a value spliced into surrounding text.
pub fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolve every placeholder inside `value`, recursing through arrays and
/// object values. Object keys are left alone.
pub fn resolve(
    value: &serde_json::Value,
    ctx: &ExecutionContext,
) -> Result<serde_json::Value, TemplateError> {
    match value {
        serde_json::Value::String(s) => resolve_string(s, ctx),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| resolve(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array),
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, item) in map {
                out.insert(key.clone(), resolve(item, ctx)?);
            }
            Ok(serde_json::Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_string(s: &str, ctx: &ExecutionContext) -> Result<serde_json::Value, TemplateError> {
    if let Some(caps) = PLACEHOLDER.captures(s)
        && let Some(whole) = caps.get(0)
        && whole.start() == 0
        && whole.end() == s.len()
    {
        return lookup(&caps[1], ctx).cloned();
    }
    render(s, ctx).map(serde_json::Value::String)
}

/// Interpolate placeholders into a string, always producing text.
pub fn render(template: &str, ctx: &ExecutionContext) -> Result<String, TemplateError> {
    reject_stray_braces(template)?;
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&template[last..whole.start()]);
        out.push_str(&stringify(lookup(&caps[1], ctx)?));
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Step ids referenced anywhere inside `value`, in first-seen order.
///
/// Fails on malformed or unknown references so definitions can be checked
/// when they are loaded.
pub fn referenced_steps(value: &serde_json::Value) -> Result<Vec<String>, TemplateError> {
    let mut found = Vec::new();
    collect_steps(value, &mut found)?;
    Ok(found)
}

fn collect_steps(value: &serde_json::Value, found: &mut Vec<String>) -> Result<(), TemplateError> {
    match value {
        serde_json::Value::String(s) => {
            reject_stray_braces(s)?;
            for caps in PLACEHOLDER.captures_iter(s) {
                if let Reference::StepOutput { step_id, .. } = Reference::parse(&caps[1])?
                    && !found.contains(&step_id)
                {
                    found.push(step_id);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_steps(item, found)?;
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_steps(item, found)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::new(json!({
            "productDescription": "Todo app",
            "audience": {"segments": ["students", "teams"]},
            "budget": 1200,
        }));
        ctx.record_success(
            "step1",
            json!({"content": [{"type": "text", "text": "T1"}], "meta": {"count": 3, "ok": true}}),
        );
        ctx.record_success("list", json!(["a", "b"]));
        ctx
    }

    #[test]
    fn whole_value_keeps_type() {
        let ctx = ctx();
        assert_eq!(resolve(&json!("{{workflow.input.budget}}"), &ctx).unwrap(), json!(1200));
        assert_eq!(
            resolve(&json!("{{steps.step1.output.meta}}"), &ctx).unwrap(),
            json!({"count": 3, "ok": true})
        );
        assert_eq!(
            resolve(&json!("{{ steps.step1.output.meta.ok }}"), &ctx).unwrap(),
            json!(true)
        );
        assert_eq!(resolve(&json!("{{steps.list.output[1]}}"), &ctx).unwrap(), json!("b"));
    }

    #[test]
    fn interpolation_stringifies() {
        let ctx = ctx();
        let out = resolve(
            &json!("Build {{workflow.input.productDescription}} for {{workflow.input.budget}} USD; meta={{steps.step1.output.meta}}"),
            &ctx,
        )
        .unwrap();
        assert_eq!(out, json!(r#"Build Todo app for 1200 USD; meta={"count":3,"ok":true}"#));
    }

    #[test]
    fn recurses_through_nested_structures() {
        let ctx = ctx();
        let params = json!({
            "title": "{{workflow.input.productDescription}}",
            "sections": [
                {"body": "{{steps.step1.output.content[0].text}}"},
                42,
                null
            ],
            "{{not.a.placeholder}}": "kept key"
        });
        let out = resolve(&params, &ctx).unwrap();
        assert_eq!(out["title"], "Todo app");
        assert_eq!(out["sections"][0]["body"], "T1");
        assert_eq!(out["sections"][1], 42);
        assert_eq!(out["{{not.a.placeholder}}"], "kept key");
    }

    #[test]
    fn scenario_step_output_threads_into_next_step() {
        let ctx = ctx();
        let params = json!({"input": "{{steps.step1.output.content[0].text}}"});
        assert_eq!(resolve(&params, &ctx).unwrap(), json!({"input": "T1"}));
    }

    #[test]
    fn strings_without_placeholders_pass_through() {
        let ctx = ctx();
        assert_eq!(resolve(&json!("plain {text}"), &ctx).unwrap(), json!("plain {text}"));
        assert_eq!(resolve(&json!(""), &ctx).unwrap(), json!(""));
    }

    #[test]
    fn unknown_input_field_fails() {
        let err = resolve(&json!({"x": "{{workflow.input.missing}}"}), &ctx()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownInputField {
                path: "missing".into()
            }
        );
    }

    #[test]
    fn uncompleted_step_fails() {
        let err = resolve(&json!("see {{steps.step9.output.content}}"), &ctx()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::StepNotCompleted {
                step_id: "step9".into()
            }
        );
    }

    #[test]
    fn missing_output_path_fails() {
        let err = resolve(&json!("{{steps.step1.output.content[5].text}}"), &ctx()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingOutputPath {
                step_id: "step1".into(),
                path: "content[5].text".into()
            }
        );
    }

    #[test]
    fn malformed_paths_fail() {
        let ctx = ctx();
        for bad in [
            "{{steps.step1.output.content[x]}}",
            "{{steps.step1.output.content[0}}",
            "{{steps.step1.output..text}}",
            "{{workflow.input.a]b}}",
            "{{steps..output}}",
            "{{steps.step1}}",
        ] {
            let err = resolve(&json!(bad), &ctx).unwrap_err();
            assert!(
                matches!(err, TemplateError::MalformedPath { .. }),
                "{bad} gave {err:?}"
            );
        }
    }

    #[test]
    fn unknown_roots_fail() {
        let ctx = ctx();
        for bad in ["{{env.HOME}}", "{{}}", "{{steps.step1.result}}", "{{steps.step1.outputs}}"] {
            let err = resolve(&json!(bad), &ctx).unwrap_err();
            assert!(
                matches!(err, TemplateError::UnknownReference { .. }),
                "{bad} gave {err:?}"
            );
        }
    }

    #[test]
    fn error_in_one_leaf_fails_whole_value() {
        let params = json!({"ok": "{{workflow.input.budget}}", "bad": "{{workflow.input.nope}}"});
        assert!(resolve(&params, &ctx()).is_err());
    }

    #[test]
    fn resolution_is_deterministic() {
        let ctx = ctx();
        let params = json!({
            "a": "{{steps.step1.output.meta}} / {{workflow.input.audience}}",
            "b": ["{{steps.list.output}}", "{{workflow.input.audience.segments[0]}}"]
        });
        let first = serde_json::to_vec(&resolve(&params, &ctx).unwrap()).unwrap();
        let second = serde_json::to_vec(&resolve(&params, &ctx).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn render_always_produces_text() {
        let ctx = ctx();
        assert_eq!(render("{{workflow.input.budget}}", &ctx).unwrap(), "1200");
        assert_eq!(
            render("Stories: {{steps.step1.output.content[0].text}}", &ctx).unwrap(),
            "Stories: T1"
        );
    }

    #[test]
    fn referenced_steps_in_order() {
        let params = json!({
            "a": "{{steps.prd.output.content[0].text}} and {{workflow.input.x}}",
            "b": ["{{steps.stories.output}}", "{{steps.prd.output}}"]
        });
        assert_eq!(referenced_steps(&params).unwrap(), vec!["prd", "stories"]);
        assert!(referenced_steps(&json!("{{steps.x.output[}}")).is_err());
    }

    #[test]
    fn unterminated_placeholders_fail() {
        let ctx = ctx();
        for bad in [
            "{{workflow.input.x",
            "{{steps.a.output}",
            "Build {{workflow.input.productDescription now",
            "{{workflow.input.budget}} and {{steps.step1.output",
            "stray }} closer",
        ] {
            let err = resolve(&json!({"input": bad}), &ctx).unwrap_err();
            assert!(
                matches!(err, TemplateError::MalformedPath { .. }),
                "{bad} gave {err:?}"
            );
            assert!(render(bad, &ctx).is_err(), "{bad} rendered");
            assert!(referenced_steps(&json!(bad)).is_err(), "{bad} passed load checks");
        }
    }

    #[test]
    fn index_must_be_plain_digits() {
        let ctx = ctx();
        for bad in [
            "{{steps.step1.output.content[+0].text}}",
            "{{steps.step1.output.content[-1].text}}",
            "{{steps.step1.output.content[ 0].text}}",
            "{{steps.step1.output.content[].text}}",
        ] {
            let err = resolve(&json!(bad), &ctx).unwrap_err();
            assert!(
                matches!(err, TemplateError::MalformedPath { .. }),
                "{bad} gave {err:?}"
            );
        }
    }
}
