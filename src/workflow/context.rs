//! Per-run data-flow context.

use std::collections::HashMap;

/// Workflow input plus the outputs of steps that have completed so far.
///
/// Created per run and dropped when the run ends. Entries are only ever
/// added, and only for steps that succeeded.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    input: serde_json::Value,
    outputs: HashMap<String, serde_json::Value>,
    completed: Vec<String>,
}

impl ExecutionContext {
    pub fn new(input: serde_json::Value) -> Self {
        Self {
            input,
            outputs: HashMap::new(),
            completed: Vec::new(),
        }
    }

    pub fn input(&self) -> &serde_json::Value {
        &self.input
    }

    /// Output of a completed step.
    pub fn step_output(&self, step_id: &str) -> Option<&serde_json::Value> {
        self.outputs.get(step_id)
    }

    /// Record a successful step. Returns false (and keeps the first value)
    /// if the step was already recorded.
    pub fn record_success(&mut self, step_id: &str, output: serde_json::Value) -> bool {
        if self.outputs.contains_key(step_id) {
            return false;
        }
        self.outputs.insert(step_id.to_string(), output);
        self.completed.push(step_id.to_string());
        true
    }

    /// Step ids in completion order.
    pub fn completed_steps(&self) -> &[String] {
        &self.completed
    }

    /// Step outputs as a JSON object.
    pub fn outputs_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .completed
            .iter()
            .filter_map(|id| self.outputs.get(id).map(|v| (id.clone(), v.clone())))
            .collect();
        serde_json::Value::Object(map)
    }
}
