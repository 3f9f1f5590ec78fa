//! Workflow definitions loaded once at startup.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, WorkflowError};
use crate::workflow::definition::WorkflowDefinition;

/// Read-only set of workflow definitions, keyed by name.
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    definitions: HashMap<String, Arc<WorkflowDefinition>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-parsed definitions. Each is validated; names
    /// must be unique.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = WorkflowDefinition>,
    ) -> Result<Self, WorkflowError> {
        let mut map = HashMap::new();
        for definition in definitions {
            definition.validate()?;
            if map.contains_key(&definition.name) {
                return Err(WorkflowError::InvalidDefinition {
                    name: definition.name.clone(),
                    reason: "defined more than once".to_string(),
                });
            }
            map.insert(definition.name.clone(), Arc::new(definition));
        }
        Ok(Self { definitions: map })
    }

    /// Load every `*.json` file in `dir`.
    ///
    /// A missing directory yields an empty registry. Any invalid file is an
    /// error, so a bad definition stops startup instead of failing later.
    pub fn load_dir(dir: &Path) -> Result<Self, Error> {
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "Workflow directory not found; no workflows loaded");
            return Ok(Self::new());
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut definitions = Vec::with_capacity(paths.len());
        for path in &paths {
            let raw = std::fs::read_to_string(path)?;
            let definition = WorkflowDefinition::from_json(&raw).map_err(|e| match e {
                WorkflowError::InvalidDefinition { name, reason } => {
                    WorkflowError::InvalidDefinition {
                        name,
                        reason: format!("{}: {reason}", path.display()),
                    }
                }
                other => other,
            })?;
            tracing::debug!(workflow = %definition.name, file = %path.display(), "Loaded workflow");
            definitions.push(definition);
        }

        let registry = Self::from_definitions(definitions)?;
        tracing::info!(count = registry.count(), dir = %dir.display(), "Workflows loaded");
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Result<Arc<WorkflowDefinition>, WorkflowError> {
        self.definitions
            .get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound {
                name: name.to_string(),
            })
    }

    /// All definitions, sorted by name.
    pub fn list(&self) -> Vec<Arc<WorkflowDefinition>> {
        let mut all: Vec<_> = self.definitions.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn count(&self) -> usize {
        self.definitions.len()
    }
}
