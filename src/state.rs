//! Local deployment ledger
//!
//! One JSON file per stack under the state directory, recording the template
//! that was last applied and the outputs resolved at that time. `diff` and
//! `apply` compare the desired template against this ledger.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::{Template, TemplateResource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// What was last applied for one stack
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployState {
    pub stack: String,

    /// Last time an apply or destroy touched this ledger
    #[serde(default)]
    pub last_applied: Option<DateTime<Utc>>,

    /// Resources as they were provisioned
    #[serde(default)]
    pub template: Template,

    /// Output values resolved at apply time
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

impl DeployState {
    /// Empty ledger for a stack that was never applied
    pub fn new(stack: &str) -> Self {
        Self {
            stack: stack.to_string(),
            ..Default::default()
        }
    }

    /// Ledger path for a stack
    pub fn state_file(stack: &str) -> Result<PathBuf> {
        Ok(crate::paths::state_dir()?.join(format!("{stack}.json")))
    }

    /// Load the ledger for a stack, or an empty one if it doesn't exist
    pub fn load(stack: &str) -> Result<Self> {
        Self::load_from(&Self::state_file(stack)?, stack)
    }

    pub fn load_from(path: &Path, stack: &str) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, starting empty");
            return Ok(Self::new(stack));
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save the ledger for its stack
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::state_file(&self.stack)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize state to JSON")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Whether anything is currently provisioned
    pub fn is_deployed(&self) -> bool {
        !self.template.resources.is_empty()
    }

    /// Replace the recorded resources after an apply
    ///
    /// Outputs are only kept while the stack has resources.
    pub fn record(
        &mut self,
        description: &str,
        resources: BTreeMap<String, TemplateResource>,
        outputs: BTreeMap<String, String>,
    ) {
        self.template.description = description.to_string();
        self.template.resources = resources;
        self.outputs = if self.template.resources.is_empty() {
            BTreeMap::new()
        } else {
            outputs
        };
        self.last_applied = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::template::ResourceMetadata;
    use tempfile::TempDir;

    fn resource(kind: &str) -> TemplateResource {
        TemplateResource {
            kind: kind.to_string(),
            properties: serde_json::Map::new(),
            depends_on: Vec::new(),
            deletion_policy: None,
            metadata: ResourceMetadata::default(),
        }
    }

    #[test]
    fn test_missing_file_gives_empty_state() {
        let dir = TempDir::new().unwrap();
        let state = DeployState::load_from(&dir.path().join("none.json"), "Demo").unwrap();
        assert_eq!(state.stack, "Demo");
        assert!(!state.is_deployed());
        assert!(state.last_applied.is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("Demo.json");

        let mut state = DeployState::new("Demo");
        state.record(
            "demo stack",
            BTreeMap::from([("Queue".to_string(), resource("AWS::SQS::Queue"))]),
            BTreeMap::from([("SQSURL".to_string(), "https://queue".to_string())]),
        );
        state.save_to(&path).unwrap();

        let loaded = DeployState::load_from(&path, "Demo").unwrap();
        assert!(loaded.is_deployed());
        assert_eq!(loaded.template.resources["Queue"].kind, "AWS::SQS::Queue");
        assert_eq!(loaded.outputs["SQSURL"], "https://queue");
        assert!(loaded.last_applied.is_some());
    }

    #[test]
    fn test_recording_no_resources_clears_outputs() {
        let mut state = DeployState::new("Demo");
        state.record(
            "demo stack",
            BTreeMap::new(),
            BTreeMap::from([("SQSURL".to_string(), "x".to_string())]),
        );
        assert!(state.outputs.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Demo.json");
        fs::write(&path, "{ not json").unwrap();
        let err = DeployState::load_from(&path, "Demo").unwrap_err();
        assert!(err.to_string().contains("Failed to parse state file"));
    }
}
