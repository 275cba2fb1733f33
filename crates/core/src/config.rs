use std::path::Path;

use serde::Deserialize;

use crate::error::CoreError;
use crate::schema::{EntitySchema, SchemaRegistry};

/// Reserved keys of an input record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RecordLabels {
    pub action_flags: String,
    pub match_on: String,
    pub external_key: String,
}

impl Default for RecordLabels {
    fn default() -> Self {
        Self {
            action_flags: "action_flags".into(),
            match_on: "match_on".into(),
            external_key: "external_key".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Basic,
    #[default]
    Ordered,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub labels: RecordLabels,
    pub policy: PolicyKind,
    pub transactional: bool,
    pub create_external_system: bool,
    pub entities: Vec<EntitySchema>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            labels: RecordLabels::default(),
            policy: PolicyKind::default(),
            transactional: true,
            create_external_system: true,
            entities: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, CoreError> {
        toml::from_str(source).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    pub fn schema_registry(&self) -> Result<SchemaRegistry, CoreError> {
        SchemaRegistry::from_schemas(self.entities.iter().cloned())
    }
}
