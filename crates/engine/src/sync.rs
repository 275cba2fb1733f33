use tracing::info;

use recsync_core::{
    config::{PolicyKind, SyncConfig},
    fields::FieldMap,
    ids::BatchId,
};
use recsync_storage::{ExternalSystem, ObjectStore};

use crate::actions::SyncAction;
use crate::error::EngineError;
use crate::factory::ActionFactory;
use crate::policy::{BasicSyncPolicy, OrderedSyncPolicy, SyncPolicy, TransactionSyncPolicy};

/// Records of one entity type from one upstream source.
#[derive(Debug, Clone, Default)]
pub struct SyncSource {
    /// Name of the external system owning the records' keys. Without one,
    /// external keys are ignored.
    pub external_system: Option<String>,
    pub type_tag: String,
    pub records: Vec<FieldMap>,
}

impl SyncSource {
    pub fn new(type_tag: impl Into<String>, records: Vec<FieldMap>) -> Self {
        Self {
            external_system: None,
            type_tag: type_tag.into(),
            records,
        }
    }

    pub fn with_external_system(mut self, name: impl Into<String>) -> Self {
        self.external_system = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub records: usize,
    pub actions: usize,
}

pub struct Synchronizer<S> {
    store: S,
    config: SyncConfig,
}

impl<S: ObjectStore> Synchronizer<S> {
    pub fn new(store: S, config: SyncConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Find the named system, creating it when the configuration allows.
    pub fn external_system(&mut self, name: &str) -> Result<ExternalSystem, EngineError> {
        if name.trim().is_empty() {
            return Err(EngineError::UnknownExternalSystem(name.to_string()));
        }
        if let Some(system) = self.store.find_external_system(name)? {
            return Ok(system);
        }
        if !self.config.create_external_system {
            return Err(EngineError::UnknownExternalSystem(name.to_string()));
        }
        info!(system = name, "creating external system");
        Ok(self.store.create_external_system(name, name)?)
    }

    pub fn factory(&mut self, source: &SyncSource) -> Result<ActionFactory, EngineError> {
        let schema = self
            .store
            .schemas()
            .get(&source.type_tag)
            .ok_or_else(|| EngineError::UnknownEntityType(source.type_tag.clone()))?;
        let system = match &source.external_system {
            Some(name) => Some(self.external_system(name)?),
            None => None,
        };
        Ok(ActionFactory::new(schema, system))
    }

    pub fn sync(&mut self, source: SyncSource) -> Result<BatchSummary, EngineError> {
        self.sync_all(vec![source])
    }

    /// Build every record's actions, then run them as one batch under the
    /// configured policy.
    pub fn sync_all(&mut self, sources: Vec<SyncSource>) -> Result<BatchSummary, EngineError> {
        let batch_id = BatchId::new();
        let mut records = 0;
        let mut actions: Vec<Box<dyn SyncAction>> = Vec::new();
        for source in sources {
            let factory = self.factory(&source)?;
            for record in source.records {
                records += 1;
                actions.extend(factory.from_record(record, &self.config.labels)?);
            }
        }

        let mut policy: Box<dyn SyncPolicy> = match self.config.policy {
            PolicyKind::Basic => Box::new(BasicSyncPolicy::new(actions)),
            PolicyKind::Ordered => Box::new(OrderedSyncPolicy::new(actions)),
        };
        if self.config.transactional {
            policy = Box::new(TransactionSyncPolicy::new(policy));
        }

        let summary = BatchSummary {
            batch_id,
            records,
            actions: policy.len(),
        };
        info!(
            %batch_id,
            records,
            actions = summary.actions,
            policy = ?self.config.policy,
            transactional = self.config.transactional,
            "executing batch"
        );
        policy.execute(&mut self.store)?;
        info!(%batch_id, "batch complete");
        Ok(summary)
    }
}

impl<S> std::fmt::Debug for Synchronizer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("policy", &self.config.policy)
            .field("transactional", &self.config.transactional)
            .finish()
    }
}
