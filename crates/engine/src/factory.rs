use std::sync::Arc;

use recsync_core::{
    config::RecordLabels,
    fields::FieldMap,
    intent::{self, SyncIntent},
    schema::EntitySchema,
    selector::MatchSpec,
};
use recsync_storage::ExternalSystem;

use crate::actions::*;
use crate::error::EngineError;

/// Builds the action chain for one record of one entity type.
#[derive(Debug, Clone)]
pub struct ActionFactory {
    schema: Arc<EntitySchema>,
    external_system: Option<ExternalSystem>,
}

impl ActionFactory {
    pub fn new(schema: Arc<EntitySchema>, external_system: Option<ExternalSystem>) -> Self {
        Self {
            schema,
            external_system,
        }
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    pub fn external_system(&self) -> Option<&ExternalSystem> {
        self.external_system.as_ref()
    }

    /// A key is usable only with a system to scope it and when non-blank.
    pub fn is_externally_mappable(&self, external_key: Option<&str>) -> bool {
        self.mapping_scope(external_key).is_some()
    }

    fn mapping_scope<'k>(&self, external_key: Option<&'k str>) -> Option<(&ExternalSystem, &'k str)> {
        let system = self.external_system.as_ref()?;
        let key = external_key?;
        (!key.trim().is_empty()).then_some((system, key))
    }

    pub fn build(
        &self,
        intent: &SyncIntent,
        spec: &MatchSpec,
        external_key: Option<&str>,
        fields: FieldMap,
    ) -> Result<Vec<Box<dyn SyncAction>>, EngineError> {
        let model = ModelAction::new(Arc::clone(&self.schema), spec, fields)?;
        let scope = self.mapping_scope(external_key);
        let mut actions: Vec<Box<dyn SyncAction>> = Vec::new();

        if intent.is_impotent() {
            actions.push(Box::new(model.clone()));
        }

        if intent.delete() {
            let delete = DeleteModelAction::new(model.clone());
            match scope {
                Some((system, key)) => {
                    if intent.force() {
                        actions.push(Box::new(delete));
                    } else {
                        actions.push(Box::new(DeleteIfOnlyReferenceModelAction::new(
                            system.clone(),
                            key,
                            delete,
                        )));
                    }
                    actions.push(Box::new(DeleteExternalReferenceAction::new(system.clone(), key)));
                }
                None if intent.force() => actions.push(Box::new(delete)),
                None => {}
            }
        }

        if intent.create() {
            let create = CreateModelAction::new(model.clone());
            match scope {
                Some((system, key)) => actions.push(Box::new(CreateModelWithReferenceAction::new(
                    system.clone(),
                    key,
                    create,
                ))),
                None => actions.push(Box::new(create)),
            }
        }

        if intent.update() {
            let update = UpdateModelAction::new(model, intent.force());
            match scope {
                Some((system, key)) => actions.push(Box::new(UpdateModelWithReferenceAction::new(
                    system.clone(),
                    key,
                    update,
                ))),
                None => actions.push(Box::new(update)),
            }
        }

        Ok(actions)
    }

    /// Split the reserved keys off a raw record and build its actions.
    /// An empty record yields nothing; missing flags mean an impotent intent.
    pub fn from_record(
        &self,
        mut record: FieldMap,
        labels: &RecordLabels,
    ) -> Result<Vec<Box<dyn SyncAction>>, EngineError> {
        if record.is_empty() {
            return Ok(Vec::new());
        }

        let flags = record.remove(&labels.action_flags);
        let match_on = record
            .remove(&labels.match_on)
            .ok_or_else(|| EngineError::MissingRecordKey(labels.match_on.clone()))?;
        let external_key = record.remove(&labels.external_key);

        let intent = intent::decode(flags.as_deref())?;
        let spec = MatchSpec::parse(&match_on);
        self.build(&intent, &spec, external_key.as_deref(), record)
    }
}
