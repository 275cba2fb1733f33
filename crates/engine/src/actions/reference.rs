use tracing::{debug, info};

use recsync_core::object::TargetObject;
use recsync_storage::{ExternalKeyMapping, ExternalSystem, ObjectStore};

use super::{ActionType, CreateModelAction, DeleteModelAction, SyncAction, UpdateModelAction};
use crate::error::EngineError;

/// Point the (system, key) mapping at `object`, creating the mapping on
/// first use.
fn align_mapping(
    store: &mut dyn ObjectStore,
    system: &ExternalSystem,
    external_key: &str,
    object: &TargetObject,
) -> Result<(), EngineError> {
    let target = object
        .object_ref()
        .ok_or_else(|| EngineError::Unsaved(object.type_tag().to_string()))?;
    let mut mapping = store
        .get_mapping(system.system_id, external_key)?
        .unwrap_or_else(|| ExternalKeyMapping::new(system.system_id, external_key, target.clone()));
    mapping.target = target;
    store.save_mapping(&mut mapping)?;
    Ok(())
}

/// The live object of `type_tag` behind the (system, key) mapping.
fn linked_object(
    store: &dyn ObjectStore,
    system: &ExternalSystem,
    external_key: &str,
    type_tag: &str,
) -> Result<Option<TargetObject>, EngineError> {
    let Some(mapping) = store.get_mapping(system.system_id, external_key)? else {
        return Ok(None);
    };
    if mapping.target.type_tag != type_tag {
        debug!(
            external_key,
            target = %mapping.target,
            expected = type_tag,
            "mapping points at another entity type"
        );
        return Ok(None);
    }
    let object = store.resolve(&mapping.target)?;
    if object.is_none() {
        debug!(external_key, target = %mapping.target, "mapping is dangling");
    }
    Ok(object)
}

/// Runs the inner action and records its result against the external key.
#[derive(Debug)]
pub struct AlignExternalReferenceAction {
    system: ExternalSystem,
    external_key: String,
    inner: Box<dyn SyncAction>,
}

impl AlignExternalReferenceAction {
    pub fn new(
        system: ExternalSystem,
        external_key: impl Into<String>,
        inner: Box<dyn SyncAction>,
    ) -> Self {
        Self {
            system,
            external_key: external_key.into(),
            inner,
        }
    }
}

impl SyncAction for AlignExternalReferenceAction {
    fn action_type(&self) -> ActionType {
        self.inner.action_type()
    }

    fn execute(&self, store: &mut dyn ObjectStore) -> Result<Option<TargetObject>, EngineError> {
        let result = self.inner.execute(store)?;
        if let Some(object) = &result {
            align_mapping(store, &self.system, &self.external_key, object)?;
        }
        Ok(result)
    }
}

/// Create, treating an existing live mapping as authoritative over the
/// match fields.
#[derive(Debug)]
pub struct CreateModelWithReferenceAction {
    system: ExternalSystem,
    external_key: String,
    type_tag: String,
    inner: AlignExternalReferenceAction,
}

impl CreateModelWithReferenceAction {
    pub fn new(system: ExternalSystem, external_key: impl Into<String>, create: CreateModelAction) -> Self {
        let external_key = external_key.into();
        let type_tag = create.model().type_tag().to_string();
        Self {
            inner: AlignExternalReferenceAction::new(
                system.clone(),
                external_key.clone(),
                Box::new(create),
            ),
            system,
            external_key,
            type_tag,
        }
    }
}

impl SyncAction for CreateModelWithReferenceAction {
    fn action_type(&self) -> ActionType {
        ActionType::Create
    }

    fn execute(&self, store: &mut dyn ObjectStore) -> Result<Option<TargetObject>, EngineError> {
        if let Some(linked) = linked_object(store, &self.system, &self.external_key, &self.type_tag)? {
            debug!(external_key = %self.external_key, id = ?linked.id(), "already mapped");
            return Ok(Some(linked));
        }
        self.inner.execute(store)
    }
}

/// Update the mapped object, or the selected one when no mapping resolves.
#[derive(Debug)]
pub struct UpdateModelWithReferenceAction {
    system: ExternalSystem,
    external_key: String,
    update: UpdateModelAction,
}

impl UpdateModelWithReferenceAction {
    pub fn new(system: ExternalSystem, external_key: impl Into<String>, update: UpdateModelAction) -> Self {
        Self {
            system,
            external_key: external_key.into(),
            update,
        }
    }
}

impl SyncAction for UpdateModelWithReferenceAction {
    fn action_type(&self) -> ActionType {
        ActionType::Update
    }

    fn execute(&self, store: &mut dyn ObjectStore) -> Result<Option<TargetObject>, EngineError> {
        let model = self.update.model();
        let linked = linked_object(store, &self.system, &self.external_key, model.type_tag())?;
        let matched = model.find_unique(store)?;

        // The linked object wins; a different matched object is a duplicate.
        if let (Some(linked), Some(matched)) = (&linked, &matched) {
            if linked.id() != matched.id() {
                if let Some(duplicate) = matched.object_ref() {
                    info!(
                        external_key = %self.external_key,
                        duplicate = %duplicate,
                        "removing object duplicated by mapped object"
                    );
                    store.delete_object(&duplicate)?;
                }
            }
        }

        let Some(object) = linked.or(matched) else {
            return Ok(None);
        };
        let result = self.update.apply(store, object)?;
        if let Some(object) = &result {
            align_mapping(store, &self.system, &self.external_key, object)?;
        }
        Ok(result)
    }
}

/// Delete only when this key claims the object and no other system does.
#[derive(Debug)]
pub struct DeleteIfOnlyReferenceModelAction {
    system: ExternalSystem,
    external_key: String,
    delete: DeleteModelAction,
}

impl DeleteIfOnlyReferenceModelAction {
    pub fn new(system: ExternalSystem, external_key: impl Into<String>, delete: DeleteModelAction) -> Self {
        Self {
            system,
            external_key: external_key.into(),
            delete,
        }
    }
}

impl SyncAction for DeleteIfOnlyReferenceModelAction {
    fn action_type(&self) -> ActionType {
        self.delete.action_type()
    }

    fn execute(&self, store: &mut dyn ObjectStore) -> Result<Option<TargetObject>, EngineError> {
        let Some(target) = self
            .delete
            .model()
            .find_unique(store)?
            .and_then(|o| o.object_ref())
        else {
            return Ok(None);
        };

        let mappings = store.mappings_for_object(&target)?;
        let own = mappings
            .iter()
            .any(|m| m.system_id == self.system.system_id && m.external_key == self.external_key);
        if !own {
            debug!(
                object = %target,
                external_key = %self.external_key,
                "object not claimed by this key, not deleting"
            );
            return Ok(None);
        }

        let foreign = mappings
            .iter()
            .filter(|m| m.system_id != self.system.system_id)
            .count();
        if foreign > 0 {
            info!(object = %target, foreign, "object still claimed by other systems, not deleting");
            return Ok(None);
        }
        self.delete.execute(store)
    }
}

/// Drop this system's claim on the key.
#[derive(Debug)]
pub struct DeleteExternalReferenceAction {
    system: ExternalSystem,
    external_key: String,
}

impl DeleteExternalReferenceAction {
    pub fn new(system: ExternalSystem, external_key: impl Into<String>) -> Self {
        Self {
            system,
            external_key: external_key.into(),
        }
    }
}

impl SyncAction for DeleteExternalReferenceAction {
    fn action_type(&self) -> ActionType {
        ActionType::Delete
    }

    fn execute(&self, store: &mut dyn ObjectStore) -> Result<Option<TargetObject>, EngineError> {
        let removed = store.delete_mappings(self.system.system_id, &self.external_key)?;
        debug!(system = %self.system.name, external_key = %self.external_key, removed, "deleted mappings");
        Ok(None)
    }
}
