use tracing::{debug, warn};

use recsync_core::object::TargetObject;
use recsync_storage::{Lookup, ObjectStore};

use super::{ActionType, ModelAction, SyncAction};
use crate::error::EngineError;

/// Create the selected object unless it already exists.
#[derive(Debug, Clone)]
pub struct CreateModelAction {
    model: ModelAction,
}

impl CreateModelAction {
    pub fn new(model: ModelAction) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &ModelAction {
        &self.model
    }
}

impl SyncAction for CreateModelAction {
    fn action_type(&self) -> ActionType {
        ActionType::Create
    }

    fn execute(&self, store: &mut dyn ObjectStore) -> Result<Option<TargetObject>, EngineError> {
        let model = &self.model;
        match model.get_object(store)? {
            Lookup::Found(existing) => return Ok(Some(existing)),
            Lookup::Ambiguous => {
                warn!(
                    type_tag = model.type_tag(),
                    selector = %model.selector(),
                    "cannot create, selector matches more than one object"
                );
                return Ok(None);
            }
            Lookup::NotFound => {}
        }

        let mut object = model.schema().instantiate()?;
        // New objects take every provided value over the declared defaults.
        model.update_from_fields(&mut object, true, store)?;
        if !model.save_or_log(store, &mut object)? {
            return Ok(None);
        }
        debug!(type_tag = model.type_tag(), id = ?object.id(), "created object");
        Ok(Some(object))
    }
}

#[derive(Debug, Clone)]
pub struct UpdateModelAction {
    model: ModelAction,
    force: bool,
}

impl UpdateModelAction {
    pub fn new(model: ModelAction, force: bool) -> Self {
        Self { model, force }
    }

    pub fn model(&self) -> &ModelAction {
        &self.model
    }

    pub fn force(&self) -> bool {
        self.force
    }

    /// Apply the record to an already resolved object and save it.
    pub(crate) fn apply(
        &self,
        store: &mut dyn ObjectStore,
        mut object: TargetObject,
    ) -> Result<Option<TargetObject>, EngineError> {
        self.model.update_from_fields(&mut object, self.force, store)?;
        if !self.model.save_or_log(store, &mut object)? {
            return Ok(None);
        }
        Ok(Some(object))
    }
}

impl SyncAction for UpdateModelAction {
    fn action_type(&self) -> ActionType {
        ActionType::Update
    }

    fn execute(&self, store: &mut dyn ObjectStore) -> Result<Option<TargetObject>, EngineError> {
        match self.model.find_unique(store)? {
            Some(object) => self.apply(store, object),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeleteModelAction {
    model: ModelAction,
}

impl DeleteModelAction {
    pub fn new(model: ModelAction) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &ModelAction {
        &self.model
    }
}

impl SyncAction for DeleteModelAction {
    fn action_type(&self) -> ActionType {
        ActionType::Delete
    }

    fn execute(&self, store: &mut dyn ObjectStore) -> Result<Option<TargetObject>, EngineError> {
        if let Some(target) = self.model.find_unique(store)?.and_then(|o| o.object_ref()) {
            store.delete_object(&target)?;
            debug!(object = %target, "deleted object");
        }
        Ok(None)
    }
}
