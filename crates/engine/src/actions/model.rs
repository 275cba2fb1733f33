use std::sync::Arc;

use tracing::{debug, info, warn};

use recsync_core::{
    field_value::FieldValue,
    fields::{FieldKey, FieldMap, RelationEdit},
    ids::ObjectId,
    object::TargetObject,
    predicate::Predicate,
    schema::{EntitySchema, RelationDef},
    selector::{MatchSpec, ObjectSelector},
};
use recsync_storage::{Lookup, ObjectStore, StorageError};

use super::{ActionType, SyncAction};
use crate::error::EngineError;

/// Target type, selector and field values shared by every concrete action.
/// Executing a bare `ModelAction` does nothing.
#[derive(Debug, Clone)]
pub struct ModelAction {
    schema: Arc<EntitySchema>,
    selector: ObjectSelector,
    fields: FieldMap,
}

impl ModelAction {
    pub fn new(
        schema: Arc<EntitySchema>,
        spec: &MatchSpec,
        fields: FieldMap,
    ) -> Result<Self, EngineError> {
        let selector = ObjectSelector::new(spec, &fields)?;
        Ok(Self {
            schema,
            selector,
            fields,
        })
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    pub fn type_tag(&self) -> &str {
        self.schema.type_tag()
    }

    pub fn selector(&self) -> &ObjectSelector {
        &self.selector
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn get_object(&self, store: &dyn ObjectStore) -> Result<Lookup<TargetObject>, EngineError> {
        Ok(store.get_one(self.type_tag(), self.selector.predicate())?)
    }

    /// Like [`ModelAction::get_object`], logging and discarding an ambiguous match.
    pub(crate) fn find_unique(
        &self,
        store: &dyn ObjectStore,
    ) -> Result<Option<TargetObject>, EngineError> {
        match self.get_object(store)? {
            Lookup::Found(object) => Ok(Some(object)),
            Lookup::NotFound => Ok(None),
            Lookup::Ambiguous => {
                warn!(
                    type_tag = self.type_tag(),
                    selector = %self.selector,
                    "selector matches more than one object"
                );
                Ok(None)
            }
        }
    }

    /// Persist `object`. An integrity conflict is logged and reported as
    /// `false`; any other failure propagates.
    pub(crate) fn save_or_log(
        &self,
        store: &mut dyn ObjectStore,
        object: &mut TargetObject,
    ) -> Result<bool, EngineError> {
        match store.save(object) {
            Ok(()) => Ok(true),
            Err(StorageError::IntegrityConflict(reason)) => {
                warn!(
                    type_tag = self.type_tag(),
                    selector = %self.selector,
                    %reason,
                    "integrity conflict, object not saved"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Copy the record's values onto `object`.
    ///
    /// Without `force`, attributes that already hold a value are kept.
    /// Referential keys (`base=>related`) look the related object up by the
    /// grouped sub-keys. Lookup failures leave that relation unchanged.
    pub fn update_from_fields(
        &self,
        object: &mut TargetObject,
        force: bool,
        store: &dyn ObjectStore,
    ) -> Result<(), EngineError> {
        let mut referential: Vec<(&str, Vec<(&str, &str)>)> = Vec::new();
        for (key, value) in self.fields.iter() {
            match FieldKey::parse(key) {
                FieldKey::Direct(name) => self.apply_direct(object, name, value, force),
                FieldKey::Referential { base, related } => {
                    match referential.iter_mut().find(|(b, _)| *b == base) {
                        Some((_, sub_keys)) => sub_keys.push((related, value)),
                        None => referential.push((base, vec![(related, value)])),
                    }
                }
            }
        }

        for (base, sub_keys) in referential {
            match self.schema.relation(base) {
                Some(relation) if relation.is_many() => {
                    self.apply_many(object, relation, &sub_keys, store)?
                }
                Some(relation) => self.apply_scalar(object, relation, &sub_keys, force, store)?,
                None => warn!(
                    type_tag = self.type_tag(),
                    attribute = base,
                    "referential attribute is not a relation"
                ),
            }
        }
        Ok(())
    }

    fn apply_direct(&self, object: &mut TargetObject, name: &str, raw: &str, force: bool) {
        let Some(def) = self.schema.field(name) else {
            debug!(type_tag = self.type_tag(), attribute = name, "Field does not exist");
            return;
        };
        if !force && !object.is_blank(name) {
            return;
        }
        match def.coerce(raw) {
            Ok(value) => object.set_value(name, value),
            Err(e) => warn!(type_tag = self.type_tag(), attribute = name, error = %e, "value not applied"),
        }
    }

    fn apply_scalar(
        &self,
        object: &mut TargetObject,
        relation: &RelationDef,
        sub_keys: &[(&str, &str)],
        force: bool,
        store: &dyn ObjectStore,
    ) -> Result<(), EngineError> {
        let current = object.value(&relation.name).unwrap_or(&FieldValue::Null);
        if !force && !current.is_null() {
            return Ok(());
        }
        if let Some(target) = self.resolve_related(relation, sub_keys.iter().copied(), store)? {
            object.set_value(&relation.name, FieldValue::Reference(target));
        }
        Ok(())
    }

    fn apply_many(
        &self,
        object: &mut TargetObject,
        relation: &RelationDef,
        sub_keys: &[(&str, &str)],
        store: &dyn ObjectStore,
    ) -> Result<(), EngineError> {
        let mut edit = None;
        let mut stripped = Vec::with_capacity(sub_keys.len());
        for (related, value) in sub_keys {
            let Some((this_edit, name)) = RelationEdit::split(related) else {
                warn!(
                    type_tag = self.type_tag(),
                    relation = %relation.name,
                    sub_key = related,
                    "Unknown action type"
                );
                return Ok(());
            };
            if edit.is_some_and(|e| e != this_edit) {
                warn!(
                    type_tag = self.type_tag(),
                    relation = %relation.name,
                    "Dissimilar action types"
                );
                return Ok(());
            }
            edit = Some(this_edit);
            stripped.push((name, *value));
        }
        let Some(edit) = edit else {
            return Ok(());
        };

        let Some(target) = self.resolve_related(relation, stripped.into_iter(), store)? else {
            return Ok(());
        };
        let links = object.links_mut(&relation.name);
        match edit {
            RelationEdit::Add => {
                links.insert(target);
            }
            RelationEdit::Remove => {
                links.remove(&target);
            }
            RelationEdit::Replace => {
                links.clear();
                links.insert(target);
            }
        }
        Ok(())
    }

    /// Find the single related object matching every non-empty sub-key.
    fn resolve_related<'k>(
        &self,
        relation: &RelationDef,
        sub_keys: impl Iterator<Item = (&'k str, &'k str)>,
        store: &dyn ObjectStore,
    ) -> Result<Option<ObjectId>, EngineError> {
        let predicate = Predicate::all(
            sub_keys
                .filter(|(_, value)| !value.is_empty())
                .map(|(name, value)| Predicate::eq(name, value)),
        );
        if predicate == Predicate::Always {
            debug!(
                type_tag = self.type_tag(),
                relation = %relation.name,
                "no lookup values given"
            );
            return Ok(None);
        }

        match store.get_one(&relation.target, &predicate) {
            Ok(Lookup::Found(related)) => Ok(related.id()),
            Ok(Lookup::NotFound) => {
                info!(relation = %relation.name, lookup = %predicate, "Referred to object not found");
                Ok(None)
            }
            Ok(Lookup::Ambiguous) => {
                info!(
                    relation = %relation.name,
                    lookup = %predicate,
                    "Referred to object points to multiple objects"
                );
                Ok(None)
            }
            Err(StorageError::UnknownAttribute { type_tag, attribute }) => {
                warn!(relation = %relation.name, %type_tag, %attribute, "unknown lookup field");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl SyncAction for ModelAction {
    fn action_type(&self) -> ActionType {
        ActionType::None
    }

    fn execute(&self, _store: &mut dyn ObjectStore) -> Result<Option<TargetObject>, EngineError> {
        Ok(None)
    }
}
