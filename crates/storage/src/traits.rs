use recsync_core::{
    ids::*,
    object::TargetObject,
    predicate::Predicate,
    schema::SchemaRegistry,
};

use crate::error::StorageError;

/// Outcome of a single-object lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    /// More than one object satisfied the predicate.
    Ambiguous,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound | Lookup::Ambiguous => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Lookup::Ambiguous)
    }
}

/// One upstream data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSystem {
    pub system_id: ExternalSystemId,
    pub name: String,
    pub description: String,
}

/// (external system, external key) -> target object pointer.
/// The target may have been deleted independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalKeyMapping {
    pub mapping_id: Option<MappingId>,
    pub system_id: ExternalSystemId,
    pub external_key: String,
    pub target: ObjectRef,
}

impl ExternalKeyMapping {
    pub fn new(system_id: ExternalSystemId, external_key: impl Into<String>, target: ObjectRef) -> Self {
        Self {
            mapping_id: None,
            system_id,
            external_key: external_key.into(),
            target,
        }
    }
}

pub trait ObjectStore {
    fn schemas(&self) -> &SchemaRegistry;

    /// The single object of `type_tag` satisfying `predicate`.
    fn get_one(
        &self,
        type_tag: &str,
        predicate: &Predicate,
    ) -> Result<Lookup<TargetObject>, StorageError>;

    fn delete_matching(
        &mut self,
        type_tag: &str,
        predicate: &Predicate,
    ) -> Result<usize, StorageError>;

    /// Insert or update. Assigns an id on first save. Integrity failures are
    /// reported as [`StorageError::IntegrityConflict`] and leave nothing
    /// written.
    fn save(&mut self, object: &mut TargetObject) -> Result<(), StorageError>;

    fn delete_object(&mut self, target: &ObjectRef) -> Result<bool, StorageError>;

    /// Live object behind a generic reference, `None` if it is gone.
    fn resolve(&self, target: &ObjectRef) -> Result<Option<TargetObject>, StorageError>;

    fn count(&self, type_tag: &str) -> Result<u64, StorageError>;

    fn begin(&mut self) -> Result<(), StorageError>;

    fn commit(&mut self) -> Result<(), StorageError>;

    fn rollback(&mut self) -> Result<(), StorageError>;

    fn find_external_system(&self, name: &str) -> Result<Option<ExternalSystem>, StorageError>;

    fn create_external_system(
        &mut self,
        name: &str,
        description: &str,
    ) -> Result<ExternalSystem, StorageError>;

    fn get_mapping(
        &self,
        system_id: ExternalSystemId,
        external_key: &str,
    ) -> Result<Option<ExternalKeyMapping>, StorageError>;

    /// Every mapping, from any system, that points at `target`.
    fn mappings_for_object(
        &self,
        target: &ObjectRef,
    ) -> Result<Vec<ExternalKeyMapping>, StorageError>;

    /// Upsert on (system, key).
    fn save_mapping(&mut self, mapping: &mut ExternalKeyMapping) -> Result<(), StorageError>;

    fn delete_mappings(
        &mut self,
        system_id: ExternalSystemId,
        external_key: &str,
    ) -> Result<usize, StorageError>;

    fn mapping_count(&self) -> Result<u64, StorageError>;
}
