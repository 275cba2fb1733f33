mod crud;
mod model;
mod reference;

pub use crud::{CreateModelAction, DeleteModelAction, UpdateModelAction};
pub use model::ModelAction;
pub use reference::{
    AlignExternalReferenceAction, CreateModelWithReferenceAction, DeleteExternalReferenceAction,
    DeleteIfOnlyReferenceModelAction, UpdateModelWithReferenceAction,
};

use std::fmt;

use recsync_core::object::TargetObject;
use recsync_storage::ObjectStore;

use crate::error::EngineError;

/// The bucket an action is scheduled in by the ordered policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    /// Impotent actions. Never scheduled by the ordered policy.
    None,
    Create,
    Update,
    Delete,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work built from a record, executed once by a policy.
pub trait SyncAction: fmt::Debug {
    fn action_type(&self) -> ActionType;

    /// The affected object, if any. Resolution failures and integrity
    /// conflicts are logged and yield `Ok(None)`.
    fn execute(&self, store: &mut dyn ObjectStore) -> Result<Option<TargetObject>, EngineError>;
}
