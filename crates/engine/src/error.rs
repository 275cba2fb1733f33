use recsync_core::CoreError;
use recsync_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("unknown external system: {0:?}")]
    UnknownExternalSystem(String),

    #[error("record is missing required key '{0}'")]
    MissingRecordKey(String),

    #[error("object has not been saved: {0}")]
    Unsaved(String),
}
