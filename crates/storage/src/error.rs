use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("integrity conflict: {0}")]
    IntegrityConflict(String),

    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("unknown attribute '{attribute}' on {type_tag}")]
    UnknownAttribute { type_tag: String, attribute: String },

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("core error: {0}")]
    Core(#[from] recsync_core::CoreError),
}

impl StorageError {
    pub fn is_integrity_conflict(&self) -> bool {
        matches!(self, StorageError::IntegrityConflict(_))
    }
}
