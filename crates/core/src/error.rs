use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid intent: {0}")]
    InvalidIntent(String),

    #[error("invalid match specification: {0}")]
    InvalidSelector(String),

    #[error("match field '{0}' is not present in the record fields")]
    MissingMatchField(String),

    #[error("insufficient operands for '{operator}' operator")]
    InsufficientOperands { operator: char },

    #[error("insufficient operators: {remaining} operands left on the stack")]
    InsufficientOperators { remaining: usize },

    #[error("invalid {kind} value for '{field}': {value:?}")]
    InvalidValue {
        field: String,
        kind: &'static str,
        value: String,
    },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("config error: {0}")]
    Config(String),
}
