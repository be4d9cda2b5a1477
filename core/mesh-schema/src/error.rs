use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("{path}: expected {expected}, got {got}")]
    TypeMismatch {
        path: String,
        expected: String,
        got: String,
    },

    #[error("{path}: required field is missing")]
    MissingRequired { path: String },

    #[error("{path}: {reason}")]
    Custom { path: String, reason: String },
}
