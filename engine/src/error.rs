//! Error types for the pgdoc engine.

use thiserror::Error;

/// All possible errors from the pgdoc engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Compiler errors
    #[error("unsupported operator '{operator}' on field '{field}'")]
    UnsupportedOperator { operator: String, field: String },

    #[error("invalid operand for '{operator}' on field '{field}': {reason}")]
    InvalidOperand {
        operator: String,
        field: String,
        reason: String,
    },

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("invalid field path '{0}'")]
    InvalidFieldPath(String),

    // Schema errors
    #[error("schema has no primary key")]
    MissingPrimaryKey,

    #[error("schema has no numeric version")]
    MissingSchemaVersion,

    // Document errors
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("document has no usable primary key field '{0}'")]
    MissingPrimaryKeyValue(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
