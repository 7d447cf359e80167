//! Unified error handling for the store.

use crate::backend::BackendError;
use crate::config::ConfigError;

/// Store error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Schema initialization failed: {0}")]
    SchemaInit(String),

    #[error("Engine error: {0}")]
    Engine(#[from] pgdoc_engine::Error),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("Storage instance is closed")]
    Closed,

    #[error("Storage instance is read-only")]
    ReadOnly,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl StoreError {
    /// Wrap a DDL failure raised while preparing a collection table.
    pub fn schema_init(table: &str, error: impl std::fmt::Display) -> Self {
        StoreError::SchemaInit(format!("table {table}: {error}"))
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
