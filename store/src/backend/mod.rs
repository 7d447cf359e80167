//! Storage backends.
//!
//! A backend owns physical tables of `(id, data)` rows. It executes what the
//! engine compiled and reports rows back; all conflict handling and event
//! publication happens above it, in [`StorageInstance`](crate::StorageInstance).

mod memory;
mod postgres;

pub use memory::MemoryBackend;
pub use postgres::PgBackend;

use async_trait::async_trait;
use pgdoc_engine::{CompiledQuery, DocumentId, StoredRow, Timestamp};

/// Backend errors.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Table {0} does not exist")]
    MissingTable(String),

    #[error("Row {id} does not hold a document: {reason}")]
    InvalidRow { id: DocumentId, reason: String },

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Table-level operations a storage instance runs.
///
/// Every method is a single statement against the backend; implementations
/// must make [`insert`](Backend::insert) and [`update`](Backend::update)
/// atomic on their own.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Short backend name, for logs.
    fn name(&self) -> &'static str;

    /// Create the table and its index if missing.
    async fn ensure_table(&self, table: &str) -> BackendResult<()>;

    async fn table_exists(&self, table: &str) -> BackendResult<bool>;

    /// Drop the table if it exists.
    async fn drop_table(&self, table: &str) -> BackendResult<()>;

    /// Rows with the given ids; deleted documents only with `include_deleted`.
    async fn find_by_ids(
        &self,
        table: &str,
        ids: &[DocumentId],
        include_deleted: bool,
    ) -> BackendResult<Vec<StoredRow>>;

    /// Filtered, sorted and paginated rows.
    async fn select(&self, table: &str, query: &CompiledQuery) -> BackendResult<Vec<StoredRow>>;

    /// Number of rows matching the filter.
    async fn count(&self, table: &str, query: &CompiledQuery) -> BackendResult<u64>;

    /// Insert a row unless its id is taken. Returns whether it was stored.
    async fn insert(&self, table: &str, row: &StoredRow) -> BackendResult<bool>;

    /// Replace a row if its stored `_rev` still equals `expected_revision`
    /// (`None`: the stored document has no revision). Returns whether it was
    /// replaced.
    async fn update(
        &self,
        table: &str,
        row: &StoredRow,
        expected_revision: Option<&str>,
    ) -> BackendResult<bool>;

    /// Delete soft-deleted rows whose `_meta.lwt` is at or before the cutoff.
    /// Returns the number of rows removed.
    async fn purge_deleted(&self, table: &str, older_than: Timestamp) -> BackendResult<u64>;
}
