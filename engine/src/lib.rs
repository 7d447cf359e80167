//! # pgdoc Engine
//!
//! Mango queries compiled to parameterized PostgreSQL `jsonb` filters, and the
//! classification half of a conflict-checked bulk write.
//!
//! This crate is the pure part of the pgdoc document store. It never touches a
//! database: it turns selectors into SQL text plus bound parameters, and it
//! decides what a batch of writes should do given what is currently stored.
//!
//! ## Design Principles
//!
//! - **No IO**: statements are produced as strings; running them is the store's job
//! - **No injection**: operands are always bound parameters, field names are escaped literals
//! - **One semantics**: every compiled filter can also be evaluated in memory with
//!   the result the database would give
//!
//! ## Compiling a query
//!
//! ```rust
//! use pgdoc_engine::{MangoQuery, QuerySpec, Param};
//! use serde_json::json;
//!
//! let query: MangoQuery = serde_json::from_value(json!({
//!     "selector": {"done": false, "priority": {"$gte": 2}},
//!     "sort": [{"priority": "desc"}],
//!     "limit": 10
//! }))
//! .unwrap();
//!
//! let compiled = QuerySpec::from_mango(&query).unwrap().compile();
//! let sql = compiled.select_statement("app_todos_0");
//! assert!(sql.contains("LIMIT 10"));
//! assert_eq!(compiled.params()[1], Param::Float(2.0));
//!
//! assert!(compiled.matches(&json!({"done": false, "priority": 3})));
//! assert!(!compiled.matches(&json!({"done": true, "priority": 3})));
//! ```
//!
//! ## Classifying writes
//!
//! [`categorize`] compares each [`WriteRow`]'s `previous` revision with the
//! stored document and yields [`PlannedWrite`]s (inserts and updates, each
//! with the change event it produces) and [`WriteConflict`]s (status 409).

pub mod document;
pub mod error;
pub mod event;
pub mod json;
pub mod path;
pub mod predicate;
pub mod query;
pub mod schema;
pub mod selector;
pub mod sql;
pub mod write;

// Re-export main types at crate root
pub use document::{
    Document, StoredRow, ATTACHMENTS_FIELD, DELETED_FIELD, LWT_FIELD, META_FIELD, REVISION_FIELD,
};
pub use error::Error;
pub use event::{ChangeEvent, ChangeOperation, Checkpoint, EventBulk};
pub use json::JsonType;
pub use path::FieldPath;
pub use predicate::Predicate;
pub use query::{compile, CompiledQuery, Direction, MangoQuery, QuerySpec, SortTerm};
pub use schema::{table_name, CollectionSchema, PrimaryKey};
pub use selector::{CmpOp, Condition, Selector};
pub use sql::{Param, SqlFragment};
pub use write::{
    categorize, document_ids, BulkWriteResponse, Categorized, PlannedWrite, WriteConflict,
    WriteFailure, WriteKind, WriteOutcome, WriteRow,
};

/// Type aliases for clarity
pub type DocumentId = String;
pub type Revision = String;
/// Milliseconds since the epoch, possibly fractional
pub type Timestamp = f64;
pub type SchemaVersion = u32;
