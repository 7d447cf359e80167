//! # pgdoc Store
//!
//! Document storage over PostgreSQL `jsonb` tables, one table per collection
//! version, with Mango queries compiled by [`pgdoc_engine`] and bulk writes
//! checked for conflicts against each document's `_rev`.
//!
//! ```no_run
//! use pgdoc_store::{Environment, InstanceParams, Storage};
//! use pgdoc_engine::{CollectionSchema, Document, QuerySpec, WriteRow};
//! use serde_json::json;
//!
//! # async fn run() -> pgdoc_store::Result<()> {
//! let storage = Storage::from_env(Environment::Native).await?;
//! let todos = storage
//!     .create_storage_instance(InstanceParams::new("app", "todos", CollectionSchema::new(0, "id")))
//!     .await?;
//!
//! let doc = Document::new(json!({"id": "t1", "done": false, "_rev": "1-a"}))?;
//! todos.bulk_write(vec![WriteRow::insert(doc)], "create").await?;
//!
//! let open = todos.query(&QuerySpec::parse(&json!({"done": false}))?).await?;
//! assert_eq!(open.documents.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod changes;
pub mod config;
pub mod error;
pub mod instance;
pub mod storage;

pub use backend::{Backend, BackendError, MemoryBackend, PgBackend};
pub use changes::{ChangeFeed, ChangeStream};
pub use config::{normalize_path, Config, ConfigError, Environment, Settings};
pub use error::{Result, StoreError};
pub use instance::{CountMode, CountResult, QueryResult, StorageInstance};
pub use storage::{InstanceParams, Storage};
