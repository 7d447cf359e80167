//! Shared helpers for store integration tests.

#![allow(dead_code)]

use pgdoc_engine::{CollectionSchema, Document, WriteRow};
use pgdoc_store::{Backend, InstanceParams, Storage, StorageInstance};
use serde_json::{json, Value};
use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static TRACING: Once = Once::new();

/// Install a test subscriber once; filter with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "pgdoc_store=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init()
            .ok();
    });
}

pub fn doc(value: Value) -> Document {
    Document::new(value).unwrap()
}

/// A todo document at revision `rev`, written at `lwt`.
pub fn todo(id: &str, title: &str, done: bool, rev: &str, lwt: f64) -> Document {
    doc(json!({
        "id": id,
        "title": title,
        "done": done,
        "_rev": rev,
        "_deleted": false,
        "_meta": {"lwt": lwt}
    }))
}

/// The same document marked deleted at a new revision.
pub fn deleted(document: &Document, rev: &str, lwt: f64) -> Document {
    let mut value = document.as_value().clone();
    value["_deleted"] = json!(true);
    value["_rev"] = json!(rev);
    value["_meta"] = json!({"lwt": lwt});
    doc(value)
}

pub fn insert(document: Document) -> WriteRow {
    WriteRow::insert(document)
}

pub fn todo_params(database: &str) -> InstanceParams {
    InstanceParams::new(database, "todos", CollectionSchema::new(0, "id"))
}

pub async fn open_todos<B: Backend>(storage: &Storage<B>, database: &str) -> StorageInstance<B> {
    init_tracing();
    storage
        .create_storage_instance(todo_params(database))
        .await
        .unwrap()
}

pub fn ids(documents: &[Document]) -> Vec<String> {
    documents
        .iter()
        .map(|d| d.get("id").and_then(Value::as_str).unwrap_or_default().to_string())
        .collect()
}
