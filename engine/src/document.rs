//! Documents and stored rows.

use crate::{error::Result, DocumentId, Error, FieldPath, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the soft-delete flag.
pub const DELETED_FIELD: &str = "_deleted";
/// Field holding the revision marker used for optimistic concurrency.
pub const REVISION_FIELD: &str = "_rev";
/// Field holding document metadata (`lwt`, ...).
pub const META_FIELD: &str = "_meta";
/// Key of the last-write time inside [`META_FIELD`].
pub const LWT_FIELD: &str = "lwt";
/// Field holding attachment stubs.
pub const ATTACHMENTS_FIELD: &str = "_attachments";

/// An immutable JSON document.
///
/// Always a JSON object. Metadata lives in the reserved fields `_deleted`,
/// `_rev` and `_meta.lwt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Document(Value);

impl Document {
    /// Wrap a JSON value. Fails unless the value is an object.
    pub fn new(value: Value) -> Result<Self> {
        if value.is_object() {
            Ok(Self(value))
        } else {
            Err(Error::InvalidDocument(format!(
                "expected an object, got {}",
                crate::json::JsonType::of(&value)
            )))
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Field addressed by a path.
    pub fn lookup(&self, path: &FieldPath) -> Option<&Value> {
        path.lookup(&self.0)
    }

    /// The revision marker, if set.
    pub fn revision(&self) -> Option<&str> {
        self.get(REVISION_FIELD).and_then(Value::as_str)
    }

    /// Whether the soft-delete flag is set.
    pub fn is_deleted(&self) -> bool {
        self.get(DELETED_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Last-write time from `_meta.lwt`.
    pub fn last_write_time(&self) -> Option<Timestamp> {
        self.get(META_FIELD)
            .and_then(|meta| meta.get(LWT_FIELD))
            .and_then(Value::as_f64)
    }

    /// The document without its reserved metadata fields.
    pub fn content(&self) -> Map<String, Value> {
        self.0
            .as_object()
            .map(|map| {
                map.iter()
                    .filter(|(key, _)| !is_reserved(key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn is_reserved(field: &str) -> bool {
    matches!(
        field,
        DELETED_FIELD | REVISION_FIELD | META_FIELD | ATTACHMENTS_FIELD
    )
}

impl TryFrom<Value> for Document {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Document::new(value)
    }
}

impl From<Document> for Value {
    fn from(document: Document) -> Self {
        document.0
    }
}

/// A row of a collection table: the storage key and the full document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRow {
    /// Primary key encoded from `data`
    pub id: DocumentId,
    /// The document, metadata included
    pub data: Document,
}

impl StoredRow {
    pub fn new(id: impl Into<DocumentId>, data: Document) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_non_objects() {
        assert!(Document::new(json!([1, 2])).is_err());
        assert!(Document::new(json!("x")).is_err());
        assert!(Document::new(json!({})).is_ok());
    }

    #[test]
    fn metadata_accessors() {
        let doc = Document::new(json!({
            "id": "t1",
            "_deleted": true,
            "_rev": "2-abc",
            "_meta": {"lwt": 1700000000000.5}
        }))
        .unwrap();

        assert!(doc.is_deleted());
        assert_eq!(doc.revision(), Some("2-abc"));
        assert_eq!(doc.last_write_time(), Some(1700000000000.5));
    }

    #[test]
    fn content_strips_metadata() {
        let doc = Document::new(json!({
            "id": "t1",
            "done": false,
            "_deleted": false,
            "_rev": "1-a",
            "_meta": {"lwt": 1},
            "_attachments": {}
        }))
        .unwrap();

        let content = doc.content();
        assert_eq!(content.len(), 2);
        assert_eq!(content["done"], json!(false));
    }

    #[test]
    fn serialization_roundtrip() {
        let doc = Document::new(json!({"id": "a", "n": 1})).unwrap();
        let text = serde_json::to_string(&doc).unwrap();
        let parsed: Document = serde_json::from_str(&text).unwrap();
        assert_eq!(doc, parsed);

        let bad: std::result::Result<Document, _> = serde_json::from_str("[1]");
        assert!(bad.is_err());
    }
}
