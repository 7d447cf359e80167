//! Collection schema: version, primary key and table naming.
//!
//! Field-level validation belongs to the host database; this module only
//! reads what the storage layer needs to lay out and key its rows.

use crate::{error::Result, Document, DocumentId, Error, SchemaVersion, StoredRow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a document's storage id is derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    /// A single string field.
    Field(String),
    /// Several fields joined by a separator; the composed value is kept in `key`.
    #[serde(rename_all = "camelCase")]
    Composite {
        key: String,
        fields: Vec<String>,
        separator: String,
    },
}

impl PrimaryKey {
    /// The field holding the (composed) primary key value.
    pub fn path(&self) -> &str {
        match self {
            PrimaryKey::Field(field) => field,
            PrimaryKey::Composite { key, .. } => key,
        }
    }

    /// Encode the storage id of a document.
    pub fn compose(&self, document: &Document) -> Result<DocumentId> {
        match self {
            PrimaryKey::Field(field) => document
                .get(field)
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .ok_or_else(|| Error::MissingPrimaryKeyValue(field.clone())),
            PrimaryKey::Composite {
                fields, separator, ..
            } => {
                let parts = fields
                    .iter()
                    .map(|field| match document.get(field) {
                        Some(Value::String(s)) => Ok(s.clone()),
                        Some(Value::Number(n)) => Ok(n.to_string()),
                        _ => Err(Error::MissingPrimaryKeyValue(field.clone())),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(parts.join(separator))
            }
        }
    }

    /// Build the stored row for a document.
    pub fn row(&self, document: Document) -> Result<StoredRow> {
        let id = self.compose(&document)?;
        Ok(StoredRow::new(id, document))
    }
}

/// Schema of one collection, as handed over by the host database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSchema {
    /// Schema version; part of the table name
    #[serde(default)]
    pub version: Option<SchemaVersion>,
    /// Primary key definition
    #[serde(default)]
    pub primary_key: Option<PrimaryKey>,
    /// Property definitions, kept opaque
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl CollectionSchema {
    /// Create a schema keyed by a single field.
    pub fn new(version: SchemaVersion, primary_key: impl Into<String>) -> Self {
        Self {
            version: Some(version),
            primary_key: Some(PrimaryKey::Field(primary_key.into())),
            properties: Map::new(),
        }
    }

    pub fn with_primary_key(mut self, primary_key: PrimaryKey) -> Self {
        self.primary_key = Some(primary_key);
        self
    }

    pub fn primary_key(&self) -> Result<&PrimaryKey> {
        self.primary_key.as_ref().ok_or(Error::MissingPrimaryKey)
    }

    pub fn version(&self) -> Result<SchemaVersion> {
        self.version.ok_or(Error::MissingSchemaVersion)
    }

    /// Check that everything the storage layer needs is present.
    pub fn validate(&self) -> Result<()> {
        let primary_key = self.primary_key()?;
        if primary_key.path().is_empty() {
            return Err(Error::MissingPrimaryKey);
        }
        self.version()?;
        Ok(())
    }
}

/// Name of the table holding one collection version:
/// `{database}_{collection}_{version}`.
pub fn table_name(database: &str, collection: &str, version: SchemaVersion) -> String {
    format!("{database}_{collection}_{version}")
}
