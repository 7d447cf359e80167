//! Bulk-write classification.
//!
//! Given the documents currently stored for a batch, each write row is
//! classified as an insert, an update or a conflict. Classification is the
//! optimistic half of the write path: the store still applies every accepted
//! write with a conditional statement, and a write whose condition fails at
//! that point becomes a conflict as well.

use crate::{
    error::Result, ChangeEvent, Document, DocumentId, PrimaryKey, Revision, StoredRow,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Status carried by a write conflict.
pub const CONFLICT_STATUS: u16 = 409;
/// Status carried by a write the backend failed to apply.
pub const UNAVAILABLE_STATUS: u16 = 503;

/// A document to store and the caller's belief of what is stored now.
///
/// `previous: None` means the document is expected not to exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRow {
    pub document: Document,
    #[serde(default)]
    pub previous: Option<Document>,
}

impl WriteRow {
    pub fn insert(document: Document) -> Self {
        Self {
            document,
            previous: None,
        }
    }

    pub fn update(document: Document, previous: Document) -> Self {
        Self {
            document,
            previous: Some(previous),
        }
    }
}

/// The stored state did not match `previous`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteConflict {
    pub status: u16,
    pub document_id: DocumentId,
    pub write_row: WriteRow,
    /// What is actually stored; `None` when nothing is
    pub document_in_db: Option<Document>,
}

impl WriteConflict {
    pub fn new(document_id: DocumentId, write_row: WriteRow, document_in_db: Option<Document>) -> Self {
        Self {
            status: CONFLICT_STATUS,
            document_id,
            write_row,
            document_in_db,
        }
    }
}

/// The backend failed while applying the write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFailure {
    pub status: u16,
    pub document_id: DocumentId,
    pub write_row: WriteRow,
    pub message: String,
}

impl WriteFailure {
    pub fn new(document_id: DocumentId, write_row: WriteRow, message: impl Into<String>) -> Self {
        Self {
            status: UNAVAILABLE_STATUS,
            document_id,
            write_row,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum WriteOutcome {
    #[serde(rename_all = "camelCase")]
    Inserted { document_id: DocumentId },
    #[serde(rename_all = "camelCase")]
    Updated { document_id: DocumentId },
    Conflict(WriteConflict),
    Failed(WriteFailure),
}

impl WriteOutcome {
    pub fn document_id(&self) -> &str {
        match self {
            WriteOutcome::Inserted { document_id } | WriteOutcome::Updated { document_id } => {
                document_id
            }
            WriteOutcome::Conflict(conflict) => &conflict.document_id,
            WriteOutcome::Failed(failure) => &failure.document_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, WriteOutcome::Inserted { .. } | WriteOutcome::Updated { .. })
    }

    pub fn conflict(&self) -> Option<&WriteConflict> {
        match self {
            WriteOutcome::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }
}

/// Outcomes of a bulk write, one per input row, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkWriteResponse {
    pub outcomes: Vec<WriteOutcome>,
}

impl BulkWriteResponse {
    /// Assemble from `(row index, outcome)` pairs.
    pub fn from_indexed(mut outcomes: Vec<(usize, WriteOutcome)>) -> Self {
        outcomes.sort_by_key(|(index, _)| *index);
        Self {
            outcomes: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
        }
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &WriteConflict> {
        self.outcomes.iter().filter_map(WriteOutcome::conflict)
    }

    pub fn failures(&self) -> impl Iterator<Item = &WriteFailure> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            WriteOutcome::Failed(failure) => Some(failure),
            _ => None,
        })
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(WriteOutcome::is_success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
}

/// An accepted write, ready to be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedWrite {
    /// Position in the input batch
    pub index: usize,
    pub kind: WriteKind,
    pub row: StoredRow,
    /// `_rev` the stored document must still carry (updates only)
    pub expected_revision: Option<Revision>,
    /// Stored document at classification time
    pub document_in_db: Option<Document>,
    pub event: Option<ChangeEvent>,
    pub write_row: WriteRow,
}

impl PlannedWrite {
    pub fn outcome(&self) -> WriteOutcome {
        let document_id = self.row.id.clone();
        match self.kind {
            WriteKind::Insert => WriteOutcome::Inserted { document_id },
            WriteKind::Update => WriteOutcome::Updated { document_id },
        }
    }

    pub fn conflict(&self, document_in_db: Option<Document>) -> WriteConflict {
        WriteConflict::new(self.row.id.clone(), self.write_row.clone(), document_in_db)
    }

    pub fn failure(&self, message: impl Into<String>) -> WriteFailure {
        WriteFailure::new(self.row.id.clone(), self.write_row.clone(), message)
    }
}

/// Result of classifying a batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Categorized {
    pub writes: Vec<PlannedWrite>,
    pub conflicts: Vec<(usize, WriteConflict)>,
    pub context: String,
}

/// Storage ids of a batch, in row order, without duplicates.
pub fn document_ids(primary_key: &PrimaryKey, rows: &[WriteRow]) -> Result<Vec<DocumentId>> {
    let mut ids: Vec<DocumentId> = Vec::with_capacity(rows.len());
    for row in rows {
        let id = primary_key.compose(&row.document)?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Classify each row against the stored documents (keyed by storage id,
/// deleted ones included).
pub fn categorize(
    primary_key: &PrimaryKey,
    docs_in_db: &HashMap<DocumentId, Document>,
    rows: Vec<WriteRow>,
    context: impl Into<String>,
) -> Result<Categorized> {
    let mut categorized = Categorized {
        context: context.into(),
        ..Categorized::default()
    };

    for (index, write_row) in rows.into_iter().enumerate() {
        let row = primary_key.row(write_row.document.clone())?;
        let stored = docs_in_db.get(&row.id);

        let accepted = match (stored, write_row.previous.as_ref()) {
            (None, None) => Some(WriteKind::Insert),
            (Some(stored), Some(previous)) if stored.revision() == previous.revision() => {
                Some(WriteKind::Update)
            }
            _ => None,
        };
        let Some(kind) = accepted else {
            let conflict = WriteConflict::new(row.id, write_row, stored.cloned());
            categorized.conflicts.push((index, conflict));
            continue;
        };

        let event = ChangeEvent::for_write(row.id.clone(), &row.data, stored);
        categorized.writes.push(PlannedWrite {
            index,
            kind,
            expected_revision: stored.and_then(|s| s.revision()).map(str::to_string),
            document_in_db: stored.cloned(),
            event,
            row,
            write_row,
        });
    }

    Ok(categorized)
}
