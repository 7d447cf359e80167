//! Change events published after a bulk write.

use crate::{Document, DocumentId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

/// One applied write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub operation: ChangeOperation,
    pub document_id: DocumentId,
    /// Document as stored after the write
    pub document_data: Document,
    /// Document as stored before the write, if there was one
    pub previous_document_data: Option<Document>,
}

impl ChangeEvent {
    /// Classify a write by how it changes the deleted flag.
    ///
    /// Returns `None` for a write that stores an already deleted document
    /// where none existed: nothing observable changed.
    pub fn for_write(
        document_id: DocumentId,
        document: &Document,
        previous: Option<&Document>,
    ) -> Option<Self> {
        let operation = match previous {
            None if document.is_deleted() => return None,
            None => ChangeOperation::Insert,
            Some(previous) => match (previous.is_deleted(), document.is_deleted()) {
                (false, true) => ChangeOperation::Delete,
                (true, false) => ChangeOperation::Insert,
                _ => ChangeOperation::Update,
            },
        };
        Some(Self {
            operation,
            document_id,
            document_data: document.clone(),
            previous_document_data: previous.cloned(),
        })
    }
}

/// Resume position in the change history: the id and last-write time of the
/// newest document seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: DocumentId,
    pub lwt: Timestamp,
}

impl Checkpoint {
    /// Checkpoint of the document with the greatest `_meta.lwt`. On equal
    /// times the later document wins. Documents without a time are skipped.
    pub fn newest<'a>(documents: impl IntoIterator<Item = (&'a str, &'a Document)>) -> Option<Self> {
        documents
            .into_iter()
            .filter_map(|(id, document)| document.last_write_time().map(|lwt| (id, lwt)))
            .fold(None, |newest: Option<(&str, Timestamp)>, (id, lwt)| match newest {
                Some((_, best)) if best > lwt => newest,
                _ => Some((id, lwt)),
            })
            .map(|(id, lwt)| Checkpoint {
                id: id.to_string(),
                lwt,
            })
    }
}

/// Batch of events from one bulk write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBulk {
    /// Unique per batch
    pub id: String,
    pub events: Vec<ChangeEvent>,
    pub checkpoint: Option<Checkpoint>,
    /// Caller-supplied label of the write
    pub context: String,
}

impl EventBulk {
    /// Build a batch; the checkpoint is derived from the events' documents.
    pub fn new(id: impl Into<String>, events: Vec<ChangeEvent>, context: impl Into<String>) -> Self {
        let checkpoint = Checkpoint::newest(
            events
                .iter()
                .map(|event| (event.document_id.as_str(), &event.document_data)),
        );
        Self {
            id: id.into(),
            events,
            checkpoint,
            context: context.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
