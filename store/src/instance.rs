//! Storage instance: one collection table and its change stream.
//!
//! ```text
//! Open ──(bulk_write | query | count | find | cleanup)*──> close() ──> Closed
//!   └──────────────────────── remove() ───────────────────────────────┘
//! ```
//!
//! Writes are checked twice: once against a batched lookup of the stored
//! documents (classification), and again by the conditional statement that
//! applies each accepted row. No lock is held in between; a row that loses a
//! race at the second check is reported as a conflict carrying the document
//! that won.

use crate::backend::Backend;
use crate::changes::{ChangeFeed, ChangeStream};
use crate::config::Settings;
use crate::error::{Result, StoreError};
use crate::storage::InstanceParams;
use pgdoc_engine::{
    categorize, document_ids, BulkWriteResponse, CollectionSchema, Document, DocumentId,
    EventBulk, MangoQuery, PlannedWrite, PrimaryKey, QuerySpec, Timestamp, WriteKind,
    WriteConflict, WriteOutcome, WriteRow,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Documents returned by a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountMode {
    /// Counted by the backend without loading documents
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResult {
    pub count: u64,
    pub mode: CountMode,
}

/// An open collection.
pub struct StorageInstance<B: Backend> {
    backend: Arc<B>,
    database_name: String,
    collection_name: String,
    schema: CollectionSchema,
    primary_key: PrimaryKey,
    table: String,
    read_only: bool,
    feed: ChangeFeed,
    closed: AtomicBool,
    /// Serializes `remove` and `close`
    lifecycle: tokio::sync::Mutex<()>,
}

impl<B: Backend> std::fmt::Debug for StorageInstance<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageInstance")
            .field("backend", &self.backend.name())
            .field("table", &self.table)
            .field("read_only", &self.read_only)
            .field("closed", &self.is_closed())
            .field("subscribers", &self.feed.subscriber_count())
            .finish()
    }
}

impl<B: Backend> StorageInstance<B> {
    pub(crate) fn open(
        backend: Arc<B>,
        params: InstanceParams,
        table: String,
        settings: &Settings,
    ) -> Result<Self> {
        let primary_key = params.schema.primary_key()?.clone();
        Ok(Self {
            backend,
            database_name: params.database_name,
            collection_name: params.collection_name,
            schema: params.schema,
            primary_key,
            table,
            read_only: settings.read_only,
            feed: ChangeFeed::new(settings.change_buffer),
            closed: AtomicBool::new(false),
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub fn primary_key(&self) -> &PrimaryKey {
        &self.primary_key
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    /// Insert or update a batch of documents.
    ///
    /// Returns one outcome per row, in input order. Conflicts and per-row
    /// backend failures are outcomes, not errors; the call itself only fails
    /// when the batch cannot be classified (bad primary key, lookup failure).
    pub async fn bulk_write(&self, rows: Vec<WriteRow>, context: &str) -> Result<BulkWriteResponse> {
        self.ensure_writable()?;
        if rows.is_empty() {
            return Ok(BulkWriteResponse::default());
        }

        let ids = document_ids(&self.primary_key, &rows)?;
        let docs_in_db: HashMap<DocumentId, Document> = self
            .backend
            .find_by_ids(&self.table, &ids, true)
            .await
            .inspect_err(|e| tracing::error!(table = %self.table, error = %e, "Bulk write lookup failed"))?
            .into_iter()
            .map(|row| (row.id, row.data))
            .collect();

        let categorized = categorize(&self.primary_key, &docs_in_db, rows, context)?;
        let mut outcomes = Vec::with_capacity(categorized.writes.len() + categorized.conflicts.len());
        let mut applied_ids = HashSet::new();

        let mut events = Vec::new();
        for write in categorized.writes {
            let applied = match write.kind {
                WriteKind::Insert => self.backend.insert(&self.table, &write.row).await,
                WriteKind::Update => {
                    self.backend
                        .update(&self.table, &write.row, write.expected_revision.as_deref())
                        .await
                }
            };

            match applied {
                Ok(true) => {
                    applied_ids.insert(write.row.id.clone());
                    outcomes.push((write.index, write.outcome()));
                    events.extend(write.event);
                }
                Ok(false) => {
                    let current = self.reread(&write).await;
                    tracing::warn!(
                        table = %self.table,
                        document_id = %write.row.id,
                        "Write conflict: row changed before it could be applied"
                    );
                    outcomes.push((write.index, WriteOutcome::Conflict(write.conflict(current))));
                }
                Err(e) => {
                    tracing::error!(
                        table = %self.table,
                        document_id = %write.row.id,
                        error = %e,
                        "Failed to apply write"
                    );
                    outcomes.push((write.index, WriteOutcome::Failed(write.failure(e.to_string()))));
                }
            }
        }

        let mut conflicts = categorized.conflicts;
        self.refresh_conflicts(&mut conflicts, &applied_ids).await;
        for (index, conflict) in conflicts {
            tracing::warn!(
                table = %self.table,
                document_id = %conflict.document_id,
                "Write conflict: stored revision differs from previous"
            );
            outcomes.push((index, WriteOutcome::Conflict(conflict)));
        }

        if !events.is_empty() {
            let bulk = EventBulk::new(uuid::Uuid::new_v4().to_string(), events, categorized.context);
            let event_count = bulk.len();
            let receivers = self.feed.publish(bulk);
            tracing::debug!(table = %self.table, event_count, receivers, "Published change batch");
        }

        Ok(BulkWriteResponse::from_indexed(outcomes))
    }

    /// Conflicts are classified against the state before the batch. Where
    /// another row of the same batch has since written that id, attach what
    /// is stored now.
    async fn refresh_conflicts(
        &self,
        conflicts: &mut [(usize, WriteConflict)],
        applied_ids: &HashSet<DocumentId>,
    ) {
        let mut stale: Vec<DocumentId> = conflicts
            .iter()
            .map(|(_, conflict)| &conflict.document_id)
            .filter(|id| applied_ids.contains(*id))
            .cloned()
            .collect();
        if stale.is_empty() {
            return;
        }
        stale.sort();
        stale.dedup();

        let current: HashMap<DocumentId, Document> =
            match self.backend.find_by_ids(&self.table, &stale, true).await {
                Ok(rows) => rows.into_iter().map(|row| (row.id, row.data)).collect(),
                Err(e) => {
                    tracing::error!(table = %self.table, error = %e, "Conflict re-read failed");
                    return;
                }
            };
        for (_, conflict) in conflicts.iter_mut() {
            if applied_ids.contains(&conflict.document_id) {
                conflict.document_in_db = current.get(&conflict.document_id).cloned();
            }
        }
    }

    /// Current stored state of a row whose conditional write failed. Falls
    /// back to the state seen at classification if the lookup fails.
    async fn reread(&self, write: &PlannedWrite) -> Option<Document> {
        let ids = [write.row.id.clone()];
        match self.backend.find_by_ids(&self.table, &ids, true).await {
            Ok(rows) => rows.into_iter().next().map(|row| row.data),
            Err(e) => {
                tracing::error!(
                    table = %self.table,
                    document_id = %write.row.id,
                    error = %e,
                    "Conflict re-read failed"
                );
                write.document_in_db.clone()
            }
        }
    }

    /// Documents by storage id. Deleted documents only with `with_deleted`.
    pub async fn find_documents_by_id(
        &self,
        ids: &[DocumentId],
        with_deleted: bool,
    ) -> Result<Vec<Document>> {
        self.ensure_open()?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .backend
            .find_by_ids(&self.table, ids, with_deleted)
            .await?;
        Ok(rows.into_iter().map(|row| row.data).collect())
    }

    pub async fn query(&self, spec: &QuerySpec) -> Result<QueryResult> {
        self.ensure_open()?;
        if !spec.dropped_sort.is_empty() {
            tracing::warn!(
                table = %self.table,
                dropped = ?spec.dropped_sort,
                "Ignoring sort terms without a valid direction"
            );
        }

        let compiled = spec.compile();
        if compiled.predicate.is_always_false() {
            return Ok(QueryResult::default());
        }
        let rows = self.backend.select(&self.table, &compiled).await?;
        Ok(QueryResult {
            documents: rows.into_iter().map(|row| row.data).collect(),
        })
    }

    /// Parse a Mango query object and run it.
    pub async fn query_mango(&self, query: &MangoQuery) -> Result<QueryResult> {
        let spec = QuerySpec::from_mango(query)?;
        self.query(&spec).await
    }

    /// Number of matching documents; sort and pagination are ignored.
    pub async fn count(&self, spec: &QuerySpec) -> Result<CountResult> {
        self.ensure_open()?;
        let compiled = spec.compile();
        let count = if compiled.predicate.is_always_false() {
            0
        } else {
            self.backend.count(&self.table, &compiled).await?
        };
        Ok(CountResult {
            count,
            mode: CountMode::Fast,
        })
    }

    /// Physically delete documents flagged deleted with `_meta.lwt` at or
    /// before `older_than`. Returns whether anything was removed.
    pub async fn cleanup(&self, older_than: Timestamp) -> Result<bool> {
        self.ensure_writable()?;
        let removed = self
            .backend
            .purge_deleted(&self.table, older_than)
            .await?;
        tracing::info!(table = %self.table, removed, older_than, "Purged deleted documents");
        Ok(removed > 0)
    }

    pub async fn get_attachment_data(
        &self,
        _document_id: &str,
        _attachment_id: &str,
        _digest: &str,
    ) -> Result<String> {
        Err(StoreError::UnsupportedOperation(
            "attachments are not stored by this backend",
        ))
    }

    /// Subscribe to change batches published by later bulk writes.
    pub fn change_stream(&self) -> Result<ChangeStream> {
        self.ensure_open()?;
        self.feed.subscribe().ok_or(StoreError::Closed)
    }

    /// Drop the collection table. The instance is closed afterwards.
    pub async fn remove(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.ensure_writable()?;

        self.backend.drop_table(&self.table).await?;
        self.closed.store(true, Ordering::SeqCst);
        self.feed.close();
        tracing::info!(table = %self.table, "Collection table removed");
        Ok(())
    }

    /// Close the change stream. Waits for a running [`remove`](Self::remove);
    /// calling it again does nothing.
    pub async fn close(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        if self.feed.close() {
            tracing::debug!(table = %self.table, "Storage instance closed");
        }
        Ok(())
    }
}
