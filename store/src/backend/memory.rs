//! In-process backend.
//!
//! Tables are kept in a [`DashMap`]; filters run through the compiled
//! predicate, so results match what the PostgreSQL backend returns for the
//! same query. Unsorted results come back in insertion order. Sorting on
//! string fields matches PostgreSQL under the `C` collation only; see
//! [`pgdoc_engine::json::jsonb_cmp`].

use super::{Backend, BackendError, BackendResult};
use async_trait::async_trait;
use dashmap::DashMap;
use pgdoc_engine::{CompiledQuery, Document, DocumentId, StoredRow, Timestamp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
struct MemoryRow {
    /// Insertion sequence; kept across updates
    seq: u64,
    data: Document,
}

#[derive(Debug, Default)]
struct MemoryTable {
    next_seq: u64,
    rows: HashMap<DocumentId, MemoryRow>,
}

impl MemoryTable {
    /// Rows in insertion order.
    fn ordered(&self) -> Vec<StoredRow> {
        let mut rows: Vec<(&DocumentId, &MemoryRow)> = self.rows.iter().collect();
        rows.sort_by_key(|(_, row)| row.seq);
        rows.into_iter()
            .map(|(id, row)| StoredRow::new(id.clone(), row.data.clone()))
            .collect()
    }
}

/// Backend keeping every table in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: DashMap<String, MemoryTable>,
    failing_writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` inserts/updates fail with
    /// [`BackendError::Unavailable`].
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of rows in a table, deleted ones included.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.rows.len()).unwrap_or(0)
    }

    fn injected_failure(&self) -> BackendResult<()> {
        let previous = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match previous {
            Ok(_) => Err(BackendError::Unavailable("injected write failure".into())),
            Err(_) => Ok(()),
        }
    }

    fn missing(table: &str) -> BackendError {
        BackendError::MissingTable(table.to_string())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ensure_table(&self, table: &str) -> BackendResult<()> {
        self.tables.entry(table.to_string()).or_default();
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> BackendResult<bool> {
        Ok(self.tables.contains_key(table))
    }

    async fn drop_table(&self, table: &str) -> BackendResult<()> {
        self.tables.remove(table);
        Ok(())
    }

    async fn find_by_ids(
        &self,
        table: &str,
        ids: &[DocumentId],
        include_deleted: bool,
    ) -> BackendResult<Vec<StoredRow>> {
        let table = self.tables.get(table).ok_or_else(|| Self::missing(table))?;
        let mut seen = Vec::new();
        Ok(ids
            .iter()
            .filter(|id| {
                let fresh = !seen.contains(id);
                seen.push(*id);
                fresh
            })
            .filter_map(|id| table.rows.get(id).map(|row| (id, row)))
            .filter(|(_, row)| include_deleted || !row.data.is_deleted())
            .map(|(id, row)| StoredRow::new(id.clone(), row.data.clone()))
            .collect())
    }

    async fn select(&self, table: &str, query: &CompiledQuery) -> BackendResult<Vec<StoredRow>> {
        let table = self.tables.get(table).ok_or_else(|| Self::missing(table))?;
        let mut rows: Vec<StoredRow> = table
            .ordered()
            .into_iter()
            .filter(|row| query.matches(row.data.as_value()))
            .collect();
        if query.is_sorted() {
            rows.sort_by(|a, b| query.compare(a, b));
        }
        Ok(query.paginate(rows))
    }

    async fn count(&self, table: &str, query: &CompiledQuery) -> BackendResult<u64> {
        let table = self.tables.get(table).ok_or_else(|| Self::missing(table))?;
        let count = table
            .rows
            .values()
            .filter(|row| query.matches(row.data.as_value()))
            .count();
        Ok(count as u64)
    }

    async fn insert(&self, table: &str, row: &StoredRow) -> BackendResult<bool> {
        self.injected_failure()?;
        let mut table = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Self::missing(table))?;
        if table.rows.contains_key(&row.id) {
            return Ok(false);
        }
        let seq = table.next_seq;
        table.next_seq += 1;
        table.rows.insert(
            row.id.clone(),
            MemoryRow {
                seq,
                data: row.data.clone(),
            },
        );
        Ok(true)
    }

    async fn update(
        &self,
        table: &str,
        row: &StoredRow,
        expected_revision: Option<&str>,
    ) -> BackendResult<bool> {
        self.injected_failure()?;
        let mut table = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Self::missing(table))?;
        match table.rows.get_mut(&row.id) {
            Some(stored) if stored.data.revision() == expected_revision => {
                stored.data = row.data.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_deleted(&self, table: &str, older_than: Timestamp) -> BackendResult<u64> {
        let mut table = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Self::missing(table))?;
        let before = table.rows.len();
        table.rows.retain(|_, row| {
            let expired = row.data.is_deleted()
                && row
                    .data
                    .last_write_time()
                    .is_some_and(|lwt| lwt <= older_than);
            !expired
        });
        Ok((before - table.rows.len()) as u64)
    }
}
