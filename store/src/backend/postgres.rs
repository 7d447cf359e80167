//! PostgreSQL backend.
//!
//! Each collection version gets its own table:
//!
//! ```sql
//! CREATE TABLE "{table}" (id TEXT PRIMARY KEY, data JSONB NOT NULL DEFAULT '{}'::jsonb);
//! CREATE INDEX "{table}_data_idx" ON "{table}" USING GIN (data);
//! ```

use super::{Backend, BackendError, BackendResult};
use async_trait::async_trait;
use pgdoc_engine::{
    sql::{quote_ident, Param},
    CompiledQuery, Document, DocumentId, StoredRow, Timestamp,
};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::QueryAs;
use sqlx::{PgPool, Postgres, Row};

/// A raw `(id, data)` row.
#[derive(Debug)]
struct RowRecord {
    id: String,
    data: serde_json::Value,
}

impl<'r> sqlx::FromRow<'r, PgRow> for RowRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RowRecord {
            id: row.try_get("id")?,
            data: row.try_get("data")?,
        })
    }
}

impl TryFrom<RowRecord> for StoredRow {
    type Error = BackendError;

    fn try_from(record: RowRecord) -> BackendResult<Self> {
        let data = Document::new(record.data).map_err(|e| BackendError::InvalidRow {
            id: record.id.clone(),
            reason: e.to_string(),
        })?;
        Ok(StoredRow::new(record.id, data))
    }
}

fn into_rows(records: Vec<RowRecord>) -> BackendResult<Vec<StoredRow>> {
    records.into_iter().map(StoredRow::try_from).collect()
}

/// Bind compiled filter parameters in placeholder order.
fn bind_params<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    params: &'q [Param],
) -> QueryAs<'q, Postgres, O, PgArguments> {
    for param in params {
        query = match param {
            Param::Text(value) => query.bind(value.as_str()),
            Param::Float(value) => query.bind(*value),
            Param::Json(value) => query.bind(value),
        };
    }
    query
}

/// Backend over a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    /// Connect a new pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> BackendResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Backend for PgBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn ensure_table(&self, table: &str) -> BackendResult<()> {
        let create = format!(
            "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, data JSONB NOT NULL DEFAULT '{{}}'::jsonb)",
            quote_ident(table)
        );
        let index = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING GIN (data)",
            quote_ident(&format!("{table}_data_idx")),
            quote_ident(table)
        );

        sqlx::query(&create).execute(&self.pool).await?;
        sqlx::query(&index).execute(&self.pool).await?;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> BackendResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(quote_ident(table))
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn drop_table(&self, table: &str) -> BackendResult<()> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_by_ids(
        &self,
        table: &str,
        ids: &[DocumentId],
        include_deleted: bool,
    ) -> BackendResult<Vec<StoredRow>> {
        let mut sql = format!(
            "SELECT id, data FROM {} WHERE id = ANY($1)",
            quote_ident(table)
        );
        if !include_deleted {
            sql.push_str(" AND (data -> '_deleted') IS DISTINCT FROM 'true'::jsonb");
        }

        let records = sqlx::query_as::<_, RowRecord>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        into_rows(records)
    }

    async fn select(&self, table: &str, query: &CompiledQuery) -> BackendResult<Vec<StoredRow>> {
        let sql = query.select_statement(table);
        tracing::debug!(table = %table, sql = %sql, params = query.params().len(), "Running query");

        let records = bind_params(sqlx::query_as::<_, RowRecord>(&sql), query.params())
            .fetch_all(&self.pool)
            .await?;
        into_rows(records)
    }

    async fn count(&self, table: &str, query: &CompiledQuery) -> BackendResult<u64> {
        let sql = query.count_statement(table);
        tracing::debug!(table = %table, sql = %sql, "Running count");

        let (count,): (i64,) = bind_params(sqlx::query_as(&sql), query.params())
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn insert(&self, table: &str, row: &StoredRow) -> BackendResult<bool> {
        let sql = format!(
            "INSERT INTO {} (id, data) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
            quote_ident(table)
        );
        let result = sqlx::query(&sql)
            .bind(&row.id)
            .bind(row.data.as_value())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update(
        &self,
        table: &str,
        row: &StoredRow,
        expected_revision: Option<&str>,
    ) -> BackendResult<bool> {
        let sql = format!(
            "UPDATE {} SET data = $2 WHERE id = $1 AND (data ->> '_rev') IS NOT DISTINCT FROM $3::text",
            quote_ident(table)
        );
        let result = sqlx::query(&sql)
            .bind(&row.id)
            .bind(row.data.as_value())
            .bind(expected_revision)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn purge_deleted(&self, table: &str, older_than: Timestamp) -> BackendResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE (data -> '_deleted') = 'true'::jsonb \
             AND (CASE WHEN jsonb_typeof(data #> '{{_meta,lwt}}') = 'number' \
             THEN (data #>> '{{_meta,lwt}}')::float8 <= $1 ELSE FALSE END)",
            quote_ident(table)
        );
        let result = sqlx::query(&sql)
            .bind(older_than)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
