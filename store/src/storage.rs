//! Storage factory: validates schemas and opens storage instances.

use crate::backend::{Backend, MemoryBackend, PgBackend};
use crate::config::{Config, Environment, Settings};
use crate::error::{Result, StoreError};
use crate::instance::StorageInstance;
use pgdoc_engine::{table_name, CollectionSchema};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What the host database passes when it opens a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceParams {
    pub database_name: String,
    pub collection_name: String,
    pub schema: CollectionSchema,
}

impl InstanceParams {
    pub fn new(
        database_name: impl Into<String>,
        collection_name: impl Into<String>,
        schema: CollectionSchema,
    ) -> Self {
        Self {
            database_name: database_name.into(),
            collection_name: collection_name.into(),
            schema,
        }
    }
}

/// Entry point of the store: one per database connection.
#[derive(Debug)]
pub struct Storage<B: Backend = PgBackend> {
    backend: Arc<B>,
    settings: Settings,
}

impl Storage<PgBackend> {
    /// Connect to PostgreSQL at `settings.path`.
    pub async fn connect(settings: Settings, max_connections: u32) -> Result<Self> {
        let backend = PgBackend::connect(&settings.path, max_connections).await?;
        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(backend, settings))
    }

    /// Load [`Config`] from the environment (and `.env`) and connect.
    pub async fn from_env(environment: Environment) -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Config::from_env()?;
        Self::from_config(&config, environment).await
    }

    pub async fn from_config(config: &Config, environment: Environment) -> Result<Self> {
        let settings = Settings::from_config(config).resolve(environment);
        Self::connect(settings, config.max_connections).await
    }
}

impl Storage<MemoryBackend> {
    /// Storage kept entirely in memory.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new(), Settings::new("memory"))
    }
}

impl<B: Backend> Storage<B> {
    /// Wrap a backend. `settings` are used as given.
    pub fn new(backend: B, settings: Settings) -> Self {
        Self {
            backend: Arc::new(backend),
            settings,
        }
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Validate the schema, prepare the collection table and open an instance
    /// on it.
    pub async fn create_storage_instance(&self, params: InstanceParams) -> Result<StorageInstance<B>> {
        params
            .schema
            .validate()
            .map_err(|e| StoreError::SchemaInit(e.to_string()))?;
        let version = params
            .schema
            .version()
            .map_err(|e| StoreError::SchemaInit(e.to_string()))?;
        let table = table_name(&params.database_name, &params.collection_name, version);

        if self.settings.auto_create && !self.settings.read_only {
            self.backend
                .ensure_table(&table)
                .await
                .map_err(|e| StoreError::schema_init(&table, e))?;
            tracing::info!(table = %table, backend = self.name(), "Collection table ready");
        } else {
            let exists = self
                .backend
                .table_exists(&table)
                .await
                .map_err(|e| StoreError::schema_init(&table, e))?;
            if !exists {
                return Err(StoreError::schema_init(&table, "table does not exist"));
            }
        }

        StorageInstance::open(Arc::clone(&self.backend), params, table, &self.settings)
    }
}
