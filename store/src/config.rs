//! Configuration management for the store.
//!
//! [`Config`] is read from environment variables once; [`Settings`] is the
//! resolved, explicit form handed to a [`Storage`](crate::Storage).

use std::env;

/// Default location of the database when none is configured.
pub const DEFAULT_PATH: &str = "./db.pgdoc";
/// Prefix marking an IndexedDB-backed database path.
pub const IDB_PREFIX: &str = "idb://";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_CHANGE_BUFFER: usize = 256;

/// Store configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Pool size
    pub max_connections: u32,
    /// Capacity of each change stream channel
    pub change_buffer: usize,
    /// Keep the configured path as is
    pub disable_normalize_path: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let max_connections = match env::var("PGDOC_MAX_CONNECTIONS") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidMaxConnections(value))?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };

        let change_buffer = match env::var("PGDOC_CHANGE_BUFFER") {
            Ok(value) => match value.parse() {
                Ok(0) | Err(_) => return Err(ConfigError::InvalidChangeBuffer(value)),
                Ok(size) => size,
            },
            Err(_) => DEFAULT_CHANGE_BUFFER,
        };

        let disable_normalize_path = env::var("PGDOC_DISABLE_NORMALIZE_PATH")
            .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            max_connections,
            change_buffer,
            disable_normalize_path,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PGDOC_MAX_CONNECTIONS value: {0}")]
    InvalidMaxConnections(String),

    #[error("Invalid PGDOC_CHANGE_BUFFER value: {0}")]
    InvalidChangeBuffer(String),
}

/// Where the store runs. Decides how a bare database path is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Native,
    Browser {
        indexed_db: bool,
    },
}

/// Prefix a path with `idb://` when running in a browser that has IndexedDB.
/// Anything that already carries a URL scheme, such as a `postgres://`
/// connection string, is left alone.
pub fn normalize_path(path: &str, environment: Environment) -> String {
    match environment {
        Environment::Browser { indexed_db: true } if !path.contains("://") => {
            format!("{IDB_PREFIX}{path}")
        }
        _ => path.to_string(),
    }
}

/// Resolved storage settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Database path or connection URL
    pub path: String,
    /// Create collection tables that do not exist yet
    pub auto_create: bool,
    /// Reject writes and DDL
    pub read_only: bool,
    pub disable_normalize_path: bool,
    pub change_buffer: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(DEFAULT_PATH)
    }
}

impl Settings {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            auto_create: true,
            read_only: false,
            disable_normalize_path: false,
            change_buffer: DEFAULT_CHANGE_BUFFER,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            disable_normalize_path: config.disable_normalize_path,
            change_buffer: config.change_buffer,
            ..Self::new(config.database_url.clone())
        }
    }

    pub fn auto_create(mut self, auto_create: bool) -> Self {
        self.auto_create = auto_create;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn disable_normalize_path(mut self, disable: bool) -> Self {
        self.disable_normalize_path = disable;
        self
    }

    pub fn change_buffer(mut self, size: usize) -> Self {
        self.change_buffer = size.max(1);
        self
    }

    /// Apply path normalization for the given environment, unless disabled.
    pub fn resolve(mut self, environment: Environment) -> Self {
        if !self.disable_normalize_path {
            self.path = normalize_path(&self.path, environment);
        }
        self
    }
}
