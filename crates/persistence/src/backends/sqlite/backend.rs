//! SQLite backend implementation.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{ConnectionProvider, PooledSqlite, TransactionCoordinator};
use crate::error::{BackendError, StorageError, StorageResult};

/// SQLite backend: a connection pool plus its configuration.
///
/// Cloning is cheap; clones share the pool.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: Pool<SqliteConnectionManager>,
    config: Arc<SqliteBackendConfig>,
    is_memory: bool,
}

impl Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_idle")]
    pub min_idle: u32,

    /// How long to wait for a pooled connection.
    #[serde(
        with = "crate::config::humantime_serde",
        default = "default_connection_timeout"
    )]
    pub connection_timeout: Duration,

    /// SQLite busy timeout.
    #[serde(
        with = "crate::config::humantime_serde",
        default = "default_busy_timeout"
    )]
    pub busy_timeout: Duration,

    /// Maximum lifetime of a pooled connection.
    #[serde(
        with = "crate::config::humantime_serde",
        default = "default_max_lifetime"
    )]
    pub max_lifetime: Duration,

    /// Enable WAL mode for better concurrency.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Enable foreign key constraints.
    #[serde(default = "default_true")]
    pub enable_foreign_keys: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_idle() -> u32 {
    1
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_busy_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_lifetime() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_true() -> bool {
    true
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_idle: default_min_idle(),
            connection_timeout: default_connection_timeout(),
            busy_timeout: default_busy_timeout(),
            max_lifetime: default_max_lifetime(),
            enable_wal: true,
            enable_foreign_keys: true,
        }
    }
}

impl SqliteBackend {
    /// Creates a new in-memory SQLite backend.
    pub fn in_memory() -> StorageResult<Self> {
        Self::with_config(":memory:", SqliteBackendConfig::default())
    }

    /// Opens or creates a file-based SQLite database.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default())
    }

    /// Creates a backend with custom configuration.
    ///
    /// Every SQLite in-memory connection is its own database, so `:memory:`
    /// gets a single-connection pool that never reaps its connection.
    pub fn with_config<P: AsRef<Path>>(path: P, config: SqliteBackendConfig) -> StorageResult<Self> {
        let path_str = path.as_ref().to_string_lossy();
        let is_memory = path_str == ":memory:";

        let busy_timeout = config.busy_timeout;
        let enable_foreign_keys = config.enable_foreign_keys;
        let enable_wal = config.enable_wal && !is_memory;

        let manager = if is_memory {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(path.as_ref())
        };
        let manager = manager.with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            if enable_foreign_keys {
                conn.execute_batch("PRAGMA foreign_keys = ON")?;
            }
            if enable_wal {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                })?;
            }
            Ok(())
        });

        let builder = Pool::builder().connection_timeout(config.connection_timeout);
        let builder = if is_memory {
            builder
                .max_size(1)
                .min_idle(Some(1))
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            builder
                .max_size(config.max_connections)
                .min_idle(Some(config.min_idle))
                .max_lifetime(Some(config.max_lifetime))
        };
        let pool = builder.build(manager)?;

        info!(
            path = %path_str,
            max_connections = pool.max_size(),
            "opened sqlite pool"
        );

        Ok(Self {
            pool,
            config: Arc::new(config),
            is_memory,
        })
    }

    /// Returns a transaction coordinator over this backend.
    pub fn coordinator(&self) -> TransactionCoordinator {
        TransactionCoordinator::new(Arc::new(self.clone()))
    }

    /// Runs `f` on a pooled connection outside any transaction.
    pub(crate) fn with_connection<R>(
        &self,
        f: impl FnOnce(&Connection) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let conn = self.connection()?;
        f(&conn)
    }

    /// Checks that a connection can be acquired and queried.
    pub fn health_check(&self) -> StorageResult<()> {
        let conn = self.pool.get().map_err(|e| {
            StorageError::Backend(BackendError::Unavailable {
                backend_name: "sqlite".to_string(),
                message: e.to_string(),
            })
        })?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }
}

impl ConnectionProvider for SqliteBackend {
    fn connection(&self) -> StorageResult<PooledSqlite> {
        Ok(self.pool.get()?)
    }
}
