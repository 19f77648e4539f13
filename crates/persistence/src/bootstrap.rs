//! Process startup helpers.
//!
//! Failing to reach the database or the cache while starting up is fatal:
//! the `*_or_exit` functions log the error and terminate the process. Once
//! running, every failure is returned to the caller instead.

use std::time::Duration;

use tracing::{error, info};

use crate::backends::sqlite::SqliteBackend;
use crate::cache::CacheBackend;
use crate::config::StoreConfig;
use crate::error::{CacheError, StorageResult};

/// How long [`ping_cache_or_exit`] callers usually wait.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Initializes the tracing subscriber for logging.
///
/// This should be called once at application startup. `RUST_LOG` takes
/// precedence over `level`.
///
/// # Arguments
///
/// * `level` - The log level (error, warn, info, debug, trace)
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tessera_persistence={}", level)));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Opens the configured database and checks that it answers.
pub fn open_backend(config: &StoreConfig) -> StorageResult<SqliteBackend> {
    config.validate()?;
    let backend = SqliteBackend::with_config(config.database.path(), config.database.pool.clone())?;
    backend.health_check()?;
    info!(url = %config.database.url, "database ready");
    Ok(backend)
}

/// Like [`open_backend`], but exits the process on failure.
pub fn open_backend_or_exit(config: &StoreConfig) -> SqliteBackend {
    match open_backend(config) {
        Ok(backend) => backend,
        Err(e) => {
            error!(url = %config.database.url, error = %e, "failed to open database");
            std::process::exit(1);
        }
    }
}

/// Pings the cache, failing if it does not answer within `timeout`.
pub async fn ping_cache(cache: &dyn CacheBackend, timeout: Duration) -> StorageResult<()> {
    match tokio::time::timeout(timeout, cache.ping()).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::Unavailable {
            message: format!("ping timed out after {}", humantime::format_duration(timeout)),
        }
        .into()),
    }
}

/// Like [`ping_cache`], but exits the process on failure.
pub async fn ping_cache_or_exit(cache: &dyn CacheBackend, timeout: Duration) {
    if let Err(e) = ping_cache(cache, timeout).await {
        error!(error = %e, "failed to reach cache");
        std::process::exit(1);
    }
    info!("cache ready");
}
