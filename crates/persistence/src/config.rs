//! Store configuration.
//!
//! [`StoreConfig`] can be read from JSON (every field has a default) or from
//! environment variables:
//!
//! | Variable                     | Field                         |
//! |------------------------------|-------------------------------|
//! | `DATABASE_URL`               | `database.url`                |
//! | `TESSERA_DB_MAX_CONNECTIONS` | `database.max_connections`    |
//! | `TESSERA_DB_MIN_IDLE`        | `database.min_idle`           |
//! | `TESSERA_DB_BUSY_TIMEOUT`    | `database.busy_timeout`       |
//! | `TESSERA_DB_MAX_LIFETIME`    | `database.max_lifetime`       |
//! | `TESSERA_CACHE_PREFIX`       | `cache.prefix`                |
//! | `TESSERA_CACHE_EXPIRATION`   | `cache.expiration`            |
//!
//! Durations use humantime syntax (`"250ms"`, `"5s"`, `"1h 30m"`).
//!
//! ```
//! use std::time::Duration;
//! use tessera_persistence::config::StoreConfig;
//!
//! let config = StoreConfig::from_json(r#"{
//!     "database": { "url": "sqlite://data/app.db", "busy_timeout": "2s" },
//!     "cache": { "prefix": "app:" }
//! }"#).unwrap();
//!
//! assert_eq!(config.database.path(), "data/app.db");
//! assert_eq!(config.database.pool.busy_timeout, Duration::from_secs(2));
//! assert_eq!(config.cache.prefix, "app:");
//! ```

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backends::sqlite::SqliteBackendConfig;
use crate::error::{StorageResult, ValidationError};

const SQLITE_SCHEME: &str = "sqlite://";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Database settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// A file path, `sqlite://path`, or `:memory:`.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Pool and engine settings.
    #[serde(flatten)]
    pub pool: SqliteBackendConfig,
}

fn default_database_url() -> String {
    ":memory:".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool: SqliteBackendConfig::default(),
        }
    }
}

impl DatabaseConfig {
    /// The database path with any `sqlite://` scheme removed.
    pub fn path(&self) -> &str {
        self.url.strip_prefix(SQLITE_SCHEME).unwrap_or(&self.url)
    }

    /// Returns true if the database lives in memory.
    pub fn is_memory(&self) -> bool {
        self.path() == ":memory:"
    }
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Prefix prepended to every cache key.
    #[serde(default)]
    pub prefix: String,

    /// Expiration applied to cached values. Zero means no expiration.
    #[serde(with = "humantime_serde", default = "default_cache_expiration")]
    pub expiration: Duration,
}

fn default_cache_expiration() -> Duration {
    Duration::from_secs(10 * 60)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            expiration: default_cache_expiration(),
        }
    }
}

impl StoreConfig {
    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> StorageResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| invalid("config", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, starting from defaults.
    ///
    /// Unset variables keep their default. A variable that is set but does
    /// not parse is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StorageResult<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("DATABASE_URL") {
            config.database.url = url;
        }
        if let Some(v) = lookup("TESSERA_DB_MAX_CONNECTIONS") {
            config.database.pool.max_connections = parse_number("TESSERA_DB_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = lookup("TESSERA_DB_MIN_IDLE") {
            config.database.pool.min_idle = parse_number("TESSERA_DB_MIN_IDLE", &v)?;
        }
        if let Some(v) = lookup("TESSERA_DB_BUSY_TIMEOUT") {
            config.database.pool.busy_timeout = parse_duration("TESSERA_DB_BUSY_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("TESSERA_DB_MAX_LIFETIME") {
            config.database.pool.max_lifetime = parse_duration("TESSERA_DB_MAX_LIFETIME", &v)?;
        }
        if let Some(prefix) = lookup("TESSERA_CACHE_PREFIX") {
            config.cache.prefix = prefix;
        }
        if let Some(v) = lookup("TESSERA_CACHE_EXPIRATION") {
            config.cache.expiration = parse_duration("TESSERA_CACHE_EXPIRATION", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> StorageResult<()> {
        if self.database.path().is_empty() {
            return Err(invalid("database.url", "must not be empty"));
        }
        let pool = &self.database.pool;
        if pool.max_connections == 0 {
            return Err(invalid("database.max_connections", "must be at least 1"));
        }
        if pool.min_idle > pool.max_connections {
            return Err(invalid(
                "database.min_idle",
                format!("exceeds max_connections ({})", pool.max_connections),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: impl ToString) -> crate::error::StorageError {
    ValidationError::InvalidConfig {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

fn parse_number<N>(name: &str, value: &str) -> StorageResult<N>
where
    N: FromStr,
    N::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| invalid(name, e))
}

fn parse_duration(name: &str, value: &str) -> StorageResult<Duration> {
    humantime::parse_duration(value.trim()).map_err(|e| invalid(name, e))
}

/// Serde adapter for humantime durations.
pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
