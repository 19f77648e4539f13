//! The record contract and its document encoding.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{StorageResult, ValidationError};

/// An application entity persisted by the record stores.
///
/// Each record type owns one table. The record is stored as a JSON document
/// alongside its integer primary key, so any serde-serializable struct that
/// serializes to a JSON object works.
///
/// # Examples
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use tessera_persistence::core::Record;
///
/// #[derive(Serialize, Deserialize)]
/// struct Widget {
///     #[serde(default)]
///     id: i64,
///     name: String,
/// }
///
/// impl Record for Widget {
///     const TABLE: &'static str = "widgets";
///
///     fn id(&self) -> i64 {
///         self.id
///     }
///
///     fn set_id(&mut self, id: i64) {
///         self.id = id;
///     }
/// }
/// ```
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table name. Must be a plain identifier.
    const TABLE: &'static str;

    /// Primary key. Zero before the record is first created.
    fn id(&self) -> i64;

    /// Sets the primary key after insertion.
    fn set_id(&mut self, id: i64);
}

/// Names of the side tables derived from a base table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    base: String,
}

impl TableNames {
    /// Derives names from `base`.
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Derives names from a record type's table.
    pub fn of<T: Record>() -> Self {
        Self::new(T::TABLE)
    }

    /// The base table.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// `T_history`
    pub fn history(&self) -> String {
        format!("{}_history", self.base)
    }

    /// `T_latest`
    pub fn latest(&self) -> String {
        format!("{}_latest", self.base)
    }

    /// `T_index`
    pub fn index(&self) -> String {
        format!("{}_index", self.base)
    }
}

/// Serializes a record into the stored document, without its `id` key.
pub(crate) fn encode<T: Record>(record: &T) -> StorageResult<String> {
    let mut document = document_of(record)?;
    document.remove("id");
    Ok(serde_json::to_string(&document)?)
}

/// Rebuilds a record from its id and stored document.
pub(crate) fn decode<T: Record>(id: i64, data: &str) -> StorageResult<T> {
    let mut document: Map<String, Value> = serde_json::from_str(data)?;
    document.insert("id".to_string(), Value::from(id));
    let mut record: T = serde_json::from_value(Value::Object(document))?;
    record.set_id(id);
    Ok(record)
}

fn document_of<T: Record>(record: &T) -> StorageResult<Map<String, Value>> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        _ => Err(ValidationError::InvalidRecord {
            table: T::TABLE.to_string(),
        }
        .into()),
    }
}
