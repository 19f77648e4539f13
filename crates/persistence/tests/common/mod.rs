//! Test infrastructure for the persistence layer.
//!
//! Provides a `Widget` record, a snapshot type for history tests, and
//! helpers that build the stores the integration tests compose.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};

use tessera_persistence::backends::sqlite::{
    SearchIndexStore, SqliteBackend, SqliteHistoryStore, SqliteRecordStore,
};
use tessera_persistence::core::Record;

/// A record with a name, a color and a soft-delete flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub is_delete: bool,
}

impl Widget {
    /// An unsaved widget.
    pub fn new(name: &str, color: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            color: color.to_string(),
            is_delete: false,
        }
    }
}

impl Record for Widget {
    const TABLE: &'static str = "widgets";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

/// A snapshot of a widget's content at one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub content: String,
}

impl Revision {
    pub fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }
}

pub type BaseStore = SqliteRecordStore<Widget>;
pub type IndexedStore = SearchIndexStore<BaseStore>;
pub type HistoryStoreOf<S> = SqliteHistoryStore<Widget, Revision, S>;

pub fn create_backend() -> SqliteBackend {
    SqliteBackend::in_memory().expect("Failed to create SQLite backend")
}

pub fn create_base_store(backend: &SqliteBackend) -> BaseStore {
    SqliteRecordStore::new(backend.clone()).expect("Failed to create record store")
}

pub fn create_indexed_store(backend: &SqliteBackend) -> IndexedStore {
    SearchIndexStore::new(create_base_store(backend)).expect("Failed to create index store")
}

pub fn create_history_store(backend: &SqliteBackend) -> HistoryStoreOf<BaseStore> {
    SqliteHistoryStore::new(create_base_store(backend)).expect("Failed to create history store")
}
