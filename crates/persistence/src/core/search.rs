//! Keyword search over labelled records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::types::{Filter, Page, SortRule};

use super::context::StoreContext;
use super::record::Record;
use super::storage::RecordStore;

/// One label of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Row id in the index table.
    pub id: i64,
    /// The labelled record.
    pub target: i64,
    /// Label text.
    pub label: String,
}

/// A record store whose records carry searchable labels.
///
/// Each record (the *target*) owns a set of string labels. A keyword matches
/// a target when any of its labels contains the keyword as a case-sensitive
/// substring. An empty keyword disables the keyword constraint.
#[async_trait]
pub trait SearchStore<T: Record>: RecordStore<T> {
    /// Lists the records matching `keyword` and `filter`.
    async fn search(
        &self,
        ctx: &StoreContext,
        keyword: &str,
        filter: &Filter,
        order: &[SortRule],
    ) -> StorageResult<Vec<T>>;

    /// Counts the records matching `keyword` and `filter`.
    async fn search_count(
        &self,
        ctx: &StoreContext,
        keyword: &str,
        filter: &Filter,
    ) -> StorageResult<u64>;

    /// Returns one page of the records matching `keyword` and `filter`.
    ///
    /// Pages are one-indexed. An empty `order` uses the store's default page
    /// order.
    async fn search_by_page(
        &self,
        ctx: &StoreContext,
        keyword: &str,
        filter: &Filter,
        page: u32,
        size: u32,
        order: &[SortRule],
    ) -> StorageResult<Page<T>>;

    /// Replaces every label of `target` with `labels`.
    ///
    /// Empty labels are skipped.
    async fn set_labels(&self, ctx: &StoreContext, target: i64, labels: &[&str])
    -> StorageResult<()>;

    /// Returns the current labels of `target`.
    async fn labels(&self, ctx: &StoreContext, target: i64) -> StorageResult<Vec<String>>;
}
