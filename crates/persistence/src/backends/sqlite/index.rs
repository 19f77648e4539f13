//! Label index for keyword search.
//!
//! [`SearchIndexStore`] keeps a `T_index (id, target, label)` side table next
//! to the wrapped store. A search resolves the keyword to a set of target ids
//! and hands the wrapped store a filter restricted to those ids, so paging,
//! ordering and any other filtering stay in the wrapped store.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use rusqlite::params;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::{
    HistoryCommit, HistoryEntry, HistoryStore, IndexEntry, Record, RecordStore, SearchStore,
    Snapshot, StoreContext, TableNames, TransactionCoordinator,
};
use crate::error::StorageResult;
use crate::types::{Filter, FilterValue, Page, SortRule};

use super::query::quote_ident;
use super::schema;

/// The row id a filter value selects, coerced the way SQLite compares a
/// value against an `INTEGER PRIMARY KEY` (`"7"`, `7.0` and `7` all match 7).
fn integer_key(value: &Value) -> Option<i64> {
    let whole = |f: f64| (f.fract() == 0.0).then_some(f as i64);
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole)),
        Value::String(s) => s
            .parse::<i64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().and_then(whole)),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Adds label search to any record store.
pub struct SearchIndexStore<S> {
    inner: S,
    index_table: String,
    page_order: Vec<SortRule>,
}

impl<S> std::fmt::Debug for SearchIndexStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndexStore")
            .field("index_table", &self.index_table)
            .field("page_order", &self.page_order)
            .finish_non_exhaustive()
    }
}

impl<S> SearchIndexStore<S> {
    /// Wraps `inner`, creating the index table for `T` if needed.
    pub fn new<T: Record>(inner: S) -> StorageResult<Self>
    where
        S: RecordStore<T>,
    {
        let names = TableNames::of::<T>();
        let session = inner.coordinator().session(&StoreContext::new())?;
        session.with(|conn| schema::create_index_table(conn, &names))?;

        Ok(Self {
            inner,
            index_table: names.index(),
            page_order: vec![SortRule::asc("name")],
        })
    }

    /// Sets the order `search_by_page` uses when the caller gives none.
    pub fn with_page_order(mut self, order: Vec<SortRule>) -> Self {
        self.page_order = order;
        self
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn matching_targets(
        &self,
        coordinator: &TransactionCoordinator,
        ctx: &StoreContext,
        keyword: &str,
    ) -> StorageResult<BTreeSet<i64>> {
        let sql = format!(
            "SELECT DISTINCT target FROM {} WHERE instr(label, ?1) > 0",
            quote_ident(&self.index_table)
        );
        let session = coordinator.session(ctx)?;
        session.with(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let targets = stmt
                .query_map(params![keyword], |row| row.get::<_, i64>(0))?
                .collect::<Result<BTreeSet<_>, _>>()?;
            Ok(targets)
        })
    }

    /// Index rows of `target`, oldest first.
    pub fn index_entries<T: Record>(
        &self,
        ctx: &StoreContext,
        target: i64,
    ) -> StorageResult<Vec<IndexEntry>>
    where
        S: RecordStore<T>,
    {
        self.entries(self.inner.coordinator(), ctx, target)
    }

    fn entries(
        &self,
        coordinator: &TransactionCoordinator,
        ctx: &StoreContext,
        target: i64,
    ) -> StorageResult<Vec<IndexEntry>> {
        let sql = format!(
            "SELECT id, target, label FROM {} WHERE target = ?1 ORDER BY id",
            quote_ident(&self.index_table)
        );
        let session = coordinator.session(ctx)?;
        session.with(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let entries = stmt
                .query_map(params![target], |row| {
                    Ok(IndexEntry {
                        id: row.get(0)?,
                        target: row.get(1)?,
                        label: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
    }

    /// Narrows `filter` to the targets matching `keyword`.
    ///
    /// An empty keyword leaves the filter as is. A caller-supplied `id`
    /// constraint is intersected with the matching targets.
    fn keyword_filter(
        &self,
        coordinator: &TransactionCoordinator,
        ctx: &StoreContext,
        keyword: &str,
        filter: &Filter,
    ) -> StorageResult<Filter> {
        if keyword.is_empty() {
            return Ok(filter.clone());
        }

        let mut targets = self.matching_targets(coordinator, ctx, keyword)?;
        if let Some(constraint) = filter.get("id") {
            let allowed: BTreeSet<i64> = constraint
                .values()
                .into_iter()
                .filter_map(integer_key)
                .collect();
            targets.retain(|id| allowed.contains(id));
        }

        Ok(filter.with("id", FilterValue::any(targets)))
    }
}

#[async_trait]
impl<T, S> RecordStore<T> for SearchIndexStore<S>
where
    T: Record,
    S: RecordStore<T>,
{
    fn coordinator(&self) -> &TransactionCoordinator {
        self.inner.coordinator()
    }

    async fn get(&self, ctx: &StoreContext, id: i64) -> StorageResult<T> {
        self.inner.get(ctx, id).await
    }

    async fn first(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        order: &[SortRule],
    ) -> StorageResult<T> {
        self.inner.first(ctx, filter, order).await
    }

    async fn list(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        order: &[SortRule],
    ) -> StorageResult<Vec<T>> {
        self.inner.list(ctx, filter, order).await
    }

    async fn count(&self, ctx: &StoreContext, filter: &Filter) -> StorageResult<u64> {
        self.inner.count(ctx, filter).await
    }

    async fn count_by_group(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        column: &str,
    ) -> StorageResult<HashMap<String, u64>> {
        self.inner.count_by_group(ctx, filter, column).await
    }

    async fn list_page(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        page: u32,
        size: u32,
        order: &[SortRule],
    ) -> StorageResult<Page<T>> {
        self.inner.list_page(ctx, filter, page, size, order).await
    }

    async fn create(&self, ctx: &StoreContext, record: T) -> StorageResult<T> {
        self.inner.create(ctx, record).await
    }

    async fn update(&self, ctx: &StoreContext, record: &T) -> StorageResult<()> {
        self.inner.update(ctx, record).await
    }

    async fn update_where(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        changes: &Map<String, Value>,
    ) -> StorageResult<u64> {
        self.inner.update_where(ctx, filter, changes).await
    }

    async fn delete(&self, ctx: &StoreContext, ids: &[i64]) -> StorageResult<u64> {
        self.inner.delete(ctx, ids).await
    }

    async fn delete_where(&self, ctx: &StoreContext, filter: &Filter) -> StorageResult<u64> {
        self.inner.delete_where(ctx, filter).await
    }
}

#[async_trait]
impl<T, S> SearchStore<T> for SearchIndexStore<S>
where
    T: Record,
    S: RecordStore<T>,
{
    async fn search(
        &self,
        ctx: &StoreContext,
        keyword: &str,
        filter: &Filter,
        order: &[SortRule],
    ) -> StorageResult<Vec<T>> {
        let filter = self.keyword_filter(self.inner.coordinator(), ctx, keyword, filter)?;
        self.inner.list(ctx, &filter, order).await
    }

    async fn search_count(
        &self,
        ctx: &StoreContext,
        keyword: &str,
        filter: &Filter,
    ) -> StorageResult<u64> {
        let filter = self.keyword_filter(self.inner.coordinator(), ctx, keyword, filter)?;
        self.inner.count(ctx, &filter).await
    }

    async fn search_by_page(
        &self,
        ctx: &StoreContext,
        keyword: &str,
        filter: &Filter,
        page: u32,
        size: u32,
        order: &[SortRule],
    ) -> StorageResult<Page<T>> {
        let filter = self.keyword_filter(self.inner.coordinator(), ctx, keyword, filter)?;
        let order = if order.is_empty() {
            self.page_order.as_slice()
        } else {
            order
        };
        self.inner.list_page(ctx, &filter, page, size, order).await
    }

    async fn set_labels(
        &self,
        ctx: &StoreContext,
        target: i64,
        labels: &[&str],
    ) -> StorageResult<()> {
        let coordinator = self.inner.coordinator();
        let delete_sql = format!(
            "DELETE FROM {} WHERE target = ?1",
            quote_ident(&self.index_table)
        );
        let insert_sql = format!(
            "INSERT INTO {} (target, label) VALUES (?1, ?2)",
            quote_ident(&self.index_table)
        );

        coordinator
            .run_in_transaction(ctx, |tx| async move {
                let session = coordinator.session(&tx)?;
                session.with(|conn| {
                    conn.execute(&delete_sql, params![target])?;
                    let mut stmt = conn.prepare(&insert_sql)?;
                    for label in labels.iter().filter(|l| !l.is_empty()) {
                        stmt.execute(params![target, label])?;
                    }
                    Ok(())
                })
            })
            .await?;

        tracing::debug!(
            index = %self.index_table,
            target,
            labels = labels.len(),
            "replaced labels"
        );
        Ok(())
    }

    async fn labels(&self, ctx: &StoreContext, target: i64) -> StorageResult<Vec<String>> {
        let entries = self.entries(self.inner.coordinator(), ctx, target)?;
        Ok(entries.into_iter().map(|entry| entry.label).collect())
    }
}

#[async_trait]
impl<D, S> HistoryStore<D> for SearchIndexStore<S>
where
    D: Snapshot,
    S: HistoryStore<D>,
{
    async fn add_history(
        &self,
        ctx: &StoreContext,
        target: i64,
        user: &str,
        data: D,
    ) -> StorageResult<HistoryEntry<D>> {
        self.inner.add_history(ctx, target, user, data).await
    }

    async fn set_latest(
        &self,
        ctx: &StoreContext,
        target: i64,
        latest: i64,
        commit: Uuid,
    ) -> StorageResult<()> {
        self.inner.set_latest(ctx, target, latest, commit).await
    }

    async fn latest(&self, ctx: &StoreContext, target: i64) -> StorageResult<HistoryEntry<D>> {
        self.inner.latest(ctx, target).await
    }

    async fn find_latest(
        &self,
        ctx: &StoreContext,
        targets: &[i64],
    ) -> StorageResult<Vec<HistoryEntry<D>>> {
        self.inner.find_latest(ctx, targets).await
    }

    async fn latest_commits(
        &self,
        ctx: &StoreContext,
        targets: &[i64],
    ) -> StorageResult<HashMap<i64, Uuid>> {
        self.inner.latest_commits(ctx, targets).await
    }

    async fn list_history(
        &self,
        ctx: &StoreContext,
        target: i64,
        page: u32,
        size: u32,
    ) -> StorageResult<Page<HistoryCommit>> {
        self.inner.list_history(ctx, target, page, size).await
    }

    async fn delete_history(&self, ctx: &StoreContext, target: i64) -> StorageResult<()> {
        self.inner.delete_history(ctx, target).await
    }
}
