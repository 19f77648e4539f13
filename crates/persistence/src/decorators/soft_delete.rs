//! Soft deletion.
//!
//! [`SoftDeleteStore`] turns deletes into a flag update and hides flagged
//! records from every read. The flag is a boolean field of the record
//! document (`is_delete` unless configured otherwise). A record without the
//! field counts as not deleted.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::{
    HistoryCommit, HistoryEntry, HistoryStore, Record, RecordStore, SearchStore, Snapshot,
    StoreContext, TransactionCoordinator,
};
use crate::error::{ResourceError, StorageResult};
use crate::types::{Filter, FilterValue, Page, SortRule};

/// Default flag field.
pub const DEFAULT_FLAG: &str = "is_delete";

/// Wraps a store so that deletes set a flag instead of removing rows.
///
/// Reads through this store only see records whose flag is unset, unless the
/// caller's filter constrains the flag column itself. The wrapped store still
/// sees every row.
#[derive(Debug, Clone)]
pub struct SoftDeleteStore<S> {
    inner: S,
    flag: String,
}

impl<S> SoftDeleteStore<S> {
    /// Wraps `inner` using the `is_delete` flag.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            flag: DEFAULT_FLAG.to_string(),
        }
    }

    /// Uses `flag` as the flag field.
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flag = flag.into();
        self
    }

    /// The flag field.
    pub fn flag(&self) -> &str {
        &self.flag
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// A copy of `filter` restricted to unflagged records, unless it already
    /// constrains the flag.
    fn active(&self, filter: &Filter) -> Filter {
        filter.with_default(
            &self.flag,
            FilterValue::In(vec![Value::Bool(false), Value::Null]),
        )
    }

    fn flag_set(&self) -> Map<String, Value> {
        let mut changes = Map::new();
        changes.insert(self.flag.clone(), Value::Bool(true));
        changes
    }
}

#[async_trait]
impl<T, S> RecordStore<T> for SoftDeleteStore<S>
where
    T: Record,
    S: RecordStore<T>,
{
    fn coordinator(&self) -> &TransactionCoordinator {
        self.inner.coordinator()
    }

    async fn get(&self, ctx: &StoreContext, id: i64) -> StorageResult<T> {
        let filter = self.active(&Filter::new().eq("id", id));
        self.inner
            .first(ctx, &filter, &[])
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    ResourceError::not_found(T::TABLE, id).into()
                } else {
                    e
                }
            })
    }

    async fn first(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        order: &[SortRule],
    ) -> StorageResult<T> {
        self.inner.first(ctx, &self.active(filter), order).await
    }

    async fn list(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        order: &[SortRule],
    ) -> StorageResult<Vec<T>> {
        self.inner.list(ctx, &self.active(filter), order).await
    }

    async fn count(&self, ctx: &StoreContext, filter: &Filter) -> StorageResult<u64> {
        self.inner.count(ctx, &self.active(filter)).await
    }

    async fn count_by_group(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        column: &str,
    ) -> StorageResult<HashMap<String, u64>> {
        self.inner
            .count_by_group(ctx, &self.active(filter), column)
            .await
    }

    async fn list_page(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        page: u32,
        size: u32,
        order: &[SortRule],
    ) -> StorageResult<Page<T>> {
        self.inner
            .list_page(ctx, &self.active(filter), page, size, order)
            .await
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

    /// Flags the records with these ids. Already-flagged records are not
    /// counted.
    async fn delete(&self, ctx: &StoreContext, ids: &[i64]) -> StorageResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let filter = Filter::new().any("id", ids.iter().copied());
        <Self as RecordStore<T>>::delete_where(self, ctx, &filter).await
    }

    /// Flags every unflagged record matching `filter`.
    async fn delete_where(&self, ctx: &StoreContext, filter: &Filter) -> StorageResult<u64> {
        let flagged = self
            .inner
            .update_where(ctx, &self.active(filter), &self.flag_set())
            .await?;
        tracing::debug!(table = T::TABLE, flag = %self.flag, flagged, "soft-deleted records");
        Ok(flagged)
    }
}

#[async_trait]
impl<T, S> SearchStore<T> for SoftDeleteStore<S>
where
    T: Record,
    S: SearchStore<T>,
{
    async fn search(
        &self,
        ctx: &StoreContext,
        keyword: &str,
        filter: &Filter,
        order: &[SortRule],
    ) -> StorageResult<Vec<T>> {
        self.inner
            .search(ctx, keyword, &self.active(filter), order)
            .await
    }

    async fn search_count(
        &self,
        ctx: &StoreContext,
        keyword: &str,
        filter: &Filter,
    ) -> StorageResult<u64> {
        self.inner
            .search_count(ctx, keyword, &self.active(filter))
            .await
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
        self.inner
            .search_by_page(ctx, keyword, &self.active(filter), page, size, order)
            .await
    }

    async fn set_labels(
        &self,
        ctx: &StoreContext,
        target: i64,
        labels: &[&str],
    ) -> StorageResult<()> {
        self.inner.set_labels(ctx, target, labels).await
    }

    async fn labels(&self, ctx: &StoreContext, target: i64) -> StorageResult<Vec<String>> {
        self.inner.labels(ctx, target).await
    }
}

#[async_trait]
impl<D, S> HistoryStore<D> for SoftDeleteStore<S>
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::sqlite::{SqliteBackend, SqliteRecordStore};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Task {
        #[serde(default)]
        id: i64,
        title: String,
        #[serde(default)]
        is_delete: bool,
    }

    impl Record for Task {
        const TABLE: &'static str = "tasks";

        fn id(&self) -> i64 {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
    }

    fn task(title: &str) -> Task {
        Task {
            id: 0,
            title: title.to_string(),
            is_delete: false,
        }
    }

    fn create_test_store() -> SoftDeleteStore<SqliteRecordStore<Task>> {
        let backend = SqliteBackend::in_memory().unwrap();
        SoftDeleteStore::new(SqliteRecordStore::new(backend).unwrap())
    }

    #[test]
    fn test_active_filter_is_derived() {
        let store = create_test_store();
        let caller = Filter::new().eq("title", "a");
        let derived = store.active(&caller);
        assert!(!caller.contains("is_delete"));
        assert!(derived.contains("is_delete"));

        let explicit = Filter::new().eq("is_delete", true);
        assert_eq!(store.active(&explicit), explicit);
    }

    #[tokio::test]
    async fn test_delete_flags_instead_of_removing() {
        let store = create_test_store();
        let ctx = StoreContext::new();

        let a = store.create(&ctx, task("a")).await.unwrap();
        let b = store.create(&ctx, task("b")).await.unwrap();

        assert_eq!(store.delete(&ctx, &[a.id]).await.unwrap(), 1);
        // Deleting again flags nothing new.
        assert_eq!(store.delete(&ctx, &[a.id]).await.unwrap(), 0);

        let visible = store.list(&ctx, &Filter::new(), &[]).await.unwrap();
        assert_eq!(visible, vec![b.clone()]);
        assert_eq!(store.count(&ctx, &Filter::new()).await.unwrap(), 1);
        assert!(store.get(&ctx, a.id).await.unwrap_err().is_not_found());

        let raw = store.inner().get(&ctx, a.id).await.unwrap();
        assert!(raw.is_delete);
        assert_eq!(store.inner().count(&ctx, &Filter::new()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_caller_can_ask_for_deleted() {
        let store = create_test_store();
        let ctx = StoreContext::new();

        let a = store.create(&ctx, task("a")).await.unwrap();
        store.create(&ctx, task("b")).await.unwrap();
        store.delete(&ctx, &[a.id]).await.unwrap();

        let deleted = store
            .list(&ctx, &Filter::new().eq("is_delete", true), &[])
            .await
            .unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, a.id);
    }

    #[tokio::test]
    async fn test_custom_flag() {
        let backend = SqliteBackend::in_memory().unwrap();
        let store = SoftDeleteStore::new(SqliteRecordStore::<Task>::new(backend).unwrap())
            .with_flag("archived");
        let ctx = StoreContext::new();

        let a = store.create(&ctx, task("a")).await.unwrap();
        assert_eq!(store.delete_where(&ctx, &Filter::new()).await.unwrap(), 1);
        assert_eq!(store.count(&ctx, &Filter::new()).await.unwrap(), 0);

        let raw = store.inner().get(&ctx, a.id).await.unwrap();
        assert!(!raw.is_delete);
    }
}
