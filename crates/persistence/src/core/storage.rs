//! Core record storage trait.
//!
//! This module defines the [`RecordStore`] trait, which provides the generic
//! CRUD operations for one record type. Every operation takes a
//! [`StoreContext`] and runs on the session that context resolves to, so an
//! operation called inside a transaction joins it.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StorageResult;
use crate::types::{Filter, Page, SortRule};

use super::context::StoreContext;
use super::record::Record;
use super::transaction::TransactionCoordinator;

/// Generic CRUD over one record type.
///
/// Decorators implement this trait by delegating to a wrapped store and
/// overriding only the operations whose behavior they change.
///
/// # Filters
///
/// A [`Filter`] constrains columns by equality or set membership; constraints
/// are combined with AND and an empty filter matches every row. The `id`
/// column addresses the primary key. Other columns address top-level fields
/// of the stored record.
///
/// # Example
///
/// ```ignore
/// use tessera_persistence::core::{RecordStore, StoreContext};
/// use tessera_persistence::types::{Filter, SortRule};
///
/// async fn example<S: RecordStore<Widget>>(store: &S) -> StorageResult<()> {
///     let ctx = StoreContext::new();
///
///     let widget = store.create(&ctx, Widget::new("sprocket", "red")).await?;
///     let read = store.get(&ctx, widget.id).await?;
///     assert_eq!(read.name, "sprocket");
///
///     let red = store
///         .list(&ctx, &Filter::new().eq("color", "red"), &[SortRule::asc("name")])
///         .await?;
///     assert_eq!(red.len(), 1);
///
///     store.delete(&ctx, &[widget.id]).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait RecordStore<T: Record>: Send + Sync {
    /// The coordinator that resolves sessions for this store.
    fn coordinator(&self) -> &TransactionCoordinator;

    /// Reads one record by id.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If no row has this id
    async fn get(&self, ctx: &StoreContext, id: i64) -> StorageResult<T>;

    /// Reads the first record matching `filter` under `order`.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If nothing matches
    async fn first(&self, ctx: &StoreContext, filter: &Filter, order: &[SortRule])
    -> StorageResult<T>;

    /// Lists every record matching `filter`.
    async fn list(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        order: &[SortRule],
    ) -> StorageResult<Vec<T>>;

    /// Counts the records matching `filter`.
    async fn count(&self, ctx: &StoreContext, filter: &Filter) -> StorageResult<u64>;

    /// Counts the records matching `filter`, grouped by the value of `column`.
    ///
    /// Group values are rendered as strings; a missing or null field groups
    /// under `"null"`.
    async fn count_by_group(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        column: &str,
    ) -> StorageResult<HashMap<String, u64>>;

    /// Returns one page of matching records plus the total match count.
    ///
    /// Pages are one-indexed; page 0 is treated as page 1.
    async fn list_page(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        page: u32,
        size: u32,
        order: &[SortRule],
    ) -> StorageResult<Page<T>>;

    /// Inserts a record and returns it with its assigned id.
    ///
    /// The id carried by `record` is ignored.
    async fn create(&self, ctx: &StoreContext, record: T) -> StorageResult<T>;

    /// Replaces the stored record with the same id.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If no row has this id
    async fn update(&self, ctx: &StoreContext, record: &T) -> StorageResult<()>;

    /// Sets the given fields on every record matching `filter` and returns
    /// the number of rows changed.
    async fn update_where(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        changes: &Map<String, Value>,
    ) -> StorageResult<u64>;

    /// Deletes records by id and returns the number of rows removed.
    ///
    /// An empty id list deletes nothing.
    async fn delete(&self, ctx: &StoreContext, ids: &[i64]) -> StorageResult<u64>;

    /// Deletes every record matching `filter` and returns the number of rows
    /// removed.
    async fn delete_where(&self, ctx: &StoreContext, filter: &Filter) -> StorageResult<u64>;
}
