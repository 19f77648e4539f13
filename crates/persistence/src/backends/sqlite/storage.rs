//! RecordStore implementation for SQLite.

use std::collections::HashMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};

use crate::core::record::{decode, encode};
use crate::core::{Record, RecordStore, StoreContext, TransactionCoordinator};
use crate::error::{ResourceError, StorageResult};
use crate::types::{one_indexed_offset, Filter, Page, SortRule};

use super::query::{column_expr, group_key, json_set, order_clause, quote_ident, where_clause};
use super::schema;
use super::SqliteBackend;

/// The base record store: one table of JSON documents keyed by id.
pub struct SqliteRecordStore<T> {
    backend: SqliteBackend,
    coordinator: TransactionCoordinator,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for SqliteRecordStore<T> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            coordinator: self.coordinator.clone(),
            _record: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for SqliteRecordStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRecordStore")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl<T: Record> SqliteRecordStore<T> {
    /// Creates a store over `backend`, creating the record table if needed.
    pub fn new(backend: SqliteBackend) -> StorageResult<Self> {
        backend.with_connection(|conn| schema::create_record_table(conn, T::TABLE))?;
        let coordinator = backend.coordinator();
        Ok(Self {
            backend,
            coordinator,
            _record: PhantomData,
        })
    }

    /// Returns the backend this store runs on.
    pub fn backend(&self) -> &SqliteBackend {
        &self.backend
    }

    fn table() -> String {
        quote_ident(T::TABLE)
    }

    fn select(
        conn: &Connection,
        filter: &Filter,
        order: &[SortRule],
        window: Option<(u64, u64)>,
    ) -> StorageResult<Vec<T>> {
        let mut clause = where_clause(filter)?;
        let mut sql = format!(
            "SELECT id, data FROM {}{}{}",
            Self::table(),
            clause.sql,
            order_clause(order)?
        );
        if let Some((limit, offset)) = window {
            sql.push_str(" LIMIT ? OFFSET ?");
            clause.params.push(SqlValue::Integer(limit as i64));
            clause.params.push(SqlValue::Integer(offset as i64));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(clause.params.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter().map(|(id, data)| decode(*id, data)).collect()
    }

    fn count_rows(conn: &Connection, filter: &Filter) -> StorageResult<u64> {
        let clause = where_clause(filter)?;
        let sql = format!("SELECT COUNT(*) FROM {}{}", Self::table(), clause.sql);
        let count: i64 =
            conn.query_row(&sql, params_from_iter(clause.params.iter()), |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[async_trait]
impl<T: Record> RecordStore<T> for SqliteRecordStore<T> {
    fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    async fn get(&self, ctx: &StoreContext, id: i64) -> StorageResult<T> {
        let session = self.coordinator.session(ctx)?;
        let data: Option<String> = session.with(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT data FROM {} WHERE id = ?1", Self::table()),
                    params![id],
                    |row| row.get(0),
                )
                .optional()?)
        })?;

        match data {
            Some(data) => decode(id, &data),
            None => Err(ResourceError::not_found(T::TABLE, id).into()),
        }
    }

    async fn first(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        order: &[SortRule],
    ) -> StorageResult<T> {
        let session = self.coordinator.session(ctx)?;
        let mut rows = session.with(|conn| Self::select(conn, filter, order, Some((1, 0))))?;
        match rows.pop() {
            Some(record) => Ok(record),
            None => Err(ResourceError::not_found(T::TABLE, "first match").into()),
        }
    }

    async fn list(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        order: &[SortRule],
    ) -> StorageResult<Vec<T>> {
        let session = self.coordinator.session(ctx)?;
        session.with(|conn| Self::select(conn, filter, order, None))
    }

    async fn count(&self, ctx: &StoreContext, filter: &Filter) -> StorageResult<u64> {
        let session = self.coordinator.session(ctx)?;
        session.with(|conn| Self::count_rows(conn, filter))
    }

    async fn count_by_group(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        column: &str,
    ) -> StorageResult<HashMap<String, u64>> {
        let expr = column_expr(column)?;
        let clause = where_clause(filter)?;
        let sql = format!(
            "SELECT {expr} AS grp, COUNT(*) FROM {}{} GROUP BY grp",
            Self::table(),
            clause.sql
        );

        let session = self.coordinator.session(ctx)?;
        session.with(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(clause.params.iter()), |row| {
                Ok((row.get::<_, SqlValue>(0)?, row.get::<_, i64>(1)?))
            })?;

            let mut groups = HashMap::new();
            for row in rows {
                let (key, count) = row?;
                *groups.entry(group_key(key)).or_insert(0) += count as u64;
            }
            Ok(groups)
        })
    }

    async fn list_page(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        page: u32,
        size: u32,
        order: &[SortRule],
    ) -> StorageResult<Page<T>> {
        let offset = one_indexed_offset(page, size);
        let session = self.coordinator.session(ctx)?;
        session.with(|conn| {
            let total = Self::count_rows(conn, filter)?;
            let items = Self::select(conn, filter, order, Some((u64::from(size), offset)))?;
            Ok(Page::new(items, total))
        })
    }

    async fn create(&self, ctx: &StoreContext, mut record: T) -> StorageResult<T> {
        let data = encode(&record)?;
        let session = self.coordinator.session(ctx)?;
        let id: i64 = session.with(|conn| {
            Ok(conn.query_row(
                &format!("INSERT INTO {} (data) VALUES (?1) RETURNING id", Self::table()),
                params![data],
                |row| row.get(0),
            )?)
        })?;
        record.set_id(id);
        tracing::debug!(table = T::TABLE, id, "created record");
        Ok(record)
    }

    async fn update(&self, ctx: &StoreContext, record: &T) -> StorageResult<()> {
        let data = encode(record)?;
        let id = record.id();
        let session = self.coordinator.session(ctx)?;
        let changed = session.with(|conn| {
            Ok(conn.execute(
                &format!("UPDATE {} SET data = ?1 WHERE id = ?2", Self::table()),
                params![data, id],
            )?)
        })?;

        if changed == 0 {
            return Err(ResourceError::not_found(T::TABLE, id).into());
        }
        tracing::debug!(table = T::TABLE, id, "updated record");
        Ok(())
    }

    async fn update_where(
        &self,
        ctx: &StoreContext,
        filter: &Filter,
        changes: &Map<String, Value>,
    ) -> StorageResult<u64> {
        if changes.is_empty() {
            return Ok(0);
        }
        let set = json_set(changes)?;
        let clause = where_clause(filter)?;
        let sql = format!("UPDATE {} SET data = {}{}", Self::table(), set.sql, clause.sql);
        let params = set.params.iter().chain(clause.params.iter());

        let session = self.coordinator.session(ctx)?;
        let changed = session.with(|conn| Ok(conn.execute(&sql, params_from_iter(params))?))?;
        tracing::debug!(table = T::TABLE, changed, "updated records by filter");
        Ok(changed as u64)
    }

    async fn delete(&self, ctx: &StoreContext, ids: &[i64]) -> StorageResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.delete_where(ctx, &Filter::new().any("id", ids.iter().copied()))
            .await
    }

    async fn delete_where(&self, ctx: &StoreContext, filter: &Filter) -> StorageResult<u64> {
        let clause = where_clause(filter)?;
        let sql = format!("DELETE FROM {}{}", Self::table(), clause.sql);

        let session = self.coordinator.session(ctx)?;
        let removed = session
            .with(|conn| Ok(conn.execute(&sql, params_from_iter(clause.params.iter()))?))?;
        tracing::debug!(table = T::TABLE, removed, "deleted records");
        Ok(removed as u64)
    }
}
