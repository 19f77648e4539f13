//! Versioned history for SQLite.
//!
//! # Tables
//!
//! ```sql
//! -- Append-only log
//! CREATE TABLE T_history (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     uuid TEXT NOT NULL UNIQUE,
//!     "user" TEXT NOT NULL,
//!     target INTEGER NOT NULL,
//!     time TEXT NOT NULL,      -- RFC 3339
//!     data TEXT NOT NULL       -- JSON snapshot
//! );
//!
//! -- One row per target
//! CREATE TABLE T_latest (
//!     id INTEGER PRIMARY KEY,  -- the target
//!     latest INTEGER NOT NULL, -- T_history.id
//!     "commit" TEXT NOT NULL   -- T_history.uuid
//! );
//! ```
//!
//! Writes append to the log and move the pointer inside one transaction.
//! Reads resolve the pointer, then the entry, inside one read transaction,
//! so a reader never sees a pointer to an entry that is not committed.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::{
    HistoryCommit, HistoryEntry, HistoryStore, LatestPointer, Record, RecordStore, SearchStore,
    Snapshot, StoreContext, TableNames, TransactionCoordinator, TransactionOptions,
};
use crate::error::{BackendError, ResourceError, StorageError, StorageResult};
use crate::types::{zero_indexed_offset, Filter, Page, SortRule};

use super::query::{placeholders, quote_ident};
use super::schema;

fn serialization_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::SerializationError { message })
}

fn parse_uuid(raw: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| serialization_error(format!("invalid commit id {raw}: {e}")))
}

fn parse_time(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| serialization_error(format!("invalid commit time {raw}: {e}")))
}

/// Raw `T_history` row.
struct HistoryRow {
    id: i64,
    uuid: String,
    user: String,
    target: i64,
    time: String,
    data: Option<String>,
}

impl HistoryRow {
    fn from_row(row: &rusqlite::Row<'_>, with_data: bool) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            uuid: row.get(1)?,
            user: row.get(2)?,
            target: row.get(3)?,
            time: row.get(4)?,
            data: if with_data { Some(row.get(5)?) } else { None },
        })
    }

    fn into_commit(self) -> StorageResult<HistoryCommit> {
        Ok(HistoryCommit {
            id: self.id,
            uuid: parse_uuid(&self.uuid)?,
            user: self.user,
            target: self.target,
            time: parse_time(&self.time)?,
        })
    }

    fn into_entry<D: Snapshot>(mut self) -> StorageResult<HistoryEntry<D>> {
        let data = self.data.take().unwrap_or_default();
        let data: D = serde_json::from_str(&data)?;
        let commit = self.into_commit()?;
        Ok(HistoryEntry {
            id: commit.id,
            uuid: commit.uuid,
            user: commit.user,
            target: commit.target,
            time: commit.time,
            data,
        })
    }
}

/// A record store with an append-only history of snapshots of type `D`.
///
/// `T` is the record type of the wrapped store; `D` is the snapshot type
/// stored per commit. They are often, but not necessarily, the same type.
pub struct SqliteHistoryStore<T, D, S> {
    inner: S,
    history_table: String,
    latest_table: String,
    _types: PhantomData<fn() -> (T, D)>,
}

impl<T, D, S> std::fmt::Debug for SqliteHistoryStore<T, D, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHistoryStore")
            .field("history_table", &self.history_table)
            .field("latest_table", &self.latest_table)
            .finish_non_exhaustive()
    }
}

impl<T, D, S> SqliteHistoryStore<T, D, S>
where
    T: Record,
    D: Snapshot,
    S: RecordStore<T>,
{
    /// Wraps `inner`, creating the history and pointer tables if needed.
    pub fn new(inner: S) -> StorageResult<Self> {
        let names = TableNames::of::<T>();
        let session = inner.coordinator().session(&StoreContext::new())?;
        session.with(|conn| schema::create_history_tables(conn, &names))?;

        Ok(Self {
            inner,
            history_table: names.history(),
            latest_table: names.latest(),
            _types: PhantomData,
        })
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Reads the latest pointer of `target`, if it has one.
    pub fn pointer(&self, ctx: &StoreContext, target: i64) -> StorageResult<Option<LatestPointer>> {
        let session = self.inner.coordinator().session(ctx)?;
        let mut pointers = session.with(|conn| self.pointers(conn, &[target]))?;
        pointers
            .remove(&target)
            .map(|(latest, commit)| {
                parse_uuid(&commit).map(|commit| LatestPointer {
                    target,
                    latest,
                    commit,
                })
            })
            .transpose()
    }

    fn upsert_pointer(
        &self,
        conn: &Connection,
        target: i64,
        latest: i64,
        commit: &Uuid,
    ) -> StorageResult<()> {
        conn.execute(
            &format!(
                r#"INSERT INTO {} (id, latest, "commit") VALUES (?1, ?2, ?3)
                   ON CONFLICT(id) DO UPDATE SET latest = excluded.latest, "commit" = excluded."commit""#,
                quote_ident(&self.latest_table)
            ),
            params![target, latest, commit.to_string()],
        )?;
        Ok(())
    }

    /// Reads the pointers of `targets` as `target -> (latest, commit)`.
    fn pointers(
        &self,
        conn: &Connection,
        targets: &[i64],
    ) -> StorageResult<HashMap<i64, (i64, String)>> {
        let sql = format!(
            r#"SELECT id, latest, "commit" FROM {} WHERE id IN ({})"#,
            quote_ident(&self.latest_table),
            placeholders(targets.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(targets.iter()), |row| {
            Ok((row.get::<_, i64>(0)?, (row.get(1)?, row.get(2)?)))
        })?;
        Ok(rows.collect::<Result<HashMap<_, _>, _>>()?)
    }

    /// Reads full entries by history id.
    fn entries(&self, conn: &Connection, ids: &[i64]) -> StorageResult<Vec<HistoryRow>> {
        let sql = format!(
            r#"SELECT id, uuid, "user", target, time, data FROM {} WHERE id IN ({})"#,
            quote_ident(&self.history_table),
            placeholders(ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter()), |row| HistoryRow::from_row(row, true))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn read_options() -> TransactionOptions {
        TransactionOptions::new().read_only()
    }
}

#[async_trait]
impl<T, D, S> HistoryStore<D> for SqliteHistoryStore<T, D, S>
where
    T: Record,
    D: Snapshot,
    S: RecordStore<T>,
{
    async fn add_history(
        &self,
        ctx: &StoreContext,
        target: i64,
        user: &str,
        data: D,
    ) -> StorageResult<HistoryEntry<D>> {
        let coordinator = self.inner.coordinator();
        let payload = serde_json::to_string(&data)?;
        let insert_sql = format!(
            r#"INSERT INTO {} (uuid, "user", target, time, data) VALUES (?1, ?2, ?3, ?4, ?5) RETURNING id"#,
            quote_ident(&self.history_table)
        );

        let entry = coordinator
            .run_in_transaction(ctx, |tx| async move {
                let uuid = Uuid::new_v4();
                let time = Utc::now();
                let session = coordinator.session(&tx)?;
                let id = session.with(|conn| {
                    let id: i64 = conn.query_row(
                        &insert_sql,
                        params![
                            uuid.to_string(),
                            user,
                            target,
                            time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                            payload
                        ],
                        |row| row.get(0),
                    )?;
                    self.upsert_pointer(conn, target, id, &uuid)?;
                    Ok(id)
                })?;

                Ok(HistoryEntry {
                    id,
                    uuid,
                    user: user.to_string(),
                    target,
                    time,
                    data,
                })
            })
            .await?;

        tracing::debug!(
            history = %self.history_table,
            target,
            id = entry.id,
            commit = %entry.uuid,
            "added history"
        );
        Ok(entry)
    }

    async fn set_latest(
        &self,
        ctx: &StoreContext,
        target: i64,
        latest: i64,
        commit: Uuid,
    ) -> StorageResult<()> {
        let session = self.inner.coordinator().session(ctx)?;
        session.with(|conn| self.upsert_pointer(conn, target, latest, &commit))
    }

    async fn latest(&self, ctx: &StoreContext, target: i64) -> StorageResult<HistoryEntry<D>> {
        let coordinator = self.inner.coordinator();
        let pointer_sql = format!(
            "SELECT latest FROM {} WHERE id = ?1",
            quote_ident(&self.latest_table)
        );
        let entry_sql = format!(
            r#"SELECT id, uuid, "user", target, time, data FROM {} WHERE id = ?1 AND target = ?2"#,
            quote_ident(&self.history_table)
        );

        let row = coordinator
            .run_in_transaction_with(ctx, &Self::read_options(), |tx| async move {
                let session = coordinator.session(&tx)?;
                session.with(|conn| {
                    let latest: i64 = conn
                        .query_row(&pointer_sql, params![target], |row| row.get(0))
                        .optional()?
                        .ok_or_else(|| ResourceError::not_found(&self.latest_table, target))?;

                    conn.query_row(&entry_sql, params![latest, target], |row| {
                        HistoryRow::from_row(row, true)
                    })
                    .optional()?
                    .ok_or_else(|| ResourceError::not_found(&self.history_table, latest).into())
                })
            })
            .await?;

        row.into_entry()
    }

    async fn find_latest(
        &self,
        ctx: &StoreContext,
        targets: &[i64],
    ) -> StorageResult<Vec<HistoryEntry<D>>> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let coordinator = self.inner.coordinator();
        let mut rows = coordinator
            .run_in_transaction_with(ctx, &Self::read_options(), |tx| async move {
                let session = coordinator.session(&tx)?;
                session.with(|conn| {
                    let pointers = self.pointers(conn, targets)?;
                    if pointers.is_empty() {
                        return Ok(HashMap::new());
                    }
                    let ids: Vec<i64> = pointers.values().map(|(latest, _)| *latest).collect();
                    let rows = self
                        .entries(conn, &ids)?
                        .into_iter()
                        .filter(|row| {
                            pointers
                                .get(&row.target)
                                .is_some_and(|(latest, _)| *latest == row.id)
                        })
                        .map(|row| (row.target, row))
                        .collect::<HashMap<_, _>>();
                    Ok(rows)
                })
            })
            .await?;

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(rows.len());
        for target in targets {
            if !seen.insert(*target) {
                continue;
            }
            if let Some(row) = rows.remove(target) {
                entries.push(row.into_entry()?);
            }
        }
        Ok(entries)
    }

    async fn latest_commits(
        &self,
        ctx: &StoreContext,
        targets: &[i64],
    ) -> StorageResult<HashMap<i64, Uuid>> {
        if targets.is_empty() {
            return Ok(HashMap::new());
        }

        let session = self.inner.coordinator().session(ctx)?;
        let pointers = session.with(|conn| self.pointers(conn, targets))?;
        pointers
            .into_iter()
            .map(|(target, (_, commit))| parse_uuid(&commit).map(|uuid| (target, uuid)))
            .collect()
    }

    async fn list_history(
        &self,
        ctx: &StoreContext,
        target: i64,
        page: u32,
        size: u32,
    ) -> StorageResult<Page<HistoryCommit>> {
        let offset = zero_indexed_offset(page, size);
        let count_sql = format!(
            "SELECT COUNT(*) FROM {} WHERE target = ?1",
            quote_ident(&self.history_table)
        );
        let list_sql = format!(
            r#"SELECT id, uuid, "user", target, time FROM {}
               WHERE target = ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3"#,
            quote_ident(&self.history_table)
        );

        let session = self.inner.coordinator().session(ctx)?;
        let (total, rows) = session.with(|conn| {
            let total: i64 = conn.query_row(&count_sql, params![target], |row| row.get(0))?;
            let mut stmt = conn.prepare(&list_sql)?;
            let rows = stmt
                .query_map(params![target, i64::from(size), offset as i64], |row| {
                    HistoryRow::from_row(row, false)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok((total, rows))
        })?;

        let items = rows
            .into_iter()
            .map(HistoryRow::into_commit)
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(Page::new(items, total as u64))
    }

    async fn delete_history(&self, ctx: &StoreContext, target: i64) -> StorageResult<()> {
        let coordinator = self.inner.coordinator();
        let history_sql = format!(
            "DELETE FROM {} WHERE target = ?1",
            quote_ident(&self.history_table)
        );
        let latest_sql = format!("DELETE FROM {} WHERE id = ?1", quote_ident(&self.latest_table));

        let removed = coordinator
            .run_in_transaction(ctx, |tx| async move {
                let session = coordinator.session(&tx)?;
                session.with(|conn| {
                    let removed = conn.execute(&history_sql, params![target])?;
                    conn.execute(&latest_sql, params![target])?;
                    Ok(removed)
                })
            })
            .await?;

        tracing::debug!(history = %self.history_table, target, removed, "deleted history");
        Ok(())
    }
}

#[async_trait]
impl<T, D, S> RecordStore<T> for SqliteHistoryStore<T, D, S>
where
    T: Record,
    D: Snapshot,
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
impl<T, D, S> SearchStore<T> for SqliteHistoryStore<T, D, S>
where
    T: Record,
    D: Snapshot,
    S: SearchStore<T>,
{
    async fn search(
        &self,
        ctx: &StoreContext,
        keyword: &str,
        filter: &Filter,
        order: &[SortRule],
    ) -> StorageResult<Vec<T>> {
        self.inner.search(ctx, keyword, filter, order).await
    }

    async fn search_count(
        &self,
        ctx: &StoreContext,
        keyword: &str,
        filter: &Filter,
    ) -> StorageResult<u64> {
        self.inner.search_count(ctx, keyword, filter).await
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
            .search_by_page(ctx, keyword, filter, page, size, order)
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
