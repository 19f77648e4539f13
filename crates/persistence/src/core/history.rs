//! Versioned history with a latest pointer.
//!
//! Every commit appends one immutable [`HistoryEntry`] for a target and moves
//! that target's [`LatestPointer`] to it, both in one transaction. Readers
//! resolve the pointer first and then the entry it names.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::types::Page;

use super::context::StoreContext;

/// Snapshot payloads stored in history entries.
pub trait Snapshot: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<D> Snapshot for D where D: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// One immutable commit in a target's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry<D> {
    /// Row id in the history table.
    pub id: i64,
    /// Commit identifier.
    pub uuid: Uuid,
    /// Who made the commit.
    pub user: String,
    /// The record this commit belongs to.
    pub target: i64,
    /// When the commit was made.
    pub time: DateTime<Utc>,
    /// The snapshot.
    pub data: D,
}

impl<D> HistoryEntry<D> {
    /// The entry without its snapshot.
    pub fn commit(&self) -> HistoryCommit {
        HistoryCommit {
            id: self.id,
            uuid: self.uuid,
            user: self.user.clone(),
            target: self.target,
            time: self.time,
        }
    }
}

/// A history entry without its snapshot, as returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryCommit {
    /// Row id in the history table.
    pub id: i64,
    /// Commit identifier.
    pub uuid: Uuid,
    /// Who made the commit.
    pub user: String,
    /// The record this commit belongs to.
    pub target: i64,
    /// When the commit was made.
    pub time: DateTime<Utc>,
}

/// The current commit of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestPointer {
    /// The record this pointer belongs to.
    pub target: i64,
    /// Row id of the current history entry.
    pub latest: i64,
    /// Commit identifier of the current history entry.
    pub commit: Uuid,
}

/// History operations over snapshots of type `D`.
///
/// For every target with at least one commit, exactly one pointer exists and
/// it names the most recently committed entry of that target.
#[async_trait]
pub trait HistoryStore<D: Snapshot>: Send + Sync {
    /// Appends a commit for `target` and moves its pointer to it.
    async fn add_history(
        &self,
        ctx: &StoreContext,
        target: i64,
        user: &str,
        data: D,
    ) -> StorageResult<HistoryEntry<D>>;

    /// Points `target` at an existing commit.
    async fn set_latest(
        &self,
        ctx: &StoreContext,
        target: i64,
        latest: i64,
        commit: Uuid,
    ) -> StorageResult<()>;

    /// Returns the current commit of `target`.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If `target` has no pointer, or
    ///   the pointer names an entry that does not exist for `target`
    async fn latest(&self, ctx: &StoreContext, target: i64) -> StorageResult<HistoryEntry<D>>;

    /// Returns the current commit of each target that has one, in the order
    /// the targets were given.
    async fn find_latest(
        &self,
        ctx: &StoreContext,
        targets: &[i64],
    ) -> StorageResult<Vec<HistoryEntry<D>>>;

    /// Returns the current commit id of each target that has one.
    async fn latest_commits(
        &self,
        ctx: &StoreContext,
        targets: &[i64],
    ) -> StorageResult<HashMap<i64, Uuid>>;

    /// Lists the commits of `target`, newest first.
    ///
    /// Pages are zero-indexed.
    async fn list_history(
        &self,
        ctx: &StoreContext,
        target: i64,
        page: u32,
        size: u32,
    ) -> StorageResult<Page<HistoryCommit>>;

    /// Deletes every commit of `target` and its pointer.
    async fn delete_history(&self, ctx: &StoreContext, target: i64) -> StorageResult<()>;
}
