use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::StorageError;
use crate::record::{
    HistoryRecord, NewHistoryRecord, NewStatus, NewTransition, StatusId, StatusRecord,
    TransactionRecord, TransitionRecord,
};

/// The storage trait for txflow backends.
///
/// A `WorkflowStore` provides durable storage for the workflow catalog
/// (statuses and transitions), transactions, and the append-only transition
/// history.
///
/// ## Snapshot Semantics
///
/// Status changes go through `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)`: commit and consume the transaction
///    OR `abort_snapshot(snapshot)`: roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, none of its writes become
/// visible.
///
/// ## OCC Conflict Detection
///
/// `update_transaction_status` is conditional on both the version token and
/// the status the caller validated against:
/// `UPDATE ... WHERE version = expected_version AND status_id = expected_status`.
/// A mismatch returns `Err(StorageError::ConcurrentConflict { .. })`. A
/// backend that defers the check must repeat it in `commit_snapshot` and fail
/// the whole commit on mismatch; either way at most one of several racing
/// writers commits.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared across
/// request handlers and async task boundaries.
#[async_trait]
pub trait WorkflowStore: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Transaction mutation (within snapshot) ───────────────────────────────

    /// Apply a version-validated status change to a transaction (OCC).
    ///
    /// Sets the status, advances the version by one and stamps `updated_at`.
    /// Returns the new version on success.
    async fn update_transaction_status(
        &self,
        snapshot: &mut Self::Snapshot,
        transaction_id: Uuid,
        expected_version: i64,
        expected_status_id: StatusId,
        new_status_id: StatusId,
        updated_at: OffsetDateTime,
    ) -> Result<i64, StorageError>;

    /// Append a history record.
    ///
    /// Must be inserted in the SAME snapshot as the `update_transaction_status`
    /// call it describes: no status change without its history record.
    async fn insert_history(
        &self,
        snapshot: &mut Self::Snapshot,
        record: NewHistoryRecord,
    ) -> Result<(), StorageError>;

    // ── Catalog ──────────────────────────────────────────────────────────────

    /// All statuses, ordered by display order then id.
    async fn list_statuses(&self) -> Result<Vec<StatusRecord>, StorageError>;

    /// All transitions, ordered by source id then destination id.
    async fn list_transitions(&self) -> Result<Vec<TransitionRecord>, StorageError>;

    /// Insert a status. Fails with `DuplicateStatus` if the name is taken.
    async fn insert_status(&self, status: NewStatus) -> Result<StatusRecord, StorageError>;

    /// Insert a transition. Fails with `StatusNotFound` for an unknown
    /// endpoint and `DuplicateTransition` for an existing pair.
    async fn insert_transition(
        &self,
        transition: NewTransition,
    ) -> Result<TransitionRecord, StorageError>;

    // ── Transactions and history (outside snapshot) ──────────────────────────

    /// Read a transaction without locking.
    ///
    /// Returns `Err(StorageError::TransactionNotFound)` if it does not exist.
    async fn get_transaction(&self, transaction_id: Uuid)
        -> Result<TransactionRecord, StorageError>;

    /// Insert a new transaction.
    ///
    /// Fails with `AlreadyExists` on a duplicate id or reference number and
    /// with `StatusNotFound` if its status does not exist.
    async fn insert_transaction(&self, record: TransactionRecord) -> Result<(), StorageError>;

    /// History of a transaction, newest first (ties: highest id first).
    /// Unknown transactions yield an empty list.
    async fn list_history(&self, transaction_id: Uuid)
        -> Result<Vec<HistoryRecord>, StorageError>;

    // ── Composite ────────────────────────────────────────────────────────────

    /// Change a transaction's status and append its history record in one
    /// snapshot. Any failure aborts the snapshot, so either both writes land
    /// or neither does.
    ///
    /// Returns the new version token.
    async fn commit_transition(
        &self,
        transaction_id: Uuid,
        expected_version: i64,
        expected_status_id: StatusId,
        new_status_id: StatusId,
        history: NewHistoryRecord,
    ) -> Result<i64, StorageError> {
        let mut snapshot = self.begin_snapshot().await?;

        let new_version = match self
            .update_transaction_status(
                &mut snapshot,
                transaction_id,
                expected_version,
                expected_status_id,
                new_status_id,
                history.changed_at,
            )
            .await
        {
            Ok(v) => v,
            Err(e) => {
                let _ = self.abort_snapshot(snapshot).await;
                return Err(e);
            }
        };

        if let Err(e) = self.insert_history(&mut snapshot, history).await {
            let _ = self.abort_snapshot(snapshot).await;
            return Err(e);
        }

        self.commit_snapshot(snapshot).await?;
        Ok(new_version)
    }
}
