//! In-process `WorkflowStore` backend.
//!
//! Snapshots stage their writes and apply them at commit under a single
//! write lock, re-checking every version expectation first. A commit with a
//! stale expectation fails as a whole with `ConcurrentConflict`.
//!
//! Fault injection (`set_available`, `set_latency`) lets tests exercise the
//! engine's transient-failure and deadline paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StorageError;
use crate::record::{
    HistoryRecord, NewHistoryRecord, NewStatus, NewTransition, StatusId, StatusRecord,
    TransactionRecord, TransitionRecord,
};
use crate::seed;
use crate::traits::WorkflowStore;

/// In-memory store. Cheap to construct; tests build one per case.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    available: AtomicBool,
    latency_ms: AtomicU64,
}

#[derive(Default)]
struct Inner {
    statuses: Vec<StatusRecord>,
    transitions: Vec<TransitionRecord>,
    transactions: HashMap<Uuid, TransactionRecord>,
    history: Vec<HistoryRecord>,
    next_history_id: i64,
}

impl Inner {
    fn status(&self, id: StatusId) -> Option<&StatusRecord> {
        self.statuses.iter().find(|s| s.id == id)
    }
}

/// Writes staged by one snapshot, in call order.
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    staged: Vec<StagedWrite>,
}

#[derive(Debug)]
enum StagedWrite {
    Status {
        transaction_id: Uuid,
        expected_version: i64,
        expected_status_id: StatusId,
        new_status_id: StatusId,
        updated_at: OffsetDateTime,
    },
    History(NewHistoryRecord),
}

impl MemorySnapshot {
    /// The (version, status) this snapshot would leave behind for a
    /// transaction, if it already staged a change to it.
    fn visible(&self, transaction_id: Uuid) -> Option<(i64, StatusId)> {
        self.staged.iter().rev().find_map(|w| match w {
            StagedWrite::Status {
                transaction_id: id,
                expected_version,
                new_status_id,
                ..
            } if *id == transaction_id => Some((expected_version + 1, *new_status_id)),
            _ => None,
        })
    }
}

impl MemoryStore {
    /// An empty store: no statuses, no transitions, no transactions.
    pub fn new() -> Self {
        Self::from_inner(Inner::default())
    }

    /// A store pre-loaded with the default payment workflow (see [`seed`]).
    pub fn seeded() -> Self {
        let now = OffsetDateTime::now_utc();
        Self::from_inner(Inner {
            statuses: seed::statuses(now),
            transitions: seed::transitions(now),
            ..Inner::default()
        })
    }

    fn from_inner(inner: Inner) -> Self {
        Self {
            inner: RwLock::new(inner),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Take the store offline (every call fails with `Unavailable`) or bring
    /// it back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay every call by `latency` before it touches any state.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    async fn enter(&self) -> Result<(), StorageError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory store is offline".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        self.enter().await?;
        Ok(MemorySnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        self.enter().await?;
        let mut inner = self.inner.write().await;

        // Validate everything against the committed state before applying
        // anything; an early return leaves the store untouched.
        let mut working: HashMap<Uuid, TransactionRecord> = HashMap::new();
        let mut histories = Vec::new();
        for write in snapshot.staged {
            match write {
                StagedWrite::Status {
                    transaction_id,
                    expected_version,
                    expected_status_id,
                    new_status_id,
                    updated_at,
                } => {
                    let current = match working.get(&transaction_id) {
                        Some(t) => t.clone(),
                        None => inner
                            .transactions
                            .get(&transaction_id)
                            .cloned()
                            .ok_or(StorageError::TransactionNotFound { transaction_id })?,
                    };
                    if current.version != expected_version
                        || current.status_id != expected_status_id
                    {
                        return Err(StorageError::ConcurrentConflict {
                            transaction_id,
                            expected_version,
                        });
                    }
                    let mut next = current;
                    next.status_id = new_status_id;
                    next.version += 1;
                    next.updated_at = updated_at;
                    working.insert(transaction_id, next);
                }
                StagedWrite::History(record) => {
                    if !inner.transactions.contains_key(&record.transaction_id) {
                        return Err(StorageError::TransactionNotFound {
                            transaction_id: record.transaction_id,
                        });
                    }
                    histories.push(record);
                }
            }
        }

        inner.transactions.extend(working);
        for record in histories {
            inner.next_history_id += 1;
            let id = inner.next_history_id;
            inner.history.push(HistoryRecord {
                id,
                transaction_id: record.transaction_id,
                from_status_id: record.from_status_id,
                to_status_id: record.to_status_id,
                comment: record.comment,
                changed_by: record.changed_by,
                changed_at: record.changed_at,
            });
        }
        Ok(())
    }

    async fn abort_snapshot(&self, _snapshot: MemorySnapshot) -> Result<(), StorageError> {
        Ok(())
    }

    async fn update_transaction_status(
        &self,
        snapshot: &mut MemorySnapshot,
        transaction_id: Uuid,
        expected_version: i64,
        expected_status_id: StatusId,
        new_status_id: StatusId,
        updated_at: OffsetDateTime,
    ) -> Result<i64, StorageError> {
        self.enter().await?;
        let inner = self.inner.read().await;
        let stored = inner
            .transactions
            .get(&transaction_id)
            .ok_or(StorageError::TransactionNotFound { transaction_id })?;

        let (version, status_id) = snapshot
            .visible(transaction_id)
            .unwrap_or((stored.version, stored.status_id));
        if version != expected_version || status_id != expected_status_id {
            return Err(StorageError::ConcurrentConflict {
                transaction_id,
                expected_version,
            });
        }
        if inner.status(new_status_id).is_none() {
            return Err(StorageError::StatusNotFound {
                status_id: new_status_id,
            });
        }

        snapshot.staged.push(StagedWrite::Status {
            transaction_id,
            expected_version,
            expected_status_id,
            new_status_id,
            updated_at,
        });
        Ok(expected_version + 1)
    }

    async fn insert_history(
        &self,
        snapshot: &mut MemorySnapshot,
        record: NewHistoryRecord,
    ) -> Result<(), StorageError> {
        self.enter().await?;
        let inner = self.inner.read().await;
        if !inner.transactions.contains_key(&record.transaction_id) {
            return Err(StorageError::TransactionNotFound {
                transaction_id: record.transaction_id,
            });
        }
        snapshot.staged.push(StagedWrite::History(record));
        Ok(())
    }

    async fn list_statuses(&self) -> Result<Vec<StatusRecord>, StorageError> {
        self.enter().await?;
        Ok(self.inner.read().await.statuses.clone())
    }

    async fn list_transitions(&self) -> Result<Vec<TransitionRecord>, StorageError> {
        self.enter().await?;
        Ok(self.inner.read().await.transitions.clone())
    }

    async fn insert_status(&self, status: NewStatus) -> Result<StatusRecord, StorageError> {
        self.enter().await?;
        let mut inner = self.inner.write().await;
        if inner
            .statuses
            .iter()
            .any(|s| s.name.eq_ignore_ascii_case(&status.name))
        {
            return Err(StorageError::DuplicateStatus { name: status.name });
        }

        let id = StatusId(inner.statuses.iter().map(|s| s.id.0).max().unwrap_or(0) + 1);
        let record = StatusRecord {
            id,
            name: status.name,
            description: status.description,
            is_initial: status.is_initial,
            is_final: status.is_final,
            display_order: status.display_order,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.statuses.push(record.clone());
        inner
            .statuses
            .sort_by_key(|s| (s.display_order, s.id));
        Ok(record)
    }

    async fn insert_transition(
        &self,
        transition: NewTransition,
    ) -> Result<TransitionRecord, StorageError> {
        self.enter().await?;
        let mut inner = self.inner.write().await;

        let from_status_name = inner
            .status(transition.from_status_id)
            .map(|s| s.name.clone())
            .ok_or(StorageError::StatusNotFound {
                status_id: transition.from_status_id,
            })?;
        let to_status_name = inner
            .status(transition.to_status_id)
            .map(|s| s.name.clone())
            .ok_or(StorageError::StatusNotFound {
                status_id: transition.to_status_id,
            })?;
        if inner.transitions.iter().any(|t| {
            t.from_status_id == transition.from_status_id
                && t.to_status_id == transition.to_status_id
        }) {
            return Err(StorageError::DuplicateTransition {
                from_status_id: transition.from_status_id,
                to_status_id: transition.to_status_id,
            });
        }

        let id = inner.transitions.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        let record = TransitionRecord {
            id,
            from_status_id: transition.from_status_id,
            from_status_name,
            to_status_id: transition.to_status_id,
            to_status_name,
            name: transition.name,
            description: transition.description,
            requires_comment: transition.requires_comment,
            is_rollback: transition.is_rollback,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.transitions.push(record.clone());
        inner
            .transitions
            .sort_by_key(|t| (t.from_status_id, t.to_status_id));
        Ok(record)
    }

    async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<TransactionRecord, StorageError> {
        self.enter().await?;
        self.inner
            .read()
            .await
            .transactions
            .get(&transaction_id)
            .cloned()
            .ok_or(StorageError::TransactionNotFound { transaction_id })
    }

    async fn insert_transaction(&self, record: TransactionRecord) -> Result<(), StorageError> {
        self.enter().await?;
        let mut inner = self.inner.write().await;
        if inner.transactions.contains_key(&record.id) {
            return Err(StorageError::AlreadyExists {
                key: record.id.to_string(),
            });
        }
        if inner
            .transactions
            .values()
            .any(|t| t.reference_number == record.reference_number)
        {
            return Err(StorageError::AlreadyExists {
                key: record.reference_number,
            });
        }
        if inner.status(record.status_id).is_none() {
            return Err(StorageError::StatusNotFound {
                status_id: record.status_id,
            });
        }
        inner.transactions.insert(record.id, record);
        Ok(())
    }

    async fn list_history(
        &self,
        transaction_id: Uuid,
    ) -> Result<Vec<HistoryRecord>, StorageError> {
        self.enter().await?;
        let inner = self.inner.read().await;
        let mut records: Vec<HistoryRecord> = inner
            .history
            .iter()
            .filter(|h| h.transaction_id == transaction_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.changed_at.cmp(&a.changed_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }
}
