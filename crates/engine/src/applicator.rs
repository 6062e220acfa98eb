//! Commits an accepted transition.
//!
//! The applicator re-reads the transaction right before writing and refuses
//! to proceed if its status moved since validation. The write itself goes
//! through `WorkflowStore::commit_transition`, which changes the status and
//! appends the history record in one snapshot, conditional on the version
//! token just read. Either check failing yields `ConcurrencyConflict`; there
//! is no retry here, because the edge may not be valid from the new status.

use time::OffsetDateTime;
use tokio::time::Instant;
use txflow_storage::{NewHistoryRecord, StatusId, TransactionRecord, TransitionRecord, WorkflowStore};
use uuid::Uuid;

use crate::deadline::bounded;
use crate::error::EngineError;

/// An accepted edge, ready to be applied to one transaction.
#[derive(Debug, Clone)]
pub struct TransitionCommand<'a> {
    pub transaction_id: Uuid,
    /// Status the edge was validated against.
    pub validated_from: StatusId,
    pub edge: &'a TransitionRecord,
    /// Already normalised: trimmed, `None` when blank.
    pub reason: Option<String>,
    pub changed_by: Option<String>,
}

/// Apply `command`, returning the transaction as committed.
///
/// Exactly one history record is appended on success and none on failure.
pub async fn apply_transition<S: WorkflowStore>(
    store: &S,
    command: TransitionCommand<'_>,
    deadline: Instant,
) -> Result<TransactionRecord, EngineError> {
    let transaction_id = command.transaction_id;
    let current = bounded(
        deadline,
        "get_transaction",
        store.get_transaction(transaction_id),
    )
    .await?;

    if current.status_id != command.validated_from {
        tracing::warn!(
            %transaction_id,
            validated_from = %command.validated_from,
            current = %current.status_id,
            "transaction status moved after validation"
        );
        return Err(EngineError::ConcurrencyConflict { transaction_id });
    }

    let edge = command.edge;
    let changed_at = OffsetDateTime::now_utc();
    let history = NewHistoryRecord {
        transaction_id,
        from_status_id: current.status_id,
        to_status_id: edge.to_status_id,
        comment: command.reason,
        changed_by: command.changed_by,
        changed_at,
    };

    let committed = bounded(
        deadline,
        "commit_transition",
        store.commit_transition(
            transaction_id,
            current.version,
            current.status_id,
            edge.to_status_id,
            history,
        ),
    )
    .await;

    let version = match committed {
        Ok(version) => version,
        Err(err @ EngineError::ConcurrencyConflict { .. }) => {
            tracing::warn!(
                %transaction_id,
                expected_version = current.version,
                "lost commit race on transaction"
            );
            return Err(err);
        }
        Err(err) => return Err(err),
    };

    tracing::info!(
        %transaction_id,
        from = %edge.from_status_name,
        to = %edge.to_status_name,
        transition = %edge.name,
        version,
        "transaction transitioned"
    );

    Ok(TransactionRecord {
        status_id: edge.to_status_id,
        updated_at: changed_at,
        version,
        ..current
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;
    use txflow_storage::{seed, MemoryStore};

    use super::*;

    async fn store_with_transaction(status_id: StatusId) -> (MemoryStore, Uuid) {
        let store = MemoryStore::seeded();
        let now = OffsetDateTime::now_utc();
        let id = Uuid::new_v4();
        store
            .insert_transaction(TransactionRecord {
                id,
                reference_number: "TXN-20260101-0000AAAA".to_string(),
                status_id,
                amount: Decimal::new(10000, 2),
                currency: "USD".to_string(),
                customer_id: "CUST-1".to_string(),
                description: None,
                created_at: now,
                updated_at: now,
                version: 0,
            })
            .await
            .unwrap();
        (store, id)
    }

    fn edge(from: StatusId, to: StatusId) -> TransitionRecord {
        seed::transitions(OffsetDateTime::UNIX_EPOCH)
            .into_iter()
            .find(|t| t.from_status_id == from && t.to_status_id == to)
            .unwrap()
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn applies_status_and_history_together() {
        let (store, id) = store_with_transaction(seed::PROCESSING).await;
        let fail = edge(seed::PROCESSING, seed::FAILED);

        let updated = apply_transition(
            &store,
            TransitionCommand {
                transaction_id: id,
                validated_from: seed::PROCESSING,
                edge: &fail,
                reason: Some("gateway timeout".to_string()),
                changed_by: Some("ops".to_string()),
            },
            deadline(),
        )
        .await
        .unwrap();

        assert_eq!(updated.status_id, seed::FAILED);
        assert_eq!(updated.version, 1);
        assert_eq!(store.get_transaction(id).await.unwrap(), updated);

        let history = store.list_history(id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].comment.as_deref(), Some("gateway timeout"));
        assert_eq!(history[0].changed_by.as_deref(), Some("ops"));
        assert_eq!(history[0].changed_at, updated.updated_at);
    }

    #[tokio::test]
    async fn moved_status_is_a_conflict() {
        let (store, id) = store_with_transaction(seed::VALIDATED).await;
        let complete = edge(seed::PROCESSING, seed::COMPLETED);

        let err = apply_transition(
            &store,
            TransitionCommand {
                transaction_id: id,
                validated_from: seed::PROCESSING,
                edge: &complete,
                reason: None,
                changed_by: None,
            },
            deadline(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, EngineError::ConcurrencyConflict { .. }));
        assert!(store.list_history(id).await.unwrap().is_empty());
        assert_eq!(store.get_transaction(id).await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn unavailable_store_writes_nothing() {
        let (store, id) = store_with_transaction(seed::CREATED).await;
        let validate = edge(seed::CREATED, seed::VALIDATED);
        store.set_available(false);

        let err = apply_transition(
            &store,
            TransitionCommand {
                transaction_id: id,
                validated_from: seed::CREATED,
                edge: &validate,
                reason: None,
                changed_by: None,
            },
            deadline(),
        )
        .await
        .unwrap_err();
        assert!(err.is_transient());

        store.set_available(true);
        assert_eq!(store.get_transaction(id).await.unwrap().status_id, seed::CREATED);
        assert!(store.list_history(id).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_exceeded_writes_nothing() {
        let (store, id) = store_with_transaction(seed::CREATED).await;
        let validate = edge(seed::CREATED, seed::VALIDATED);
        store.set_latency(Duration::from_millis(400));

        let err = apply_transition(
            &store,
            TransitionCommand {
                transaction_id: id,
                validated_from: seed::CREATED,
                edge: &validate,
                reason: None,
                changed_by: None,
            },
            Instant::now() + Duration::from_millis(1_000),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }));

        store.set_latency(Duration::ZERO);
        assert_eq!(store.get_transaction(id).await.unwrap().version, 0);
        assert!(store.list_history(id).await.unwrap().is_empty());
    }
}
