use std::future::Future;
use std::sync::Arc;

use super::{install_catalog, install_transaction, make_history, TestResult};
use crate::{StorageError, WorkflowStore};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_transitions_exactly_one_wins",
            concurrent_transitions_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_transitions_different_transactions_all_succeed",
            concurrent_transitions_different_transactions_all_succeed(factory).await,
        ),
    ]
}

// ── Same transaction: exactly one wins ──────────────────────────────────────

/// N tasks race to move the same transaction out of version 0, half towards
/// Held and half towards Done. Exactly one commits; the others see
/// ConcurrentConflict, and exactly one history record exists afterwards.
async fn concurrent_transitions_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let c = install_catalog(storage.as_ref()).await?;
    let id = install_transaction(storage.as_ref(), c.open).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        let to = if i % 2 == 0 { c.held } else { c.done };
        handles.push(tokio::spawn(async move {
            match s
                .commit_transition(id, 0, c.open, to, make_history(id, c.open, to))
                .await
            {
                Ok(_) => Ok(Some(to)),
                Err(StorageError::ConcurrentConflict { .. }) => Ok(None),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        let outcome = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        winners.extend(outcome);
    }

    let [winner] = winners.as_slice() else {
        return Err(format!("expected exactly 1 winner, got {}", winners.len()));
    };

    let record = storage.get_transaction(id).await.map_err(|e| e.to_string())?;
    if record.version != 1 || record.status_id != *winner {
        return Err(format!(
            "final record inconsistent: status {} version {}",
            record.status_id, record.version
        ));
    }
    let history = storage.list_history(id).await.map_err(|e| e.to_string())?;
    if history.len() != 1 {
        return Err(format!("expected 1 history record, got {}", history.len()));
    }
    Ok(())
}

// ── Different transactions: all succeed ─────────────────────────────────────

/// No false conflicts when there is no contention.
async fn concurrent_transitions_different_transactions_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let c = install_catalog(storage.as_ref()).await?;

    let mut ids = Vec::new();
    for _ in 0..N {
        ids.push(install_transaction(storage.as_ref(), c.open).await?);
    }

    let mut handles = Vec::new();
    for &id in &ids {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            s.commit_transition(id, 0, c.open, c.held, make_history(id, c.open, c.held))
                .await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        handle
            .await
            .map_err(|e| format!("task {i} panic: {e}"))?
            .map_err(|e| format!("task {i} failed: {e}"))?;
    }

    for id in ids {
        let record = storage.get_transaction(id).await.map_err(|e| e.to_string())?;
        if record.status_id != c.held || record.version != 1 {
            return Err(format!(
                "{id}: expected Held at version 1, got status {} version {}",
                record.status_id, record.version
            ));
        }
    }
    Ok(())
}
