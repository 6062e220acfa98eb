//! History coupling: every committed status change has exactly one history
//! record, written in the same snapshot.

use std::future::Future;

use uuid::Uuid;

use super::{install_catalog, install_transaction, make_history, TestResult};
use crate::WorkflowStore;

pub(super) async fn run_history_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "history",
            "commit_transition_appends_history",
            commit_transition_appends_history(factory).await,
        ),
        TestResult::from_result(
            "history",
            "history_listed_newest_first",
            history_listed_newest_first(factory).await,
        ),
        TestResult::from_result(
            "history",
            "failed_transition_appends_nothing",
            failed_transition_appends_nothing(factory).await,
        ),
        TestResult::from_result(
            "history",
            "unknown_transaction_has_empty_history",
            unknown_transaction_has_empty_history(factory).await,
        ),
    ]
}

async fn commit_transition_appends_history<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let c = install_catalog(&storage).await?;
    let id = install_transaction(&storage, c.open).await?;

    let mut record = make_history(id, c.open, c.held);
    record.comment = Some("awaiting documents".to_string());
    storage
        .commit_transition(id, 0, c.open, c.held, record)
        .await
        .map_err(|e| e.to_string())?;

    let history = storage.list_history(id).await.map_err(|e| e.to_string())?;
    match history.as_slice() {
        [only] => {
            if only.from_status_id != c.open || only.to_status_id != c.held {
                return Err(format!(
                    "wrong endpoints: {} -> {}",
                    only.from_status_id, only.to_status_id
                ));
            }
            if only.comment.as_deref() != Some("awaiting documents") {
                return Err(format!("comment not stored: {:?}", only.comment));
            }
            Ok(())
        }
        other => Err(format!("expected 1 history record, got {}", other.len())),
    }
}

async fn history_listed_newest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let c = install_catalog(&storage).await?;
    let id = install_transaction(&storage, c.open).await?;

    let base = time::OffsetDateTime::now_utc();
    let steps = [(c.open, c.held), (c.held, c.open), (c.open, c.done)];
    for (i, (from, to)) in steps.into_iter().enumerate() {
        let mut record = make_history(id, from, to);
        record.changed_at = base + time::Duration::seconds(i as i64);
        storage
            .commit_transition(id, i as i64, from, to, record)
            .await
            .map_err(|e| format!("step {i}: {e}"))?;
    }

    let history = storage.list_history(id).await.map_err(|e| e.to_string())?;
    let destinations: Vec<_> = history.iter().map(|h| h.to_status_id).collect();
    if destinations != [c.done, c.open, c.held] {
        return Err(format!("unexpected order: {destinations:?}"));
    }
    Ok(())
}

async fn failed_transition_appends_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let c = install_catalog(&storage).await?;
    let id = install_transaction(&storage, c.open).await?;

    if storage
        .commit_transition(id, 3, c.open, c.held, make_history(id, c.open, c.held))
        .await
        .is_ok()
    {
        return Err("stale transition committed".to_string());
    }

    let history = storage.list_history(id).await.map_err(|e| e.to_string())?;
    if !history.is_empty() {
        return Err(format!("{} orphan history records", history.len()));
    }
    Ok(())
}

async fn unknown_transaction_has_empty_history<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let history = storage
        .list_history(Uuid::new_v4())
        .await
        .map_err(|e| e.to_string())?;
    if !history.is_empty() {
        return Err(format!("expected no history, got {}", history.len()));
    }
    Ok(())
}
