//! Snapshot isolation conformance tests.
//!
//! Verifies that staged writes are invisible outside a snapshot until commit,
//! and that aborted or dropped snapshots leave no trace.

use std::future::Future;

use time::OffsetDateTime;

use super::{install_catalog, install_transaction, make_history, TestResult};
use crate::WorkflowStore;

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "snapshot",
            "uncommitted_update_invisible",
            uncommitted_update_invisible(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "committed_update_visible",
            committed_update_visible(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "aborted_update_discarded",
            aborted_update_discarded(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "dropped_snapshot_discarded",
            dropped_snapshot_discarded(factory).await,
        ),
    ]
}

async fn uncommitted_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let catalog = install_catalog(&storage).await?;
    let id = install_transaction(&storage, catalog.open).await?;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .update_transaction_status(
            &mut snap,
            id,
            0,
            catalog.open,
            catalog.held,
            OffsetDateTime::now_utc(),
        )
        .await
        .map_err(|e| format!("update: {e}"))?;

    let outside = storage.get_transaction(id).await.map_err(|e| e.to_string())?;
    let _ = storage.abort_snapshot(snap).await;
    if outside.status_id != catalog.open || outside.version != 0 {
        return Err(format!(
            "staged write leaked: status {} version {}",
            outside.status_id, outside.version
        ));
    }
    Ok(())
}

async fn committed_update_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let catalog = install_catalog(&storage).await?;
    let id = install_transaction(&storage, catalog.open).await?;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .update_transaction_status(
            &mut snap,
            id,
            0,
            catalog.open,
            catalog.held,
            OffsetDateTime::now_utc(),
        )
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let record = storage.get_transaction(id).await.map_err(|e| e.to_string())?;
    if record.status_id != catalog.held || record.version != 1 {
        return Err(format!(
            "expected Held at version 1, got status {} version {}",
            record.status_id, record.version
        ));
    }
    Ok(())
}

async fn aborted_update_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let catalog = install_catalog(&storage).await?;
    let id = install_transaction(&storage, catalog.open).await?;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .update_transaction_status(
            &mut snap,
            id,
            0,
            catalog.open,
            catalog.held,
            OffsetDateTime::now_utc(),
        )
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .insert_history(&mut snap, make_history(id, catalog.open, catalog.held))
        .await
        .map_err(|e| format!("history: {e}"))?;
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    let record = storage.get_transaction(id).await.map_err(|e| e.to_string())?;
    let history = storage.list_history(id).await.map_err(|e| e.to_string())?;
    if record.version != 0 || !history.is_empty() {
        return Err(format!(
            "abort left version {} and {} history records",
            record.version,
            history.len()
        ));
    }
    Ok(())
}

async fn dropped_snapshot_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let catalog = install_catalog(&storage).await?;
    let id = install_transaction(&storage, catalog.open).await?;

    {
        let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
        storage
            .update_transaction_status(
                &mut snap,
                id,
                0,
                catalog.open,
                catalog.done,
                OffsetDateTime::now_utc(),
            )
            .await
            .map_err(|e| format!("update: {e}"))?;
    }

    let record = storage.get_transaction(id).await.map_err(|e| e.to_string())?;
    if record.status_id != catalog.open {
        return Err(format!(
            "dropped snapshot applied: status {}",
            record.status_id
        ));
    }
    Ok(())
}
