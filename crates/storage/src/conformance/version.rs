use std::future::Future;

use time::OffsetDateTime;

use super::{install_catalog, install_transaction, make_history, TestResult};
use crate::{StorageError, WorkflowStore};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "version",
            "versions_increment_sequentially",
            versions_increment_sequentially(factory).await,
        ),
        TestResult::from_result(
            "version",
            "stale_version_returns_conflict",
            stale_version_returns_conflict(factory).await,
        ),
        TestResult::from_result(
            "version",
            "stale_status_returns_conflict",
            stale_status_returns_conflict(factory).await,
        ),
        TestResult::from_result(
            "version",
            "conflict_leaves_record_untouched",
            conflict_leaves_record_untouched(factory).await,
        ),
        TestResult::from_result(
            "version",
            "updated_at_stamped",
            updated_at_stamped(factory).await,
        ),
    ]
}

/// Open -> Held -> Open -> Held through `commit_transition`, checking the
/// returned version at each step.
async fn versions_increment_sequentially<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let c = install_catalog(&storage).await?;
    let id = install_transaction(&storage, c.open).await?;

    let steps = [(c.open, c.held), (c.held, c.open), (c.open, c.held)];
    for (version, (from, to)) in steps.into_iter().enumerate() {
        let expected = version as i64;
        let new_version = storage
            .commit_transition(id, expected, from, to, make_history(id, from, to))
            .await
            .map_err(|e| format!("step {version}: {e}"))?;
        if new_version != expected + 1 {
            return Err(format!(
                "step {version}: expected new version {}, got {new_version}",
                expected + 1
            ));
        }
    }

    let record = storage.get_transaction(id).await.map_err(|e| e.to_string())?;
    if record.version != 3 {
        return Err(format!("expected version 3, got {}", record.version));
    }
    Ok(())
}

async fn stale_version_returns_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let c = install_catalog(&storage).await?;
    let id = install_transaction(&storage, c.open).await?;

    match storage
        .commit_transition(id, 5, c.open, c.held, make_history(id, c.open, c.held))
        .await
    {
        Err(StorageError::ConcurrentConflict {
            expected_version: 5,
            ..
        }) => Ok(()),
        Err(e) => Err(format!("expected ConcurrentConflict, got: {e}")),
        Ok(v) => Err(format!("stale version accepted, new version {v}")),
    }
}

async fn stale_status_returns_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let c = install_catalog(&storage).await?;
    let id = install_transaction(&storage, c.open).await?;

    // Right version, wrong status.
    match storage
        .commit_transition(id, 0, c.held, c.open, make_history(id, c.held, c.open))
        .await
    {
        Err(StorageError::ConcurrentConflict { .. }) => Ok(()),
        Err(e) => Err(format!("expected ConcurrentConflict, got: {e}")),
        Ok(v) => Err(format!("stale status accepted, new version {v}")),
    }
}

async fn conflict_leaves_record_untouched<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let c = install_catalog(&storage).await?;
    let id = install_transaction(&storage, c.open).await?;
    let before = storage.get_transaction(id).await.map_err(|e| e.to_string())?;

    let _ = storage
        .commit_transition(id, 7, c.open, c.done, make_history(id, c.open, c.done))
        .await;

    let after = storage.get_transaction(id).await.map_err(|e| e.to_string())?;
    if before != after {
        return Err(format!("record changed by failed update: {after:?}"));
    }
    Ok(())
}

async fn updated_at_stamped<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let c = install_catalog(&storage).await?;
    let id = install_transaction(&storage, c.open).await?;

    let mut history = make_history(id, c.open, c.held);
    let stamp = OffsetDateTime::now_utc() + time::Duration::minutes(5);
    history.changed_at = stamp;
    storage
        .commit_transition(id, 0, c.open, c.held, history)
        .await
        .map_err(|e| e.to_string())?;

    let record = storage.get_transaction(id).await.map_err(|e| e.to_string())?;
    if record.updated_at != stamp {
        return Err(format!(
            "expected updated_at {stamp}, got {}",
            record.updated_at
        ));
    }
    Ok(())
}
