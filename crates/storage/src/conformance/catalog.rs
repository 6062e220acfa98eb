use std::future::Future;

use super::{install_catalog, make_status, make_transition, TestResult};
use crate::record::StatusId;
use crate::{StorageError, WorkflowStore};

pub(super) async fn run_catalog_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "catalog",
            "empty_store_has_empty_catalog",
            empty_store_has_empty_catalog(factory).await,
        ),
        TestResult::from_result(
            "catalog",
            "statuses_ordered_by_display_order",
            statuses_ordered_by_display_order(factory).await,
        ),
        TestResult::from_result(
            "catalog",
            "duplicate_status_name_rejected",
            duplicate_status_name_rejected(factory).await,
        ),
        TestResult::from_result(
            "catalog",
            "transition_names_resolved",
            transition_names_resolved(factory).await,
        ),
        TestResult::from_result(
            "catalog",
            "duplicate_transition_rejected",
            duplicate_transition_rejected(factory).await,
        ),
        TestResult::from_result(
            "catalog",
            "transition_to_unknown_status_rejected",
            transition_to_unknown_status_rejected(factory).await,
        ),
    ]
}

async fn empty_store_has_empty_catalog<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let statuses = storage.list_statuses().await.map_err(|e| e.to_string())?;
    let transitions = storage.list_transitions().await.map_err(|e| e.to_string())?;
    if !statuses.is_empty() || !transitions.is_empty() {
        return Err(format!(
            "expected empty catalog, got {} statuses and {} transitions",
            statuses.len(),
            transitions.len()
        ));
    }
    Ok(())
}

async fn statuses_ordered_by_display_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    // Inserted out of display order on purpose.
    for (name, order) in [("Late", 30), ("Early", 10), ("Middle", 20)] {
        storage
            .insert_status(make_status(name, false, false, order))
            .await
            .map_err(|e| format!("insert {name}: {e}"))?;
    }

    let names: Vec<String> = storage
        .list_statuses()
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|s| s.name)
        .collect();
    if names != ["Early", "Middle", "Late"] {
        return Err(format!("unexpected order: {names:?}"));
    }
    Ok(())
}

async fn duplicate_status_name_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    install_catalog(&storage).await?;

    match storage
        .insert_status(make_status("Open", false, false, 9))
        .await
    {
        Err(StorageError::DuplicateStatus { name }) if name == "Open" => Ok(()),
        Err(e) => Err(format!("expected DuplicateStatus, got: {e}")),
        Ok(record) => Err(format!("duplicate accepted with id {}", record.id)),
    }
}

async fn transition_names_resolved<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let catalog = install_catalog(&storage).await?;

    let transitions = storage.list_transitions().await.map_err(|e| e.to_string())?;
    if transitions.len() != 3 {
        return Err(format!("expected 3 transitions, got {}", transitions.len()));
    }
    let finish = transitions
        .iter()
        .find(|t| t.from_status_id == catalog.open && t.to_status_id == catalog.done)
        .ok_or("Open -> Done missing")?;
    if finish.from_status_name != "Open" || finish.to_status_name != "Done" {
        return Err(format!(
            "names not resolved: {} -> {}",
            finish.from_status_name, finish.to_status_name
        ));
    }
    Ok(())
}

async fn duplicate_transition_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let catalog = install_catalog(&storage).await?;

    match storage
        .insert_transition(make_transition(catalog.open, catalog.held, "Hold again"))
        .await
    {
        Err(StorageError::DuplicateTransition { .. }) => Ok(()),
        Err(e) => Err(format!("expected DuplicateTransition, got: {e}")),
        Ok(_) => Err("duplicate (source, destination) pair accepted".to_string()),
    }
}

async fn transition_to_unknown_status_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let catalog = install_catalog(&storage).await?;

    match storage
        .insert_transition(make_transition(catalog.open, StatusId(9999), "Nowhere"))
        .await
    {
        Err(StorageError::StatusNotFound { status_id }) if status_id == StatusId(9999) => Ok(()),
        Err(e) => Err(format!("expected StatusNotFound, got: {e}")),
        Ok(_) => Err("transition to unknown status accepted".to_string()),
    }
}
