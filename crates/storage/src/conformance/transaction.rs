use std::future::Future;

use uuid::Uuid;

use super::{install_catalog, install_transaction, make_transaction, TestResult};
use crate::record::StatusId;
use crate::{StorageError, WorkflowStore};

pub(super) async fn run_transaction_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "transaction",
            "transaction_inserted_at_version_0",
            transaction_inserted_at_version_0(factory).await,
        ),
        TestResult::from_result(
            "transaction",
            "duplicate_id_rejected",
            duplicate_id_rejected(factory).await,
        ),
        TestResult::from_result(
            "transaction",
            "duplicate_reference_rejected",
            duplicate_reference_rejected(factory).await,
        ),
        TestResult::from_result(
            "transaction",
            "unknown_status_rejected",
            unknown_status_rejected(factory).await,
        ),
        TestResult::from_result(
            "transaction",
            "get_missing_transaction_not_found",
            get_missing_transaction_not_found(factory).await,
        ),
    ]
}

async fn transaction_inserted_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let catalog = install_catalog(&storage).await?;
    let id = install_transaction(&storage, catalog.open).await?;

    let record = storage.get_transaction(id).await.map_err(|e| e.to_string())?;
    if record.version != 0 {
        return Err(format!("expected version 0, got {}", record.version));
    }
    if record.status_id != catalog.open {
        return Err(format!(
            "expected status {}, got {}",
            catalog.open, record.status_id
        ));
    }
    Ok(())
}

async fn duplicate_id_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let catalog = install_catalog(&storage).await?;
    let first = make_transaction(catalog.open);
    let mut second = make_transaction(catalog.open);
    second.id = first.id;

    storage
        .insert_transaction(first)
        .await
        .map_err(|e| format!("first insert: {e}"))?;
    match storage.insert_transaction(second).await {
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        Err(e) => Err(format!("expected AlreadyExists, got: {e}")),
        Ok(()) => Err("duplicate id accepted".to_string()),
    }
}

async fn duplicate_reference_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let catalog = install_catalog(&storage).await?;
    let first = make_transaction(catalog.open);
    let mut second = make_transaction(catalog.open);
    second.reference_number = first.reference_number.clone();

    storage
        .insert_transaction(first)
        .await
        .map_err(|e| format!("first insert: {e}"))?;
    match storage.insert_transaction(second).await {
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        Err(e) => Err(format!("expected AlreadyExists, got: {e}")),
        Ok(()) => Err("duplicate reference number accepted".to_string()),
    }
}

async fn unknown_status_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    install_catalog(&storage).await?;

    match storage
        .insert_transaction(make_transaction(StatusId(4242)))
        .await
    {
        Err(StorageError::StatusNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected StatusNotFound, got: {e}")),
        Ok(()) => Err("transaction in unknown status accepted".to_string()),
    }
}

async fn get_missing_transaction_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let missing = Uuid::new_v4();
    match storage.get_transaction(missing).await {
        Err(StorageError::TransactionNotFound { transaction_id }) if transaction_id == missing => {
            Ok(())
        }
        Err(e) => Err(format!("expected TransactionNotFound, got: {e}")),
        Ok(_) => Err("missing transaction returned a record".to_string()),
    }
}
