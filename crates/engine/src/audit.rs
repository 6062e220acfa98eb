//! Read side of the transition history.
//!
//! Reads always go to the store. Status names and flags for both endpoints
//! are resolved against a fresh status read, never against the graph cache.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;
use txflow_storage::{StatusId, StatusRecord, WorkflowStore};
use uuid::Uuid;

use crate::deadline::bounded;
use crate::error::EngineError;
use crate::view::{HistoryEntry, StatusInfo};

pub struct AuditTrail<S> {
    store: Arc<S>,
}

impl<S: WorkflowStore> AuditTrail<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// History of one transaction, newest first.
    pub async fn history(
        &self,
        transaction_id: Uuid,
        deadline: Instant,
    ) -> Result<Vec<HistoryEntry>, EngineError> {
        bounded(
            deadline,
            "get_transaction",
            self.store.get_transaction(transaction_id),
        )
        .await?;
        let statuses = bounded(deadline, "list_statuses", self.store.list_statuses()).await?;
        self.entries(transaction_id, &statuses, deadline).await
    }

    /// History entries with endpoints resolved against `statuses`.
    pub(crate) async fn entries(
        &self,
        transaction_id: Uuid,
        statuses: &[StatusRecord],
        deadline: Instant,
    ) -> Result<Vec<HistoryEntry>, EngineError> {
        let records = bounded(
            deadline,
            "list_history",
            self.store.list_history(transaction_id),
        )
        .await?;

        let by_id: HashMap<StatusId, &StatusRecord> = statuses.iter().map(|s| (s.id, s)).collect();
        let info = |status_id: StatusId| {
            by_id
                .get(&status_id)
                .map(|s| StatusInfo::from(*s))
                .ok_or(EngineError::StatusNotFound { status_id })
        };

        records
            .into_iter()
            .map(|record| {
                let from = info(record.from_status_id)?;
                let to = info(record.to_status_id)?;
                Ok(HistoryEntry::new(record, from, to))
            })
            .collect()
    }
}
