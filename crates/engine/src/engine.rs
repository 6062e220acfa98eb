use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::Instant;
use txflow_storage::{StatusId, StatusRecord, TransactionRecord, WorkflowStore};
use uuid::Uuid;

use crate::admin::WorkflowAdmin;
use crate::applicator::{apply_transition, TransitionCommand};
use crate::audit::AuditTrail;
use crate::cache::{CacheStats, GraphCache};
use crate::config::EngineConfig;
use crate::deadline::bounded;
use crate::error::EngineError;
use crate::graph::WorkflowGraph;
use crate::validator::{validate_transition, Decision};
use crate::view::{
    AvailableTransition, HistoryEntry, NewTransaction, StatusInfo, TransactionDetail,
    TransactionView, TransitionRequest,
};

/// The transition engine. One instance per process, shared by all request
/// handlers.
pub struct WorkflowEngine<S> {
    store: Arc<S>,
    cache: Arc<GraphCache<S>>,
    audit: AuditTrail<S>,
    config: EngineConfig,
}

impl<S: WorkflowStore> WorkflowEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let cache = Arc::new(GraphCache::new(store.clone(), config.cache.clone()));
        Self {
            audit: AuditTrail::new(store.clone()),
            store,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Administrative access to the graph, sharing this engine's cache.
    pub fn admin(&self) -> WorkflowAdmin<S> {
        WorkflowAdmin::new(
            self.store.clone(),
            self.cache.clone(),
            self.config.store_timeout(),
        )
    }

    pub fn audit(&self) -> &AuditTrail<S> {
        &self.audit
    }

    fn deadline(&self, timeout: Option<Duration>) -> Instant {
        Instant::now() + timeout.unwrap_or_else(|| self.config.store_timeout())
    }

    /// Create a transaction in the graph's initial status.
    pub async fn create_transaction(
        &self,
        input: NewTransaction,
    ) -> Result<TransactionView, EngineError> {
        let input = input.normalized()?;
        let deadline = self.deadline(None);
        let graph = self.cache.snapshot(deadline).await?;
        let initial = graph.initial_status()?;

        let now = OffsetDateTime::now_utc();
        let id = Uuid::new_v4();
        let record = TransactionRecord {
            id,
            reference_number: reference_number(now, id),
            status_id: initial.id,
            amount: input.amount,
            currency: input.currency,
            customer_id: input.customer_id,
            description: input.description,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        bounded(
            deadline,
            "insert_transaction",
            self.store.insert_transaction(record.clone()),
        )
        .await?;

        tracing::info!(
            transaction_id = %record.id,
            reference = %record.reference_number,
            status = %initial.name,
            "transaction created"
        );
        Ok(TransactionView::new(record, StatusInfo::from(initial)))
    }

    /// The transaction with its current status and full history.
    pub async fn get_transaction(&self, id: Uuid) -> Result<TransactionDetail, EngineError> {
        let deadline = self.deadline(None);
        let record = bounded(deadline, "get_transaction", self.store.get_transaction(id)).await?;
        let statuses = bounded(deadline, "list_statuses", self.store.list_statuses()).await?;
        let status = statuses
            .iter()
            .find(|s| s.id == record.status_id)
            .map(StatusInfo::from)
            .ok_or(EngineError::StatusNotFound {
                status_id: record.status_id,
            })?;
        let history = self.audit.entries(id, &statuses, deadline).await?;

        Ok(TransactionDetail {
            transaction: TransactionView::new(record, status),
            history,
        })
    }

    /// Validate and apply a status change.
    pub async fn request_transition(
        &self,
        id: Uuid,
        request: TransitionRequest,
    ) -> Result<TransactionView, EngineError> {
        let reason = request.normalized_reason()?;
        let changed_by = request.normalized_changed_by()?;
        let deadline = self.deadline(request.deadline);

        let record = bounded(deadline, "get_transaction", self.store.get_transaction(id)).await?;
        let (graph, current) = self.status_in_graph(record.status_id, deadline).await?;

        let decision =
            validate_transition(&graph, &current, request.to_status_id, reason.as_deref());
        let edge = match decision {
            Decision::Accepted(edge) => edge,
            Decision::Rejected(rejection) => {
                tracing::debug!(
                    transaction_id = %id,
                    from = %current.name,
                    to = %request.to_status_id,
                    code = %rejection.code,
                    "transition rejected"
                );
                return Err(rejection.into());
            }
        };

        let updated = apply_transition(
            self.store.as_ref(),
            TransitionCommand {
                transaction_id: id,
                validated_from: current.id,
                edge,
                reason,
                changed_by,
            },
            deadline,
        )
        .await?;

        let status = graph
            .status(edge.to_status_id)
            .map(StatusInfo::from)
            .ok_or(EngineError::StatusNotFound {
                status_id: edge.to_status_id,
            })?;
        Ok(TransactionView::new(updated, status))
    }

    /// Edges leaving the transaction's current status; empty when it is final.
    pub async fn list_available_transitions(
        &self,
        id: Uuid,
    ) -> Result<Vec<AvailableTransition>, EngineError> {
        let deadline = self.deadline(None);
        let record = bounded(deadline, "get_transaction", self.store.get_transaction(id)).await?;
        let (graph, current) = self.status_in_graph(record.status_id, deadline).await?;
        if current.is_final {
            return Ok(Vec::new());
        }
        Ok(graph
            .outgoing(current.id)
            .map(AvailableTransition::from)
            .collect())
    }

    /// History of a transaction, newest first.
    pub async fn get_history(&self, id: Uuid) -> Result<Vec<HistoryEntry>, EngineError> {
        self.audit.history(id, self.deadline(None)).await
    }

    /// The current workflow graph, as the validator sees it.
    pub async fn graph(&self) -> Result<Arc<WorkflowGraph>, EngineError> {
        self.cache.snapshot(self.deadline(None)).await
    }

    pub fn invalidate_graph_cache(&self) {
        self.cache.invalidate();
    }

    /// Invalidate and reload the graph now.
    pub async fn refresh_graph_cache(&self) -> Result<Arc<WorkflowGraph>, EngineError> {
        self.cache.refresh(self.deadline(None)).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Look up `status_id` in the cached graph. A miss can mean the status
    /// was added after the snapshot was taken, so the graph is reloaded
    /// once before giving up.
    async fn status_in_graph(
        &self,
        status_id: StatusId,
        deadline: Instant,
    ) -> Result<(Arc<WorkflowGraph>, StatusRecord), EngineError> {
        let graph = self.cache.snapshot(deadline).await?;
        if let Some(status) = graph.status(status_id) {
            let status = status.clone();
            return Ok((graph, status));
        }

        tracing::debug!(%status_id, "status missing from cached graph; reloading");
        let graph = self.cache.force_reload(deadline).await?;
        let status = graph
            .status(status_id)
            .cloned()
            .ok_or(EngineError::StatusNotFound { status_id })?;
        Ok((graph, status))
    }
}

/// `TXN-YYYYMMDD-XXXXXXXX`: UTC creation date and the first eight hex digits
/// of the transaction id.
fn reference_number(created_at: OffsetDateTime, id: Uuid) -> String {
    let date = created_at.to_offset(time::UtcOffset::UTC).date();
    let suffix: String = id
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect::<String>()
        .to_ascii_uppercase();
    format!(
        "TXN-{:04}{:02}{:02}-{suffix}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;
    use txflow_storage::{seed, MemoryStore, NewStatus, NewTransition};

    use super::*;
    use crate::error::RejectionCode;

    fn engine() -> WorkflowEngine<MemoryStore> {
        WorkflowEngine::new(Arc::new(MemoryStore::seeded()), EngineConfig::default())
    }

    fn payment() -> NewTransaction {
        NewTransaction {
            amount: Decimal::from_str("250.00").unwrap(),
            currency: "usd".to_string(),
            customer_id: "CUST-42".to_string(),
            description: Some("invoice 7".to_string()),
        }
    }

    #[test]
    fn reference_number_format() {
        let id = Uuid::from_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap();
        let at = time::macros::datetime!(2026-02-12 10:20:28 UTC);
        assert_eq!(reference_number(at, id), "TXN-20260212-A1B2C3D4");
    }

    #[tokio::test]
    async fn created_in_initial_status() {
        let engine = engine();
        let txn = engine.create_transaction(payment()).await.unwrap();
        assert_eq!(txn.status.id, seed::CREATED);
        assert!(txn.status.is_initial);
        assert_eq!(txn.currency, "USD");
        assert_eq!(txn.version, 0);
        assert!(txn.reference_number.starts_with("TXN-"));
        assert_eq!(txn.reference_number.len(), "TXN-YYYYMMDD-XXXXXXXX".len());
    }

    #[tokio::test]
    async fn create_without_initial_status_fails() {
        let engine = WorkflowEngine::new(Arc::new(MemoryStore::new()), EngineConfig::default());
        let err = engine.create_transaction(payment()).await.unwrap_err();
        assert!(matches!(err, EngineError::NoInitialStatus));
    }

    #[tokio::test]
    async fn invalid_currency_rejected() {
        let engine = engine();
        let mut input = payment();
        input.currency = "dollars".to_string();
        let err = engine.create_transaction(input).await.unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[tokio::test]
    async fn transition_returns_new_status_and_records_history() {
        let engine = engine();
        let txn = engine.create_transaction(payment()).await.unwrap();
        let updated = engine
            .request_transition(
                txn.id,
                TransitionRequest::to(seed::VALIDATED).with_changed_by("clerk"),
            )
            .await
            .unwrap();
        assert_eq!(updated.status.name, "Validated");
        assert_eq!(updated.version, 1);

        let detail = engine.get_transaction(txn.id).await.unwrap();
        assert_eq!(detail.transaction.status.id, seed::VALIDATED);
        assert_eq!(detail.history.len(), 1);
        assert_eq!(detail.history[0].changed_by.as_deref(), Some("clerk"));
    }

    #[tokio::test]
    async fn blank_reason_stored_as_absent() {
        let engine = engine();
        let txn = engine.create_transaction(payment()).await.unwrap();
        engine
            .request_transition(txn.id, TransitionRequest::to(seed::VALIDATED).with_reason("   "))
            .await
            .unwrap();
        let history = engine.get_history(txn.id).await.unwrap();
        assert_eq!(history[0].reason, None);
    }

    #[tokio::test]
    async fn unknown_transaction_is_not_found() {
        let engine = engine();
        let missing = Uuid::new_v4();
        for err in [
            engine
                .request_transition(missing, TransitionRequest::to(seed::VALIDATED))
                .await
                .unwrap_err(),
            engine.list_available_transitions(missing).await.unwrap_err(),
            engine.get_history(missing).await.unwrap_err(),
        ] {
            assert_eq!(err.code(), "not_found");
        }
        assert!(engine.get_transaction(missing).await.is_err());
    }

    #[tokio::test]
    async fn available_transitions_follow_graph() {
        let engine = engine();
        let txn = engine.create_transaction(payment()).await.unwrap();
        let available = engine.list_available_transitions(txn.id).await.unwrap();
        let names: Vec<_> = available.iter().map(|t| t.transition_name.as_str()).collect();
        assert_eq!(names, vec!["Validate"]);
    }

    #[tokio::test]
    async fn status_added_after_snapshot_is_found_by_reload() {
        let store = Arc::new(MemoryStore::seeded());
        let engine = WorkflowEngine::new(store.clone(), EngineConfig::default());
        let txn = engine.create_transaction(payment()).await.unwrap();
        // Warm the cache, then change the graph behind its back.
        engine.graph().await.unwrap();

        let hold = store
            .insert_status(NewStatus {
                name: "On Hold".to_string(),
                description: None,
                is_initial: false,
                is_final: false,
                display_order: 6,
            })
            .await
            .unwrap();
        store
            .insert_transition(NewTransition {
                from_status_id: seed::CREATED,
                to_status_id: hold.id,
                name: "Hold".to_string(),
                description: None,
                requires_comment: false,
                is_rollback: false,
            })
            .await
            .unwrap();

        // The cached edge set is stale: the new edge is not visible yet.
        let err = engine
            .request_transition(txn.id, TransitionRequest::to(hold.id))
            .await
            .unwrap_err();
        assert_eq!(
            err.rejection().map(|r| r.code),
            Some(RejectionCode::NoSuchTransition)
        );

        // A transaction already sitting in the new status forces a reload.
        let now = OffsetDateTime::now_utc();
        let parked = Uuid::new_v4();
        store
            .insert_transaction(TransactionRecord {
                id: parked,
                reference_number: "TXN-20260101-0000CCCC".to_string(),
                status_id: hold.id,
                amount: Decimal::ONE,
                currency: "USD".to_string(),
                customer_id: "C".to_string(),
                description: None,
                created_at: now,
                updated_at: now,
                version: 0,
            })
            .await
            .unwrap();
        let available = engine.list_available_transitions(parked).await.unwrap();
        assert!(available.is_empty());

        let held = engine
            .request_transition(txn.id, TransitionRequest::to(hold.id))
            .await
            .unwrap();
        assert_eq!(held.status.name, "On Hold");

        // The forced reload is not reported as an invalidation.
        let stats = engine.cache_stats();
        assert_eq!(stats.reloads, 2);
        assert_eq!(stats.invalidations, 0);
    }

    #[tokio::test]
    async fn unknown_target_status_is_no_such_transition() {
        let store = Arc::new(MemoryStore::seeded());
        let engine = WorkflowEngine::new(store.clone(), EngineConfig::default());
        let txn = engine.create_transaction(payment()).await.unwrap();
        let err = engine
            .request_transition(txn.id, TransitionRequest::to(StatusId(404)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "no_such_transition");
    }
}
