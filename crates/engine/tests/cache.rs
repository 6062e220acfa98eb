//! Graph cache behaviour as seen through the engine.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use txflow_engine::{
    CacheConfig, EngineConfig, EngineError, NewTransaction, TransitionRequest, WorkflowEngine,
};
use txflow_storage::{seed, MemoryStore, NewStatus, NewTransition, WorkflowStore};

fn payment() -> NewTransaction {
    NewTransaction {
        amount: Decimal::from_str("10.00").unwrap(),
        currency: "CHF".to_string(),
        customer_id: "CUST-CACHE".to_string(),
        description: None,
    }
}

fn new_status(name: &str) -> NewStatus {
    NewStatus {
        name: name.to_string(),
        description: None,
        is_initial: false,
        is_final: false,
        display_order: 20,
    }
}

#[tokio::test]
async fn admin_changes_visible_before_ttl() {
    let engine = WorkflowEngine::new(Arc::new(MemoryStore::seeded()), EngineConfig::default());
    let admin = engine.admin();
    let txn = engine.create_transaction(payment()).await.unwrap();

    let review = admin.add_status(new_status("Manual Review")).await.unwrap();
    admin
        .add_transition(NewTransition {
            from_status_id: seed::CREATED,
            to_status_id: review.id,
            name: "Escalate".to_string(),
            description: Some("Send to a human".to_string()),
            requires_comment: true,
            is_rollback: false,
        })
        .await
        .unwrap();

    let available = engine.list_available_transitions(txn.id).await.unwrap();
    assert!(available.iter().any(|t| t.transition_name == "Escalate"));

    let escalated = engine
        .request_transition(
            txn.id,
            TransitionRequest::to(review.id).with_reason("amount looks off"),
        )
        .await
        .unwrap();
    assert_eq!(escalated.status.name, "Manual Review");
}

#[tokio::test]
async fn direct_store_writes_wait_for_invalidation() {
    let store = Arc::new(MemoryStore::seeded());
    let engine = WorkflowEngine::new(store.clone(), EngineConfig::default());
    assert_eq!(engine.graph().await.unwrap().statuses().len(), 5);

    store.insert_status(new_status("Archived")).await.unwrap();
    assert_eq!(engine.graph().await.unwrap().statuses().len(), 5);

    engine.invalidate_graph_cache();
    assert_eq!(engine.graph().await.unwrap().statuses().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn expiry_picks_up_direct_store_writes() {
    let store = Arc::new(MemoryStore::seeded());
    let config = EngineConfig {
        cache: CacheConfig {
            absolute_ttl_secs: 60,
            sliding_ttl_secs: 30,
            grace_secs: 10,
        },
        ..EngineConfig::default()
    };
    let engine = WorkflowEngine::new(store.clone(), config);
    engine.graph().await.unwrap();

    store.insert_status(new_status("Archived")).await.unwrap();
    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(engine.graph().await.unwrap().statuses().len(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cold_start_reloads_once() {
    let store = Arc::new(MemoryStore::seeded());
    store.set_latency(Duration::from_millis(25));
    let engine = Arc::new(WorkflowEngine::new(store, EngineConfig::default()));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.graph().await.map(|g| g.statuses().len()) })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 5);
    }

    let stats = engine.cache_stats();
    assert_eq!(stats.reloads, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 15);
}

#[tokio::test(start_paused = true)]
async fn request_deadline_reports_timeout_and_writes_nothing() {
    let store = Arc::new(MemoryStore::seeded());
    let engine = WorkflowEngine::new(store.clone(), EngineConfig::default());
    let txn = engine.create_transaction(payment()).await.unwrap();

    store.set_latency(Duration::from_millis(300));
    let err = engine
        .request_transition(
            txn.id,
            TransitionRequest::to(seed::VALIDATED).with_deadline(Duration::from_millis(500)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Timeout { .. }), "{err}");
    assert!(err.is_transient());
    assert!(err.rejection().is_none());

    store.set_latency(Duration::ZERO);
    let detail = engine.get_transaction(txn.id).await.unwrap();
    assert_eq!(detail.transaction.status.id, seed::CREATED);
    assert!(detail.history.is_empty());
}

#[tokio::test]
async fn store_outage_is_transient_not_rejection() {
    let store = Arc::new(MemoryStore::seeded());
    let engine = WorkflowEngine::new(store.clone(), EngineConfig::default());
    let txn = engine.create_transaction(payment()).await.unwrap();

    store.set_available(false);
    let err = engine
        .request_transition(txn.id, TransitionRequest::to(seed::VALIDATED))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "store_unavailable");
    assert!(err.is_transient());
}
