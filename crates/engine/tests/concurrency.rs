//! Racing transition requests against one transaction.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use txflow_engine::{EngineConfig, EngineError, NewTransaction, TransitionRequest, WorkflowEngine};
use txflow_storage::{seed, MemoryStore};
use uuid::Uuid;

async fn processing_transaction(engine: &WorkflowEngine<MemoryStore>) -> Uuid {
    let txn = engine
        .create_transaction(NewTransaction {
            amount: Decimal::from_str("99.99").unwrap(),
            currency: "USD".to_string(),
            customer_id: "CUST-RACE".to_string(),
            description: None,
        })
        .await
        .unwrap();
    for target in [seed::VALIDATED, seed::PROCESSING] {
        engine
            .request_transition(txn.id, TransitionRequest::to(target))
            .await
            .unwrap();
    }
    txn.id
}

/// Both requests validate against Processing before either commits; store
/// latency keeps them in lock step on the paused clock.
#[tokio::test(start_paused = true)]
async fn two_valid_targets_exactly_one_commits() {
    let store = Arc::new(MemoryStore::seeded());
    let engine = WorkflowEngine::new(store.clone(), EngineConfig::default());
    let id = processing_transaction(&engine).await;
    store.set_latency(Duration::from_millis(20));

    let (complete, fail) = tokio::join!(
        engine.request_transition(id, TransitionRequest::to(seed::COMPLETED)),
        engine.request_transition(
            id,
            TransitionRequest::to(seed::FAILED).with_reason("card declined")
        ),
    );

    let (winner, loser) = match (complete, fail) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        (Ok(_), Ok(_)) => panic!("both transitions committed"),
        (Err(a), Err(b)) => panic!("neither transition committed: {a}; {b}"),
    };
    assert!(
        matches!(loser, EngineError::ConcurrencyConflict { transaction_id } if transaction_id == id),
        "unexpected failure: {loser}"
    );

    store.set_latency(Duration::ZERO);
    let detail = engine.get_transaction(id).await.unwrap();
    assert_eq!(detail.transaction.status.id, winner.status.id);
    assert!([seed::COMPLETED, seed::FAILED].contains(&winner.status.id));
    // Created->Validated, Validated->Processing, plus the single winner.
    assert_eq!(detail.history.len(), 3);
    assert_eq!(detail.history[0].to_status.id, winner.status.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_racers_one_winner() {
    const RACERS: usize = 8;

    let store = Arc::new(MemoryStore::seeded());
    let engine = Arc::new(WorkflowEngine::new(store.clone(), EngineConfig::default()));
    let id = processing_transaction(&engine).await;
    store.set_latency(Duration::from_millis(10));

    let mut handles = Vec::new();
    for i in 0..RACERS {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let request = if i % 2 == 0 {
                TransitionRequest::to(seed::COMPLETED)
            } else {
                TransitionRequest::to(seed::FAILED).with_reason(format!("racer {i}"))
            };
            engine.request_transition(id, request).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            // A racer that read the transaction after the winner committed
            // is rejected by the validator instead.
            Err(EngineError::ConcurrencyConflict { .. }) | Err(EngineError::Rejected(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);

    store.set_latency(Duration::ZERO);
    let history = engine.get_history(id).await.unwrap();
    assert_eq!(history.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_transactions_do_not_conflict() {
    let engine = Arc::new(WorkflowEngine::new(
        Arc::new(MemoryStore::seeded()),
        EngineConfig::default(),
    ));

    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(processing_transaction(&engine).await);
    }

    let handles: Vec<_> = ids
        .iter()
        .map(|&id| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .request_transition(id, TransitionRequest::to(seed::COMPLETED))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for id in ids {
        let detail = engine.get_transaction(id).await.unwrap();
        assert_eq!(detail.transaction.status.id, seed::COMPLETED);
        assert_eq!(detail.transaction.version, 3);
    }
}
