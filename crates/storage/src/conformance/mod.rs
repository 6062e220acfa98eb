//! Conformance test suite for `WorkflowStore` implementations.
//!
//! A backend-agnostic suite that any `WorkflowStore` implementation can run
//! to verify correctness. The suite covers:
//!
//! - **Catalog**: status and transition insertion, ordering, uniqueness
//! - **Transactions**: insertion at version 0, duplicate detection, lookups
//! - **Snapshot isolation**: staged writes invisible until commit, aborts discarded
//! - **Version validation / OCC**: stale version or status rejected
//! - **History coupling**: status change and history record land together
//! - **Concurrency**: racing writers on one transaction, exactly one wins
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test:
//!
//! ```ignore
//! use txflow_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_store().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod catalog;
mod concurrent;
mod history;
mod snapshot;
mod transaction;
mod version;

use std::fmt;
use std::future::Future;

use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::record::{
    NewHistoryRecord, NewStatus, NewTransition, StatusId, TransactionRecord,
};
use crate::WorkflowStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "catalog", "snapshot", "version").
    pub category: String,
    /// Test name (e.g. "transaction_inserted_at_version_0").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store, so tests never observe each other's catalog or transactions.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: WorkflowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(catalog::run_catalog_tests(&factory).await);
    results.extend(transaction::run_transaction_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(history::run_history_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Fixtures ────────────────────────────────────────────────────────────────

/// Status ids of the three-node catalog installed by [`install_catalog`].
#[derive(Debug, Clone, Copy)]
struct Catalog {
    open: StatusId,
    held: StatusId,
    done: StatusId,
}

/// Install `Open -> Held -> Open` and `Open -> Done` into an empty store.
async fn install_catalog<S: WorkflowStore>(storage: &S) -> Result<Catalog, String> {
    let open = storage
        .insert_status(make_status("Open", true, false, 1))
        .await
        .map_err(|e| format!("insert Open: {e}"))?
        .id;
    let held = storage
        .insert_status(make_status("Held", false, false, 2))
        .await
        .map_err(|e| format!("insert Held: {e}"))?
        .id;
    let done = storage
        .insert_status(make_status("Done", false, true, 3))
        .await
        .map_err(|e| format!("insert Done: {e}"))?
        .id;

    for (from, to, name) in [(open, held, "Hold"), (held, open, "Release"), (open, done, "Finish")] {
        storage
            .insert_transition(make_transition(from, to, name))
            .await
            .map_err(|e| format!("insert {name}: {e}"))?;
    }

    Ok(Catalog { open, held, done })
}

/// Insert a fresh transaction in `status_id` and return its id.
async fn install_transaction<S: WorkflowStore>(
    storage: &S,
    status_id: StatusId,
) -> Result<Uuid, String> {
    let record = make_transaction(status_id);
    let id = record.id;
    storage
        .insert_transaction(record)
        .await
        .map_err(|e| format!("insert transaction: {e}"))?;
    Ok(id)
}

fn make_status(name: &str, is_initial: bool, is_final: bool, display_order: i32) -> NewStatus {
    NewStatus {
        name: name.to_string(),
        description: Some(format!("{name} status")),
        is_initial,
        is_final,
        display_order,
    }
}

fn make_transition(from: StatusId, to: StatusId, name: &str) -> NewTransition {
    NewTransition {
        from_status_id: from,
        to_status_id: to,
        name: name.to_string(),
        description: None,
        requires_comment: false,
        is_rollback: false,
    }
}

fn make_transaction(status_id: StatusId) -> TransactionRecord {
    let id = Uuid::new_v4();
    let now = OffsetDateTime::now_utc();
    TransactionRecord {
        id,
        reference_number: format!("TXN-CONF-{}", id.simple()),
        status_id,
        amount: Decimal::new(2500, 2),
        currency: "EUR".to_string(),
        customer_id: "conformance".to_string(),
        description: None,
        created_at: now,
        updated_at: now,
        version: 0,
    }
}

fn make_history(transaction_id: Uuid, from: StatusId, to: StatusId) -> NewHistoryRecord {
    NewHistoryRecord {
        transaction_id,
        from_status_id: from,
        to_status_id: to,
        comment: None,
        changed_by: Some("conformance".to_string()),
        changed_at: OffsetDateTime::now_utc(),
    }
}
