use txflow_storage::conformance::run_conformance_suite;
use txflow_storage::MemoryStore;

#[tokio::test]
async fn memory_store_passes_conformance() {
    let report = run_conformance_suite(|| async { MemoryStore::new() }).await;
    assert!(report.total > 0);
    assert_eq!(report.failed, 0, "{report}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_store_passes_conformance_multi_thread() {
    let report = run_conformance_suite(|| async { MemoryStore::new() }).await;
    assert_eq!(report.failed, 0, "{report}");
}
