use std::future::Future;

use tokio::time::Instant;
use txflow_storage::StorageError;

use crate::error::EngineError;

/// Run a store call, failing with `Timeout` once `deadline` passes.
///
/// Dropping the call on timeout is safe: store writes only take effect at
/// snapshot commit, which does not suspend once it starts applying.
pub(crate) async fn bounded<T, F>(
    deadline: Instant,
    operation: &'static str,
    call: F,
) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout_at(deadline, call).await {
        Ok(result) => result.map_err(EngineError::from),
        Err(_) => {
            tracing::warn!(operation, "store call exceeded its deadline");
            Err(EngineError::Timeout { operation })
        }
    }
}
