use uuid::Uuid;

use crate::record::StatusId;

/// All errors that can be returned by a WorkflowStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency control conflict: another writer changed the
    /// transaction first. The expected version (or status) was not found.
    #[error("concurrent conflict on transaction {transaction_id}: expected version {expected_version}")]
    ConcurrentConflict {
        transaction_id: Uuid,
        expected_version: i64,
    },

    /// No transaction with the given id.
    #[error("transaction not found: {transaction_id}")]
    TransactionNotFound { transaction_id: Uuid },

    /// A referenced status does not exist.
    #[error("status not found: {status_id}")]
    StatusNotFound { status_id: StatusId },

    /// A transaction with this id or reference number already exists.
    #[error("transaction already exists: {key}")]
    AlreadyExists { key: String },

    /// Status names are unique.
    #[error("status already exists: {name}")]
    DuplicateStatus { name: String },

    /// (source, destination) pairs are unique.
    #[error("transition already exists: {from_status_id} -> {to_status_id}")]
    DuplicateTransition {
        from_status_id: StatusId,
        to_status_id: StatusId,
    },

    /// The backend cannot be reached right now. Callers may retry later.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
