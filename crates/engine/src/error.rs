use std::fmt;

use serde::Serialize;
use txflow_storage::{StatusId, StorageError};
use uuid::Uuid;

/// Why the validator refused a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCode {
    /// The transaction's current status is final.
    TerminalStatus,
    /// No edge leads from the current status to the target.
    NoSuchTransition,
    /// The edge requires a reason and none was given.
    MissingReason,
}

impl RejectionCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionCode::TerminalStatus => "terminal_status",
            RejectionCode::NoSuchTransition => "no_such_transition",
            RejectionCode::MissingReason => "missing_reason",
        }
    }
}

impl fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validation rejection: stable code plus human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub code: RejectionCode,
    pub detail: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.detail, self.code)
    }
}

/// Errors surfaced by the engine to its callers.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("transaction with ID {transaction_id} not found")]
    TransactionNotFound { transaction_id: Uuid },

    #[error("status with ID {status_id} not found")]
    StatusNotFound { status_id: StatusId },

    #[error("transition rejected: {0}")]
    Rejected(Rejection),

    /// Another writer changed the transaction between read and commit.
    /// Re-read, re-validate and resubmit.
    #[error("transaction {transaction_id} was modified by another process; refresh and try again")]
    ConcurrencyConflict { transaction_id: Uuid },

    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("store operation '{operation}' exceeded its deadline")]
    Timeout { operation: &'static str },

    #[error("no initial status configured")]
    NoInitialStatus,

    #[error("more than one initial status configured: {status_ids:?}")]
    AmbiguousInitialStatus { status_ids: Vec<StatusId> },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A uniqueness constraint in the store refused the write.
    #[error("already exists: {message}")]
    Duplicate { message: String },
}

impl EngineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::TransactionNotFound { .. } | EngineError::StatusNotFound { .. } => {
                "not_found"
            }
            EngineError::Rejected(rejection) => rejection.code.as_str(),
            EngineError::ConcurrencyConflict { .. } => "concurrency_conflict",
            EngineError::StoreUnavailable { .. } => "store_unavailable",
            EngineError::Timeout { .. } => "timeout",
            EngineError::NoInitialStatus => "no_initial_status",
            EngineError::AmbiguousInitialStatus { .. } => "ambiguous_initial_status",
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::Duplicate { .. } => "duplicate",
        }
    }

    /// Transient failures may succeed on a later attempt without the caller
    /// changing its request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::StoreUnavailable { .. } | EngineError::Timeout { .. }
        )
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            EngineError::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

impl From<Rejection> for EngineError {
    fn from(rejection: Rejection) -> Self {
        EngineError::Rejected(rejection)
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConcurrentConflict { transaction_id, .. } => {
                EngineError::ConcurrencyConflict { transaction_id }
            }
            StorageError::TransactionNotFound { transaction_id } => {
                EngineError::TransactionNotFound { transaction_id }
            }
            StorageError::StatusNotFound { status_id } => EngineError::StatusNotFound { status_id },
            StorageError::AlreadyExists { .. }
            | StorageError::DuplicateStatus { .. }
            | StorageError::DuplicateTransition { .. } => EngineError::Duplicate {
                message: err.to_string(),
            },
            StorageError::Unavailable(message) | StorageError::Backend(message) => {
                EngineError::StoreUnavailable { message }
            }
        }
    }
}
