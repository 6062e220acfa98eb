//! Administrative edits to the workflow graph.
//!
//! Every check runs before the write, and every successful write invalidates
//! the shared graph cache.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use txflow_storage::{
    NewStatus, NewTransition, StatusId, StatusRecord, StorageError, TransitionRecord,
    WorkflowStore,
};

use crate::cache::GraphCache;
use crate::deadline::bounded;
use crate::error::EngineError;
use crate::graph::WorkflowGraph;

const NAME_MAX: usize = 50;
const DESCRIPTION_MAX: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("Status with name '{name}' already exists")]
    DuplicateStatusName { name: String },

    #[error("An initial status already exists (ID {existing}). Only one initial status is allowed.")]
    InitialStatusExists { existing: StatusId },

    #[error("Status with ID {status_id} not found")]
    StatusNotFound { status_id: StatusId },

    #[error("Transition from status {from_status_id} to status {to_status_id} already exists")]
    DuplicateTransition {
        from_status_id: StatusId,
        to_status_id: StatusId,
    },

    #[error("Cannot create transition from final status '{name}'")]
    TransitionFromFinal { status_id: StatusId, name: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] EngineError),
}

impl AdminError {
    pub fn code(&self) -> &'static str {
        match self {
            AdminError::DuplicateStatusName { .. } => "duplicate_status_name",
            AdminError::InitialStatusExists { .. } => "initial_status_exists",
            AdminError::StatusNotFound { .. } => "not_found",
            AdminError::DuplicateTransition { .. } => "duplicate_transition",
            AdminError::TransitionFromFinal { .. } => "transition_from_final",
            AdminError::InvalidInput(_) => "invalid_input",
            AdminError::Store(err) => err.code(),
        }
    }
}

impl From<StorageError> for AdminError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateStatus { name } => AdminError::DuplicateStatusName { name },
            StorageError::DuplicateTransition {
                from_status_id,
                to_status_id,
            } => AdminError::DuplicateTransition {
                from_status_id,
                to_status_id,
            },
            StorageError::StatusNotFound { status_id } => AdminError::StatusNotFound { status_id },
            other => AdminError::Store(other.into()),
        }
    }
}

/// Graph editing service. Obtained from `WorkflowEngine::admin`, so it
/// shares the engine's cache.
pub struct WorkflowAdmin<S> {
    store: Arc<S>,
    cache: Arc<GraphCache<S>>,
    timeout: Duration,
}

impl<S: WorkflowStore> WorkflowAdmin<S> {
    pub fn new(store: Arc<S>, cache: Arc<GraphCache<S>>, timeout: Duration) -> Self {
        Self {
            store,
            cache,
            timeout,
        }
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }

    /// All statuses, read from the store.
    pub async fn list_statuses(&self) -> Result<Vec<StatusRecord>, AdminError> {
        Ok(bounded(self.deadline(), "list_statuses", self.store.list_statuses()).await?)
    }

    /// All transitions with endpoint names, ordered by source then destination.
    pub async fn list_transitions(&self) -> Result<Vec<TransitionRecord>, AdminError> {
        Ok(bounded(
            self.deadline(),
            "list_transitions",
            self.store.list_transitions(),
        )
        .await?)
    }

    pub async fn add_status(&self, status: NewStatus) -> Result<StatusRecord, AdminError> {
        let status = NewStatus {
            name: required_name(&status.name)?,
            description: optional_description(status.description)?,
            ..status
        };
        let deadline = self.deadline();

        let existing = bounded(deadline, "list_statuses", self.store.list_statuses()).await?;
        if existing
            .iter()
            .any(|s| s.name.eq_ignore_ascii_case(&status.name))
        {
            return Err(AdminError::DuplicateStatusName { name: status.name });
        }
        if status.is_initial {
            if let Some(initial) = existing.iter().find(|s| s.is_initial) {
                return Err(AdminError::InitialStatusExists {
                    existing: initial.id,
                });
            }
        }

        let record =
            bounded_store(deadline, "insert_status", self.store.insert_status(status)).await?;
        self.cache.invalidate();
        tracing::info!(status_id = %record.id, name = %record.name, "status added");
        Ok(record)
    }

    pub async fn add_transition(
        &self,
        transition: NewTransition,
    ) -> Result<TransitionRecord, AdminError> {
        let transition = NewTransition {
            name: required_name(&transition.name)?,
            description: optional_description(transition.description)?,
            ..transition
        };
        let deadline = self.deadline();

        let statuses = bounded(deadline, "list_statuses", self.store.list_statuses()).await?;
        let find = |status_id: StatusId| {
            statuses
                .iter()
                .find(|s| s.id == status_id)
                .ok_or(AdminError::StatusNotFound { status_id })
        };
        let from = find(transition.from_status_id)?;
        find(transition.to_status_id)?;

        let transitions =
            bounded(deadline, "list_transitions", self.store.list_transitions()).await?;
        if transitions.iter().any(|t| {
            t.from_status_id == transition.from_status_id
                && t.to_status_id == transition.to_status_id
        }) {
            return Err(AdminError::DuplicateTransition {
                from_status_id: transition.from_status_id,
                to_status_id: transition.to_status_id,
            });
        }
        if from.is_final {
            return Err(AdminError::TransitionFromFinal {
                status_id: from.id,
                name: from.name.clone(),
            });
        }

        let record = bounded_store(
            deadline,
            "insert_transition",
            self.store.insert_transition(transition),
        )
        .await?;
        self.cache.invalidate();
        tracing::info!(
            transition_id = record.id,
            from = %record.from_status_name,
            to = %record.to_status_name,
            name = %record.name,
            "transition added"
        );
        Ok(record)
    }

    /// Drop the cached graph and load a fresh one.
    pub async fn refresh_cache(&self) -> Result<Arc<WorkflowGraph>, AdminError> {
        let graph = self.cache.refresh(self.deadline()).await?;
        tracing::info!(
            statuses = graph.statuses().len(),
            transitions = graph.transitions().len(),
            "workflow graph cache refreshed"
        );
        Ok(graph)
    }
}

/// Like `bounded`, but keeps store uniqueness failures as admin errors. The
/// store's own checks catch writes that raced past ours.
async fn bounded_store<T, F>(
    deadline: Instant,
    operation: &'static str,
    call: F,
) -> Result<T, AdminError>
where
    F: std::future::Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout_at(deadline, call).await {
        Ok(result) => result.map_err(AdminError::from),
        Err(_) => Err(EngineError::Timeout { operation }.into()),
    }
}

fn required_name(name: &str) -> Result<String, AdminError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AdminError::InvalidInput("name is required".to_string()));
    }
    if name.chars().count() > NAME_MAX {
        return Err(AdminError::InvalidInput(format!(
            "name must be at most {NAME_MAX} characters"
        )));
    }
    Ok(name.to_string())
}

fn optional_description(description: Option<String>) -> Result<Option<String>, AdminError> {
    let description = description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    if description
        .as_ref()
        .is_some_and(|d| d.chars().count() > DESCRIPTION_MAX)
    {
        return Err(AdminError::InvalidInput(format!(
            "description must be at most {DESCRIPTION_MAX} characters"
        )));
    }
    Ok(description)
}
