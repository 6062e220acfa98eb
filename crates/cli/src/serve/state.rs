//! Shared application state.

use txflow_engine::{WorkflowAdmin, WorkflowEngine};
use txflow_storage::MemoryStore;

pub(crate) struct AppState {
    pub(crate) engine: WorkflowEngine<MemoryStore>,
    pub(crate) admin: WorkflowAdmin<MemoryStore>,
    /// None disables admin authentication.
    pub(crate) admin_key: Option<String>,
}

impl AppState {
    pub(crate) fn new(engine: WorkflowEngine<MemoryStore>, admin_key: Option<String>) -> Self {
        let admin = engine.admin();
        Self {
            engine,
            admin,
            admin_key,
        }
    }
}
