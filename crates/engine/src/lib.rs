//! txflow transition engine -- decides and applies status changes for
//! transactions against a data-driven workflow graph.
//!
//! The graph (statuses and permitted transitions) lives in a
//! [`WorkflowStore`](txflow_storage::WorkflowStore). Every decision reads an
//! immutable [`WorkflowGraph`] snapshot served by the [`GraphCache`]; the pure
//! [`validate_transition`] decides accept/reject, and the applicator commits
//! an accepted change together with its history record under optimistic
//! concurrency control.
//!
//! [`WorkflowEngine`] is the entry point for controllers; [`WorkflowAdmin`]
//! edits the graph and keeps the cache coherent.

pub mod admin;
pub mod applicator;
pub mod audit;
pub mod cache;
pub mod config;
mod deadline;
pub mod engine;
pub mod error;
pub mod graph;
pub mod validator;
pub mod view;

pub use admin::{AdminError, WorkflowAdmin};
pub use audit::AuditTrail;
pub use cache::{CacheStats, GraphCache};
pub use config::{CacheConfig, EngineConfig};
pub use engine::WorkflowEngine;
pub use error::{EngineError, Rejection, RejectionCode};
pub use graph::{GraphIssue, WorkflowGraph};
pub use validator::{validate_transition, Decision};
pub use view::{
    AvailableTransition, HistoryEntry, NewTransaction, StatusInfo, TransactionDetail,
    TransactionView, TransitionRequest,
};
