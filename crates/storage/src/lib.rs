pub mod conformance;
mod error;
mod memory;
mod record;
pub mod seed;
mod traits;

pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryStore};
pub use record::{
    HistoryRecord, NewHistoryRecord, NewStatus, NewTransition, StatusId, StatusRecord,
    TransactionRecord, TransitionRecord,
};
pub use traits::WorkflowStore;
