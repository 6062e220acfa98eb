//! The default payment workflow.
//!
//! ```text
//! Created -> Validated -> Processing -> Completed
//!                ^             |
//!                |             v
//!                +-------- Failed
//! ```
//!
//! Processing -> Failed requires a reason; Failed -> Validated is a rollback.

use time::OffsetDateTime;

use crate::record::{StatusId, StatusRecord, TransitionRecord};

pub const CREATED: StatusId = StatusId(1);
pub const VALIDATED: StatusId = StatusId(2);
pub const PROCESSING: StatusId = StatusId(3);
pub const COMPLETED: StatusId = StatusId(4);
pub const FAILED: StatusId = StatusId(5);

/// (id, name, description, is_initial, is_final, display_order)
const STATUSES: [(StatusId, &str, &str, bool, bool, i32); 5] = [
    (CREATED, "Created", "Transaction has been created", true, false, 1),
    (VALIDATED, "Validated", "Transaction has been validated", false, false, 2),
    (PROCESSING, "Processing", "Transaction is being processed", false, false, 3),
    (COMPLETED, "Completed", "Transaction has been completed", false, true, 4),
    (FAILED, "Failed", "Transaction processing failed", false, false, 5),
];

/// (id, from, to, name, description, requires_comment, is_rollback)
const TRANSITIONS: [(i32, StatusId, StatusId, &str, &str, bool, bool); 5] = [
    (1, CREATED, VALIDATED, "Validate", "Validate the created transaction", false, false),
    (2, VALIDATED, PROCESSING, "Start Processing", "Begin processing the validated transaction", false, false),
    (3, PROCESSING, COMPLETED, "Complete", "Mark transaction as completed", false, false),
    (4, PROCESSING, FAILED, "Fail", "Mark transaction as failed", true, false),
    (5, FAILED, VALIDATED, "Retry", "Retry the failed transaction", false, true),
];

/// Seed statuses, ordered by display order.
pub fn statuses(created_at: OffsetDateTime) -> Vec<StatusRecord> {
    STATUSES
        .iter()
        .map(
            |&(id, name, description, is_initial, is_final, display_order)| StatusRecord {
                id,
                name: name.to_string(),
                description: Some(description.to_string()),
                is_initial,
                is_final,
                display_order,
                created_at,
            },
        )
        .collect()
}

/// Seed transitions with endpoint names resolved.
pub fn transitions(created_at: OffsetDateTime) -> Vec<TransitionRecord> {
    let name_of = |id: StatusId| {
        STATUSES
            .iter()
            .find(|s| s.0 == id)
            .map(|s| s.1.to_string())
            .unwrap_or_default()
    };

    TRANSITIONS
        .iter()
        .map(
            |&(id, from, to, name, description, requires_comment, is_rollback)| {
                TransitionRecord {
                    id,
                    from_status_id: from,
                    from_status_name: name_of(from),
                    to_status_id: to,
                    to_status_name: name_of(to),
                    name: name.to_string(),
                    description: Some(description.to_string()),
                    requires_comment,
                    is_rollback,
                    created_at,
                }
            },
        )
        .collect()
}
