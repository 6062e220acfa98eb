//! Transition validation.
//!
//! Pure: the decision depends only on the graph snapshot, the current
//! status, the target and the reason. No I/O, no clock, no randomness.

use txflow_storage::{StatusId, StatusRecord, TransitionRecord};

use crate::error::{Rejection, RejectionCode};
use crate::graph::WorkflowGraph;

/// Outcome of [`validate_transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision<'g> {
    /// The matched edge, borrowed from the snapshot that accepted it.
    Accepted(&'g TransitionRecord),
    Rejected(Rejection),
}

impl<'g> Decision<'g> {
    pub fn into_result(self) -> Result<&'g TransitionRecord, Rejection> {
        match self {
            Decision::Accepted(edge) => Ok(edge),
            Decision::Rejected(rejection) => Err(rejection),
        }
    }
}

/// Decide whether a transaction in `current` may move to `target`.
///
/// Rules apply in order: a final current status is terminal; otherwise a
/// single configured edge `current -> target` must exist; if that edge
/// requires a comment, `reason` must contain something besides whitespace.
pub fn validate_transition<'g>(
    graph: &'g WorkflowGraph,
    current: &StatusRecord,
    target: StatusId,
    reason: Option<&str>,
) -> Decision<'g> {
    if current.is_final {
        return Decision::Rejected(Rejection {
            code: RejectionCode::TerminalStatus,
            detail: format!("Cannot transition from final status '{}'", current.name),
        });
    }

    let Some(edge) = graph.edge(current.id, target) else {
        return Decision::Rejected(Rejection {
            code: RejectionCode::NoSuchTransition,
            detail: format!(
                "Transition from '{}' to status ID {} is not allowed",
                current.name, target
            ),
        });
    };

    let has_reason = reason.is_some_and(|r| !r.trim().is_empty());
    if edge.requires_comment && !has_reason {
        return Decision::Rejected(Rejection {
            code: RejectionCode::MissingReason,
            detail: format!("Transition '{}' requires a reason", edge.name),
        });
    }

    Decision::Accepted(edge)
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;
    use txflow_storage::seed;

    use super::*;

    fn graph() -> WorkflowGraph {
        WorkflowGraph::new(
            seed::statuses(OffsetDateTime::UNIX_EPOCH),
            seed::transitions(OffsetDateTime::UNIX_EPOCH),
        )
    }

    fn status(graph: &WorkflowGraph, id: StatusId) -> StatusRecord {
        graph.status(id).cloned().unwrap()
    }

    fn code(decision: Decision<'_>) -> RejectionCode {
        match decision {
            Decision::Rejected(r) => r.code,
            Decision::Accepted(edge) => panic!("unexpectedly accepted '{}'", edge.name),
        }
    }

    #[test]
    fn accepts_configured_edge() {
        let g = graph();
        let created = status(&g, seed::CREATED);
        match validate_transition(&g, &created, seed::VALIDATED, None) {
            Decision::Accepted(edge) => {
                assert_eq!(edge.name, "Validate");
                assert_eq!(edge.to_status_name, "Validated");
            }
            Decision::Rejected(r) => panic!("rejected: {r}"),
        }
    }

    #[test]
    fn final_status_is_terminal_even_for_unknown_target() {
        let g = graph();
        let completed = status(&g, seed::COMPLETED);
        let decision = validate_transition(&g, &completed, StatusId(999), Some("why not"));
        match decision {
            Decision::Rejected(r) => {
                assert_eq!(r.code, RejectionCode::TerminalStatus);
                assert_eq!(r.detail, "Cannot transition from final status 'Completed'");
            }
            Decision::Accepted(_) => panic!("accepted from a final status"),
        }
    }

    #[test]
    fn skipping_a_step_is_no_such_transition() {
        let g = graph();
        let created = status(&g, seed::CREATED);
        assert_eq!(
            code(validate_transition(&g, &created, seed::COMPLETED, None)),
            RejectionCode::NoSuchTransition
        );
        assert_eq!(
            code(validate_transition(&g, &created, seed::PROCESSING, None)),
            RejectionCode::NoSuchTransition
        );
    }

    #[test]
    fn required_reason_must_not_be_blank() {
        let g = graph();
        let processing = status(&g, seed::PROCESSING);
        for reason in [None, Some(""), Some("   \t\n")] {
            assert_eq!(
                code(validate_transition(&g, &processing, seed::FAILED, reason)),
                RejectionCode::MissingReason,
                "reason {reason:?}"
            );
        }
        assert!(matches!(
            validate_transition(&g, &processing, seed::FAILED, Some("gateway timeout")),
            Decision::Accepted(_)
        ));
    }

    #[test]
    fn rollback_needs_no_reason() {
        let g = graph();
        let failed = status(&g, seed::FAILED);
        let edge = validate_transition(&g, &failed, seed::VALIDATED, None)
            .into_result()
            .unwrap();
        assert!(edge.is_rollback);
    }

    #[test]
    fn same_inputs_same_decision() {
        let g = graph();
        let processing = status(&g, seed::PROCESSING);
        let first = validate_transition(&g, &processing, seed::FAILED, None);
        let second = validate_transition(&g, &processing, seed::FAILED, None);
        assert_eq!(first, second);
    }
}
