//! Immutable workflow graph snapshot.
//!
//! A `WorkflowGraph` pairs one status set with one transition set, loaded
//! together. It is never mutated after construction; the cache replaces the
//! whole value on reload, so a reader holding an `Arc<WorkflowGraph>` sees a
//! single consistent epoch for the duration of a decision.
//!
//! Transitions are indexed one way, by source status id. Statuses do not
//! link back to their edges.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use txflow_storage::{StatusId, StatusRecord, TransitionRecord};

use crate::error::EngineError;

/// A consistency problem found while building a graph.
///
/// Issues never prevent construction. Edges named in `DanglingEdge` and
/// `EdgeFromFinalStatus` are left out of the index, so they can never be
/// taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphIssue {
    NoInitialStatus,
    MultipleInitialStatuses {
        status_ids: Vec<StatusId>,
    },
    EdgeFromFinalStatus {
        transition_id: i32,
        status_id: StatusId,
    },
    DanglingEdge {
        transition_id: i32,
        status_id: StatusId,
    },
}

impl fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphIssue::NoInitialStatus => write!(f, "no status is flagged initial"),
            GraphIssue::MultipleInitialStatuses { status_ids } => {
                write!(f, "several statuses are flagged initial: {status_ids:?}")
            }
            GraphIssue::EdgeFromFinalStatus {
                transition_id,
                status_id,
            } => write!(
                f,
                "transition {transition_id} leaves final status {status_id}"
            ),
            GraphIssue::DanglingEdge {
                transition_id,
                status_id,
            } => write!(
                f,
                "transition {transition_id} references unknown status {status_id}"
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    statuses: Vec<StatusRecord>,
    by_id: HashMap<StatusId, usize>,
    transitions: Vec<TransitionRecord>,
    outgoing: HashMap<StatusId, Vec<usize>>,
    issues: Vec<GraphIssue>,
}

impl WorkflowGraph {
    /// Build a snapshot from a status list and a transition list read in the
    /// same reload.
    pub fn new(statuses: Vec<StatusRecord>, transitions: Vec<TransitionRecord>) -> Self {
        let by_id: HashMap<StatusId, usize> = statuses
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, i))
            .collect();
        let mut issues = Vec::new();

        let initial: Vec<StatusId> = statuses
            .iter()
            .filter(|s| s.is_initial)
            .map(|s| s.id)
            .collect();
        match initial.len() {
            0 => issues.push(GraphIssue::NoInitialStatus),
            1 => {}
            _ => issues.push(GraphIssue::MultipleInitialStatuses { status_ids: initial }),
        }

        let mut kept = Vec::with_capacity(transitions.len());
        for edge in transitions {
            let missing = [edge.from_status_id, edge.to_status_id]
                .into_iter()
                .find(|id| !by_id.contains_key(id));
            if let Some(status_id) = missing {
                issues.push(GraphIssue::DanglingEdge {
                    transition_id: edge.id,
                    status_id,
                });
                continue;
            }
            if by_id
                .get(&edge.from_status_id)
                .is_some_and(|&i| statuses[i].is_final)
            {
                issues.push(GraphIssue::EdgeFromFinalStatus {
                    transition_id: edge.id,
                    status_id: edge.from_status_id,
                });
                continue;
            }
            kept.push(edge);
        }

        let mut outgoing: HashMap<StatusId, Vec<usize>> = HashMap::new();
        for (i, edge) in kept.iter().enumerate() {
            outgoing.entry(edge.from_status_id).or_default().push(i);
        }
        let order_of = |id: StatusId| by_id.get(&id).map(|&i| statuses[i].display_order);
        for edges in outgoing.values_mut() {
            edges.sort_by_key(|&i| (order_of(kept[i].to_status_id), kept[i].to_status_id));
        }

        Self {
            statuses,
            by_id,
            transitions: kept,
            outgoing,
            issues,
        }
    }

    /// All statuses, in the order the store listed them.
    pub fn statuses(&self) -> &[StatusRecord] {
        &self.statuses
    }

    /// Every edge that made it into the index.
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn status(&self, id: StatusId) -> Option<&StatusRecord> {
        self.by_id.get(&id).map(|&i| &self.statuses[i])
    }

    /// Edges leaving `from`, ordered by destination display order.
    pub fn outgoing(&self, from: StatusId) -> impl Iterator<Item = &TransitionRecord> {
        self.outgoing
            .get(&from)
            .into_iter()
            .flatten()
            .map(|&i| &self.transitions[i])
    }

    /// The single edge `from -> to`, if configured.
    pub fn edge(&self, from: StatusId, to: StatusId) -> Option<&TransitionRecord> {
        self.outgoing(from).find(|t| t.to_status_id == to)
    }

    /// The status new transactions start in.
    pub fn initial_status(&self) -> Result<&StatusRecord, EngineError> {
        let mut initial = self.statuses.iter().filter(|s| s.is_initial);
        match (initial.next(), initial.next()) {
            (Some(status), None) => Ok(status),
            (None, _) => Err(EngineError::NoInitialStatus),
            (Some(_), Some(_)) => Err(EngineError::AmbiguousInitialStatus {
                status_ids: self
                    .statuses
                    .iter()
                    .filter(|s| s.is_initial)
                    .map(|s| s.id)
                    .collect(),
            }),
        }
    }

    pub fn issues(&self) -> &[GraphIssue] {
        &self.issues
    }
}
