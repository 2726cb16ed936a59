//! Error types for the simulation crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `SimulationStateError`: engine invariant violations; these halt the run
//! - `InteractionError`: rejected user commands; these never halt a run
//! - `SessionError`: command-surface failures (wraps the others via context)

use flowlab_workflow::{ApprovalState, NodeId, NodeStatus};
use std::fmt;

/// An engine invariant was violated while advancing a run.
///
/// These are programming errors, not user-recoverable conditions. The engine
/// halts the run and resets every node to idle before returning one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationStateError {
    /// A transition named a node the working graph does not have.
    UnknownNode { node_id: NodeId },
    /// A node already had a transition scheduled.
    DoubleScheduled { node_id: NodeId },
    /// A transition would break the node lifecycle.
    IllegalTransition {
        node_id: NodeId,
        from: NodeStatus,
        to: NodeStatus,
    },
}

impl fmt::Display for SimulationStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNode { node_id } => write!(f, "transition on unknown node: {node_id}"),
            Self::DoubleScheduled { node_id } => {
                write!(f, "node {node_id} already has a scheduled transition")
            }
            Self::IllegalTransition { node_id, from, to } => {
                write!(f, "illegal transition for node {node_id}: {from} -> {to}")
            }
        }
    }
}

impl std::error::Error for SimulationStateError {}

/// A user command could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionError {
    /// The node does not exist in the working graph.
    UnknownNode { node_id: NodeId },
    /// Approval decisions only apply to approval gates.
    NotAnApprovalNode { node_id: NodeId },
    /// The gate has already been decided in this run.
    ApprovalAlreadyResolved { node_id: NodeId, state: ApprovalState },
    /// Resume was requested while the run was not paused.
    NotPaused,
}

impl fmt::Display for InteractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNode { node_id } => write!(f, "unknown node: {node_id}"),
            Self::NotAnApprovalNode { node_id } => {
                write!(f, "node {node_id} is not an approval gate")
            }
            Self::ApprovalAlreadyResolved { node_id, state } => {
                write!(f, "approval {node_id} is already resolved ({state:?})")
            }
            Self::NotPaused => write!(f, "simulation is not paused"),
        }
    }
}

impl std::error::Error for InteractionError {}

/// Errors from the session command surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The requested variant could not be loaded.
    VariantUnavailable { key: String },
    /// The run halted on an engine invariant violation.
    RunHalted,
    /// A user command was rejected.
    InvalidCommand,
    /// A replay command arrived before replay was started.
    ReplayNotStarted,
    /// The runner task has shut down.
    RunnerClosed,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VariantUnavailable { key } => write!(f, "graph variant '{key}' is unavailable"),
            Self::RunHalted => write!(f, "simulation run halted"),
            Self::InvalidCommand => write!(f, "command rejected"),
            Self::ReplayNotStarted => write!(f, "replay has not been started"),
            Self::RunnerClosed => write!(f, "simulation runner has shut down"),
        }
    }
}

impl std::error::Error for SessionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_transition_display() {
        let err = SimulationStateError::IllegalTransition {
            node_id: NodeId::from("p1"),
            from: NodeStatus::Completed,
            to: NodeStatus::Pending,
        };
        assert_eq!(err.to_string(), "illegal transition for node p1: completed -> pending");
    }

    #[test]
    fn interaction_error_display() {
        let err = InteractionError::NotAnApprovalNode {
            node_id: NodeId::from("p1"),
        };
        assert!(err.to_string().contains("not an approval gate"));
    }
}
