//! Simulation events and status snapshots.
//!
//! Every change the engine makes to the working graph is reported as a
//! [`SimulationEvent`]. Events carry the virtual time they happened at, so a
//! consumer can rebuild the animation without a wall clock.

use crate::plan::BranchDecision;
use chrono::{DateTime, Utc};
use flowlab_core::{GraphVersionId, RunId};
use flowlab_workflow::{ApprovalState, BreakerStatus, NodeId, NodeStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// How a run treats breakpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Breakpoints are ignored.
    #[default]
    Normal,
    /// The run pauses before a breakpoint node enters `pending`.
    Debug,
}

/// A user's decision on an approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

impl From<ApprovalDecision> for ApprovalState {
    fn from(decision: ApprovalDecision) -> Self {
        match decision {
            ApprovalDecision::Approved => Self::Approved,
            ApprovalDecision::Rejected => Self::Rejected,
        }
    }
}

/// How a finished run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every walked node completed or was skipped by a branch.
    Completed,
    /// An approval gate was rejected; its downstream was skipped.
    Rejected { node: NodeId },
    /// An engine invariant failed; every node was reset to idle.
    Halted,
}

/// The overall state of the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EngineState {
    /// No run in progress; every node is idle.
    #[default]
    Idle,
    Running,
    /// Waiting in debug mode before `node` enters `pending`.
    Paused { node: NodeId },
    /// Stopped by the user; nodes keep their last status.
    Stopped,
    Finished { outcome: RunOutcome },
}

impl EngineState {
    /// Returns true while a run can still make progress.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused { .. })
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }
}

/// Events emitted by the engine and the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimulationEvent {
    /// A graph variant was selected and a fresh working copy created.
    VariantSelected {
        key: String,
        graph_version: GraphVersionId,
        at_ms: u64,
    },
    RunStarted {
        run_id: RunId,
        graph_version: GraphVersionId,
        mode: RunMode,
        at_ms: u64,
    },
    /// A branch node's outcome was fixed for this run.
    BranchResolved {
        run_id: RunId,
        decision: BranchDecision,
        at_ms: u64,
    },
    NodeTransitioned {
        run_id: RunId,
        node_id: NodeId,
        from: NodeStatus,
        to: NodeStatus,
        at_ms: u64,
    },
    BreakerChanged {
        run_id: RunId,
        node_id: NodeId,
        status: BreakerStatus,
        at_ms: u64,
    },
    ApprovalChanged {
        run_id: Option<RunId>,
        node_id: NodeId,
        state: ApprovalState,
        at_ms: u64,
    },
    ToolHighlighted {
        run_id: RunId,
        node_id: NodeId,
        tool_id: NodeId,
        highlighted: bool,
        at_ms: u64,
    },
    ReasoningRevealed {
        run_id: RunId,
        node_id: NodeId,
        steps: usize,
        at_ms: u64,
    },
    RunPaused {
        run_id: RunId,
        node_id: NodeId,
        at_ms: u64,
    },
    RunResumed {
        run_id: RunId,
        at_ms: u64,
    },
    RunStopped {
        run_id: RunId,
        at_ms: u64,
    },
    /// An engine invariant failed and the run was abandoned.
    RunHalted {
        run_id: RunId,
        error: String,
        at_ms: u64,
    },
    RunFinished {
        run_id: RunId,
        outcome: RunOutcome,
        at_ms: u64,
    },
    /// Every node returned to idle and transient facets were cleared.
    NodesReset { at_ms: u64 },
    /// The replay position moved.
    ReplayMoved {
        position: usize,
        playing: bool,
        at_ms: u64,
    },
}

impl SimulationEvent {
    /// Returns the run this event belongs to, if any.
    #[must_use]
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::BranchResolved { run_id, .. }
            | Self::NodeTransitioned { run_id, .. }
            | Self::BreakerChanged { run_id, .. }
            | Self::ToolHighlighted { run_id, .. }
            | Self::ReasoningRevealed { run_id, .. }
            | Self::RunPaused { run_id, .. }
            | Self::RunResumed { run_id, .. }
            | Self::RunStopped { run_id, .. }
            | Self::RunHalted { run_id, .. }
            | Self::RunFinished { run_id, .. } => Some(*run_id),
            Self::ApprovalChanged { run_id, .. } => *run_id,
            Self::VariantSelected { .. } | Self::NodesReset { .. } | Self::ReplayMoved { .. } => {
                None
            }
        }
    }

    /// Returns the virtual time of this event.
    #[must_use]
    pub fn at_ms(&self) -> u64 {
        match self {
            Self::VariantSelected { at_ms, .. }
            | Self::RunStarted { at_ms, .. }
            | Self::BranchResolved { at_ms, .. }
            | Self::NodeTransitioned { at_ms, .. }
            | Self::BreakerChanged { at_ms, .. }
            | Self::ApprovalChanged { at_ms, .. }
            | Self::ToolHighlighted { at_ms, .. }
            | Self::ReasoningRevealed { at_ms, .. }
            | Self::RunPaused { at_ms, .. }
            | Self::RunResumed { at_ms, .. }
            | Self::RunStopped { at_ms, .. }
            | Self::RunHalted { at_ms, .. }
            | Self::RunFinished { at_ms, .. }
            | Self::NodesReset { at_ms }
            | Self::ReplayMoved { at_ms, .. } => *at_ms,
        }
    }
}

/// A read-only view of the working graph for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub run_id: Option<RunId>,
    pub graph_version: GraphVersionId,
    pub variant: String,
    /// Virtual time the snapshot was taken at.
    pub at_ms: u64,
    pub state: EngineState,
    pub statuses: BTreeMap<NodeId, NodeStatus>,
    /// Authored data plus timing for every completed node.
    pub execution_data: BTreeMap<NodeId, JsonValue>,
    /// Set while replay drives the displayed statuses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_position: Option<usize>,
    pub captured_at: DateTime<Utc>,
}

impl StatusSnapshot {
    #[must_use]
    pub fn status(&self, node_id: &NodeId) -> Option<NodeStatus> {
        self.statuses.get(node_id).copied()
    }

    /// Returns true if every node has the given status.
    #[must_use]
    pub fn all(&self, status: NodeStatus) -> bool {
        self.statuses.values().all(|s| *s == status)
    }
}
