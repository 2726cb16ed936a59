//! Read-only projection of one node for a detail panel.

use crate::engine::Simulation;
use crate::error::InteractionError;
use crate::plan::BranchDecision;
use flowlab_workflow::{
    ApprovalState, EdgeRole, Group, Node, NodeId, NodeShape, NodeStatus, PathType, PortMismatch,
    ReasoningStep, RetryDelay,
};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// One connection as seen from the inspected node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeView {
    /// The node at the other end.
    pub node: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_type: Option<PathType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub stroke: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalView {
    pub state: ApprovalState,
    pub assignee: Option<String>,
    pub deadline: Option<String>,
}

/// Everything a detail panel shows for one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInspection {
    /// The working copy, including user edits.
    pub node: Node,
    /// The displayed status. Derived from the replay position while
    /// replaying.
    pub status: NodeStatus,
    pub shape: NodeShape,
    pub size: (f64, f64),
    /// Position in the execution order; `None` for attached nodes.
    pub execution_index: Option<usize>,
    pub group: Option<Group>,
    /// The reasoning trace up to the current reveal step.
    pub reasoning: Vec<ReasoningStep>,
    pub reasoning_total: usize,
    pub retry_delays: Vec<RetryDelay>,
    pub approval: Option<ApprovalView>,
    pub execution_data: Option<JsonValue>,
    pub incoming: Vec<EdgeView>,
    pub outgoing: Vec<EdgeView>,
    /// Upstream outputs whose types do not fit this node's inputs.
    pub port_mismatches: Vec<PortMismatch>,
    pub highlighted_tools: Vec<NodeId>,
    /// The branch outcome of the current run, for branch nodes.
    pub branch: Option<BranchDecision>,
}

/// Builds the inspection of `node_id`.
///
/// `replay_status` overrides the engine's status while replay drives the
/// display; the reasoning trace then follows the derived status.
///
/// # Errors
///
/// Returns `InteractionError::UnknownNode` if the node does not exist.
pub fn inspect(
    simulation: &Simulation,
    node_id: &NodeId,
    replay_status: Option<NodeStatus>,
) -> Result<NodeInspection, InteractionError> {
    let working = simulation.working();
    let graph = simulation.graph();
    let node = working
        .get(node_id)
        .ok_or_else(|| InteractionError::UnknownNode {
            node_id: node_id.clone(),
        })?;

    let total = node.agent_reasoning_trace.len();
    let revealed = match replay_status {
        Some(NodeStatus::Completed) => total,
        Some(NodeStatus::Running) => total.min(1),
        Some(_) => 0,
        None => working.revealed(node_id),
    };

    let edge_view = |other: &NodeId, path_type: Option<PathType>, label: &Option<String>| EdgeView {
        node: other.clone(),
        path_type,
        label: label.clone(),
        stroke: path_type.map_or("solid", PathType::stroke),
    };
    let incoming = graph
        .connections()
        .filter(|conn| &conn.to == node_id)
        .map(|conn| edge_view(&conn.from, conn.path_type, &conn.label))
        .collect();
    let outgoing = graph
        .connections()
        .filter(|conn| &conn.from == node_id)
        .map(|conn| edge_view(&conn.to, conn.path_type, &conn.label))
        .collect();

    let port_mismatches = match &node.schema_types {
        Some(schema) => graph
            .predecessors(node_id, EdgeRole::Flow)
            .into_iter()
            .filter_map(|(upstream, _)| upstream.schema_types.as_ref())
            .flat_map(|upstream| upstream.mismatches_with(schema))
            .collect(),
        None => Vec::new(),
    };

    let highlighted_tools = graph
        .successors(node_id, EdgeRole::Attachment)
        .into_iter()
        .map(|(tool, _)| tool.id.clone())
        .filter(|tool| working.is_highlighted(tool))
        .collect();

    Ok(NodeInspection {
        status: replay_status.unwrap_or(node.status),
        shape: node.node_type.shape(),
        size: node.size(),
        execution_index: simulation.order().index_of(node_id),
        group: node
            .group
            .as_deref()
            .and_then(|group| graph.group(group))
            .cloned(),
        reasoning: node.agent_reasoning_trace.iter().take(revealed).cloned().collect(),
        reasoning_total: total,
        retry_delays: node.retry_config.map(|retry| retry.delays()).unwrap_or_default(),
        approval: node.approval_state.map(|state| ApprovalView {
            state,
            assignee: node.approval_assignee.clone(),
            deadline: node.approval_deadline.clone(),
        }),
        execution_data: working.execution_data(node_id),
        incoming,
        outgoing,
        port_mismatches,
        highlighted_tools,
        branch: simulation
            .plan()
            .and_then(|plan| plan.branch(node_id))
            .cloned(),
        node: node.clone(),
    })
}
