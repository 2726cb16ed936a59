//! The mutable working copy of a loaded graph.
//!
//! The engine clones the canonical nodes into a `WorkingGraph` and only ever
//! mutates the clone. The engine owns statuses and transient facets (breaker
//! pulses, approval state, tool highlights, reasoning reveal); the interaction
//! layer owns pin, color, breakpoint and error directive.

use crate::error::{InteractionError, SimulationStateError};
use flowlab_workflow::{
    ApprovalState, BreakerStatus, ErrorDirective, Node, NodeId, NodeStatus, WorkflowGraph,
};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use std::collections::{BTreeSet, HashMap};

/// When a node ran, in virtual milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTiming {
    pub started_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
}

impl NodeTiming {
    #[must_use]
    pub fn duration_ms(&self) -> Option<u64> {
        Some(self.completed_at_ms?.saturating_sub(self.started_at_ms?))
    }
}

#[derive(Debug, Clone)]
pub struct WorkingGraph {
    nodes: Vec<Node>,
    index: HashMap<NodeId, usize>,
    highlighted: BTreeSet<NodeId>,
    revealed: HashMap<NodeId, usize>,
    timings: HashMap<NodeId, NodeTiming>,
}

impl WorkingGraph {
    /// Clones the graph's nodes with every status reset to idle.
    #[must_use]
    pub fn new(graph: &WorkflowGraph) -> Self {
        let nodes: Vec<Node> = graph.nodes().cloned().collect();
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.clone(), i))
            .collect();
        let mut working = Self {
            nodes,
            index,
            highlighted: BTreeSet::new(),
            revealed: HashMap::new(),
            timings: HashMap::new(),
        };
        working.reset();
        working
    }

    #[must_use]
    pub fn get(&self, node_id: &NodeId) -> Option<&Node> {
        self.index.get(node_id).map(|&i| &self.nodes[i])
    }

    fn get_mut(&mut self, node_id: &NodeId) -> Option<&mut Node> {
        let i = *self.index.get(node_id)?;
        self.nodes.get_mut(i)
    }

    fn edit(&mut self, node_id: &NodeId) -> Result<&mut Node, InteractionError> {
        self.get_mut(node_id)
            .ok_or_else(|| InteractionError::UnknownNode {
                node_id: node_id.clone(),
            })
    }

    /// Returns all nodes in definition order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    #[must_use]
    pub fn status(&self, node_id: &NodeId) -> Option<NodeStatus> {
        self.get(node_id).map(|node| node.status)
    }

    /// Moves a node along its lifecycle and returns the previous status.
    ///
    /// # Errors
    ///
    /// Returns `UnknownNode` or `IllegalTransition`.
    pub fn transition(
        &mut self,
        node_id: &NodeId,
        to: NodeStatus,
    ) -> Result<NodeStatus, SimulationStateError> {
        let node = self
            .get_mut(node_id)
            .ok_or_else(|| SimulationStateError::UnknownNode {
                node_id: node_id.clone(),
            })?;
        let from = node.status;
        if !from.can_transition_to(to) {
            return Err(SimulationStateError::IllegalTransition {
                node_id: node_id.clone(),
                from,
                to,
            });
        }
        node.status = to;
        Ok(from)
    }

    /// Returns every node to idle and clears transient facets.
    ///
    /// User edits (pin, color, breakpoint, error directive) are kept.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.status = NodeStatus::Idle;
            if node.is_approval_gate() {
                node.approval_state = Some(ApprovalState::Waiting);
            }
            if let Some(breaker) = node.circuit_breaker.as_mut() {
                breaker.status = BreakerStatus::Closed;
            }
        }
        self.highlighted.clear();
        self.revealed.clear();
        self.timings.clear();
    }

    /// Sets a node's breaker status. Returns false if it has no breaker.
    pub fn set_breaker(&mut self, node_id: &NodeId, status: BreakerStatus) -> bool {
        match self.get_mut(node_id).and_then(|n| n.circuit_breaker.as_mut()) {
            Some(breaker) => {
                breaker.status = status;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn approval(&self, node_id: &NodeId) -> Option<ApprovalState> {
        self.get(node_id).and_then(|n| n.approval_state)
    }

    pub fn set_approval(&mut self, node_id: &NodeId, state: ApprovalState) {
        if let Some(node) = self.get_mut(node_id) {
            node.approval_state = Some(state);
        }
    }

    /// Highlights or clears a tool. Returns true if anything changed.
    pub fn set_highlight(&mut self, tool_id: &NodeId, on: bool) -> bool {
        if on {
            self.highlighted.insert(tool_id.clone())
        } else {
            self.highlighted.remove(tool_id)
        }
    }

    #[must_use]
    pub fn is_highlighted(&self, tool_id: &NodeId) -> bool {
        self.highlighted.contains(tool_id)
    }

    pub fn highlighted(&self) -> impl Iterator<Item = &NodeId> {
        self.highlighted.iter()
    }

    /// Raises the number of revealed reasoning steps. Never lowers it.
    pub fn reveal(&mut self, node_id: &NodeId, steps: usize) {
        let revealed = self.revealed.entry(node_id.clone()).or_default();
        *revealed = (*revealed).max(steps);
    }

    #[must_use]
    pub fn revealed(&self, node_id: &NodeId) -> usize {
        self.revealed.get(node_id).copied().unwrap_or(0)
    }

    pub fn record_start(&mut self, node_id: &NodeId, at_ms: u64) {
        self.timings.entry(node_id.clone()).or_default().started_at_ms = Some(at_ms);
    }

    pub fn record_completion(&mut self, node_id: &NodeId, at_ms: u64) {
        self.timings.entry(node_id.clone()).or_default().completed_at_ms = Some(at_ms);
    }

    #[must_use]
    pub fn timing(&self, node_id: &NodeId) -> Option<NodeTiming> {
        self.timings.get(node_id).copied()
    }

    /// Returns the data a completed node exposes: its authored execution
    /// data plus when it ran.
    #[must_use]
    pub fn execution_data(&self, node_id: &NodeId) -> Option<JsonValue> {
        let node = self.get(node_id)?;
        if node.status != NodeStatus::Completed {
            return None;
        }
        let timing = self.timing(node_id).unwrap_or_default();
        Some(json!({
            "data": node.execution_data.clone().unwrap_or(JsonValue::Null),
            "startedAtMs": timing.started_at_ms,
            "completedAtMs": timing.completed_at_ms,
            "durationMs": timing.duration_ms(),
        }))
    }

    /// Flips the pin flag and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns `InteractionError::UnknownNode` if the node does not exist.
    pub fn toggle_pin(&mut self, node_id: &NodeId) -> Result<bool, InteractionError> {
        let node = self.edit(node_id)?;
        node.pinned = !node.pinned;
        Ok(node.pinned)
    }

    /// Sets or clears the custom color.
    ///
    /// # Errors
    ///
    /// Returns `InteractionError::UnknownNode` if the node does not exist.
    pub fn set_custom_color(
        &mut self,
        node_id: &NodeId,
        color: Option<String>,
    ) -> Result<(), InteractionError> {
        self.edit(node_id)?.custom_color = color;
        Ok(())
    }

    /// Flips the breakpoint flag and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns `InteractionError::UnknownNode` if the node does not exist.
    pub fn toggle_breakpoint(&mut self, node_id: &NodeId) -> Result<bool, InteractionError> {
        let node = self.edit(node_id)?;
        node.breakpoint = !node.breakpoint;
        Ok(node.breakpoint)
    }

    /// Sets or clears the error directive.
    ///
    /// # Errors
    ///
    /// Returns `InteractionError::UnknownNode` if the node does not exist.
    pub fn set_error_directive(
        &mut self,
        node_id: &NodeId,
        directive: Option<ErrorDirective>,
    ) -> Result<(), InteractionError> {
        self.edit(node_id)?.error_directive = directive;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowlab_workflow::GraphCatalog;

    fn triage() -> (WorkflowGraph, WorkingGraph) {
        let loaded = GraphCatalog::default().load("support-triage").expect("loads");
        let working = WorkingGraph::new(&loaded.graph);
        (loaded.graph, working)
    }

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    #[test]
    fn transition_enforces_lifecycle() {
        let (_, mut working) = triage();
        let ticket = id("ticket");
        assert_eq!(working.transition(&ticket, NodeStatus::Pending), Ok(NodeStatus::Idle));
        assert!(matches!(
            working.transition(&ticket, NodeStatus::Completed),
            Err(SimulationStateError::IllegalTransition { .. })
        ));
        assert!(matches!(
            working.transition(&id("ghost"), NodeStatus::Pending),
            Err(SimulationStateError::UnknownNode { .. })
        ));
    }

    #[test]
    fn reset_restores_baseline_but_keeps_user_edits() {
        let (_, mut working) = triage();
        let classify = id("classify");
        let gate = id("sign-off");

        working.transition(&classify, NodeStatus::Pending).expect("legal");
        working.set_breaker(&classify, BreakerStatus::HalfOpen);
        working.set_approval(&gate, ApprovalState::Approved);
        working.set_highlight(&id("kb-search"), true);
        working.reveal(&id("escalate"), 2);
        working.toggle_pin(&classify).expect("known");
        working
            .set_custom_color(&classify, Some("#ff0000".to_string()))
            .expect("known");

        working.reset();

        let node = working.get(&classify).expect("node");
        assert_eq!(node.status, NodeStatus::Idle);
        assert_eq!(node.circuit_breaker.map(|b| b.status), Some(BreakerStatus::Closed));
        assert_eq!(working.approval(&gate), Some(ApprovalState::Waiting));
        assert_eq!(working.highlighted().count(), 0);
        assert_eq!(working.revealed(&id("escalate")), 0);
        assert!(node.pinned);
        assert_eq!(node.custom_color.as_deref(), Some("#ff0000"));
    }

    #[test]
    fn edits_never_touch_the_canonical_graph() {
        let (graph, mut working) = triage();
        working.toggle_breakpoint(&id("route")).expect("known");
        working
            .set_error_directive(&id("classify"), Some(ErrorDirective::Escalate))
            .expect("known");

        assert!(!graph.get_node(&id("route")).expect("node").breakpoint);
        assert_eq!(
            graph.get_node(&id("classify")).expect("node").error_directive,
            Some(ErrorDirective::Fallback)
        );
    }

    #[test]
    fn edits_on_unknown_nodes_fail() {
        let (_, mut working) = triage();
        assert_eq!(
            working.toggle_pin(&id("ghost")),
            Err(InteractionError::UnknownNode { node_id: id("ghost") })
        );
    }

    #[test]
    fn execution_data_only_for_completed_nodes() {
        let (_, mut working) = triage();
        let ticket = id("ticket");
        assert!(working.execution_data(&ticket).is_none());

        working.transition(&ticket, NodeStatus::Pending).expect("legal");
        working.transition(&ticket, NodeStatus::Running).expect("legal");
        working.record_start(&ticket, 500);
        working.transition(&ticket, NodeStatus::Completed).expect("legal");
        working.record_completion(&ticket, 1100);

        let data = working.execution_data(&ticket).expect("completed");
        assert_eq!(data["durationMs"], 600);
        assert_eq!(data["data"]["ticket"], 88121);
    }

    #[test]
    fn reveal_never_decreases() {
        let (_, mut working) = triage();
        let agent = id("escalate");
        working.reveal(&agent, 2);
        working.reveal(&agent, 1);
        assert_eq!(working.revealed(&agent), 2);
    }
}
