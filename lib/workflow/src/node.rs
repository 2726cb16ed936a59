//! Workflow node types.
//!
//! Nodes are the atomic steps of a graph. Each node has:
//! - An author-supplied id, stable across graph versions
//! - A type from a closed taxonomy that fixes its shape and default size
//! - Presentation data (label, description, icon, position, group)
//! - A runtime status owned by the simulation or replay
//! - Optional capability facets (see [`crate::facet`])

use crate::facet::{
    ApprovalState, CircuitBreaker, DraftState, ErrorDirective, MemoryType, ReasoningStep,
    RetryConfig,
};
use crate::port::SchemaTypes;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// A unique identifier for a node within a graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node ID from any string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The type of a workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Trigger,
    Process,
    Ai,
    Output,
    Subsystem,
    #[serde(rename = "ifelse")]
    IfElse,
    Merge,
    Wait,
    Iterator,
    Router,
    ErrorHandler,
    Approval,
    Agent,
    Fork,
    Join,
    ConditionAgent,
}

/// The drawn outline of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeShape {
    Rounded,
    Pill,
    Diamond,
    Hexagon,
    Circle,
    Octagon,
}

impl NodeType {
    /// Returns every node type, in taxonomy order.
    pub const ALL: [Self; 16] = [
        Self::Trigger,
        Self::Process,
        Self::Ai,
        Self::Output,
        Self::Subsystem,
        Self::IfElse,
        Self::Merge,
        Self::Wait,
        Self::Iterator,
        Self::Router,
        Self::ErrorHandler,
        Self::Approval,
        Self::Agent,
        Self::Fork,
        Self::Join,
        Self::ConditionAgent,
    ];

    /// Returns the default rendered `(width, height)` in pixels.
    #[must_use]
    pub fn default_size(self) -> (f64, f64) {
        match self {
            Self::IfElse | Self::Router | Self::ConditionAgent => (120.0, 120.0),
            Self::Merge | Self::Fork | Self::Join => (96.0, 96.0),
            Self::Trigger | Self::Output => (180.0, 72.0),
            Self::Subsystem => (240.0, 120.0),
            Self::Agent => (220.0, 100.0),
            _ => (200.0, 88.0),
        }
    }

    /// Returns the drawn outline for this type.
    #[must_use]
    pub fn shape(self) -> NodeShape {
        match self {
            Self::IfElse | Self::Router | Self::ConditionAgent => NodeShape::Diamond,
            Self::Merge | Self::Fork | Self::Join => NodeShape::Circle,
            Self::Trigger | Self::Output => NodeShape::Pill,
            Self::Agent | Self::Ai => NodeShape::Hexagon,
            Self::ErrorHandler | Self::Approval => NodeShape::Octagon,
            _ => NodeShape::Rounded,
        }
    }

    /// Returns true for nodes that select one outgoing path.
    #[must_use]
    pub fn is_branch(self) -> bool {
        matches!(self, Self::IfElse | Self::Router | Self::ConditionAgent)
    }

    /// Returns true for nodes backed by a model call.
    #[must_use]
    pub fn is_ai_like(self) -> bool {
        matches!(self, Self::Ai | Self::Agent | Self::ConditionAgent)
    }

    /// Returns the wire name of this type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Process => "process",
            Self::Ai => "ai",
            Self::Output => "output",
            Self::Subsystem => "subsystem",
            Self::IfElse => "ifelse",
            Self::Merge => "merge",
            Self::Wait => "wait",
            Self::Iterator => "iterator",
            Self::Router => "router",
            Self::ErrorHandler => "error-handler",
            Self::Approval => "approval",
            Self::Agent => "agent",
            Self::Fork => "fork",
            Self::Join => "join",
            Self::ConditionAgent => "condition-agent",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The runtime status of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Returns true if this node blocks downstream nodes.
    #[must_use]
    pub fn blocks_downstream(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Checks whether a single run may move a node from `self` to `next`.
    ///
    /// Only an explicit reset moves a node back to `idle`, and it bypasses
    /// this check.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Pending | Self::Skipped)
                | (Self::Pending, Self::Running | Self::Skipped)
                | (Self::Running, Self::Completed | Self::Failed | Self::Skipped)
        )
    }

    /// Returns the wire name of this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workflow node.
///
/// Field names follow the camelCase wire format of the authoring data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub status: NodeStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_config: Option<RetryConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreaker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_types: Option<SchemaTypes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_state: Option<ApprovalState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_reasoning_trace: Vec<ReasoningStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_tools: Vec<String>,
    #[serde(default)]
    pub mcp_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_state: Option<DraftState>,
    #[serde(default)]
    pub breakpoint: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_lane_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_lanes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<MemoryType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_directive: Option<ErrorDirective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_data: Option<JsonValue>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_color: Option<String>,
}

impl Node {
    /// Creates an idle node at the origin with no facets.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, node_type: NodeType, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type,
            label: label.into(),
            description: String::new(),
            icon: String::new(),
            x: 0.0,
            y: 0.0,
            group: None,
            status: NodeStatus::Idle,
            retry_config: None,
            circuit_breaker: None,
            schema_types: None,
            approval_state: None,
            approval_assignee: None,
            approval_deadline: None,
            agent_reasoning_trace: Vec::new(),
            agent_tools: Vec::new(),
            mcp_enabled: false,
            mcp_provider: None,
            draft_state: None,
            breakpoint: false,
            parallel_lane_id: None,
            parallel_lanes: None,
            memory_type: None,
            error_directive: None,
            condition_prompt: None,
            execution_data: None,
            pinned: false,
            custom_color: None,
        }
    }

    /// Sets the pixel position.
    #[must_use]
    pub fn at(mut self, position: impl Into<(f64, f64)>) -> Self {
        let (x, y) = position.into();
        self.x = x;
        self.y = y;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    #[must_use]
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry_config = Some(retry);
        self
    }

    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: SchemaTypes) -> Self {
        self.schema_types = Some(schema);
        self
    }

    /// Marks this node as a human approval gate.
    #[must_use]
    pub fn with_approval(mut self, assignee: impl Into<String>, deadline: impl Into<String>) -> Self {
        self.approval_state = Some(ApprovalState::Waiting);
        self.approval_assignee = Some(assignee.into());
        self.approval_deadline = Some(deadline.into());
        self
    }

    #[must_use]
    pub fn with_reasoning(mut self, trace: Vec<ReasoningStep>) -> Self {
        self.agent_reasoning_trace = trace;
        self
    }

    #[must_use]
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.agent_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_mcp(mut self, provider: impl Into<String>) -> Self {
        self.mcp_enabled = true;
        self.mcp_provider = Some(provider.into());
        self
    }

    #[must_use]
    pub fn with_draft_state(mut self, state: DraftState) -> Self {
        self.draft_state = Some(state);
        self
    }

    #[must_use]
    pub fn in_lane(mut self, lane: impl Into<String>) -> Self {
        self.parallel_lane_id = Some(lane.into());
        self
    }

    #[must_use]
    pub fn with_lanes(mut self, lanes: u32) -> Self {
        self.parallel_lanes = Some(lanes);
        self
    }

    #[must_use]
    pub fn with_memory(mut self, memory: MemoryType) -> Self {
        self.memory_type = Some(memory);
        self
    }

    #[must_use]
    pub fn with_error_directive(mut self, directive: ErrorDirective) -> Self {
        self.error_directive = Some(directive);
        self
    }

    #[must_use]
    pub fn with_condition(mut self, prompt: impl Into<String>) -> Self {
        self.condition_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn with_execution_data(mut self, data: JsonValue) -> Self {
        self.execution_data = Some(data);
        self
    }

    /// Returns the rendered `(width, height)` of this node.
    #[must_use]
    pub fn size(&self) -> (f64, f64) {
        self.node_type.default_size()
    }

    /// Returns true if this node is a human approval gate.
    #[must_use]
    pub fn is_approval_gate(&self) -> bool {
        self.node_type == NodeType::Approval || self.approval_state.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::{Backoff, BreakerStatus};

    #[test]
    fn node_type_wire_names_round_trip() {
        for ty in NodeType::ALL {
            let json = serde_json::to_string(&ty).expect("serialize");
            assert_eq!(json, format!("\"{}\"", ty.as_str()));
            let parsed: NodeType = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(parsed, ty);
        }
    }

    #[test]
    fn branch_and_ai_classification() {
        assert!(NodeType::IfElse.is_branch());
        assert!(NodeType::ConditionAgent.is_branch());
        assert!(NodeType::ConditionAgent.is_ai_like());
        assert!(!NodeType::Fork.is_branch());
        assert!(!NodeType::Process.is_ai_like());
    }

    #[test]
    fn happy_path_transitions_are_legal() {
        assert!(NodeStatus::Idle.can_transition_to(NodeStatus::Pending));
        assert!(NodeStatus::Pending.can_transition_to(NodeStatus::Running));
        assert!(NodeStatus::Running.can_transition_to(NodeStatus::Completed));
    }

    #[test]
    fn skipping_running_and_regression_are_illegal() {
        assert!(!NodeStatus::Idle.can_transition_to(NodeStatus::Running));
        assert!(!NodeStatus::Completed.can_transition_to(NodeStatus::Pending));
        assert!(!NodeStatus::Skipped.can_transition_to(NodeStatus::Idle));
        assert!(!NodeStatus::Running.can_transition_to(NodeStatus::Running));
    }

    #[test]
    fn terminal_states() {
        assert!(NodeStatus::Completed.is_terminal());
        assert!(NodeStatus::Failed.is_terminal());
        assert!(NodeStatus::Skipped.is_terminal());
        assert!(!NodeStatus::Running.is_terminal());
        assert!(NodeStatus::Failed.blocks_downstream());
        assert!(!NodeStatus::Skipped.blocks_downstream());
    }

    #[test]
    fn node_deserializes_from_authoring_format() {
        let json = serde_json::json!({
            "id": "classify",
            "type": "ai",
            "label": "Classify ticket",
            "x": 340.0,
            "y": 160.0,
            "group": "intake",
            "retryConfig": { "maxRetries": 3, "delay": 1000, "backoff": "exponential" },
            "circuitBreaker": { "status": "closed", "failures": 0, "threshold": 5 },
            "parallelLaneId": "lane-a"
        });
        let node: Node = serde_json::from_value(json).expect("deserialize");

        assert_eq!(node.id.as_str(), "classify");
        assert_eq!(node.node_type, NodeType::Ai);
        assert_eq!(node.status, NodeStatus::Idle);
        assert_eq!(node.group.as_deref(), Some("intake"));
        assert_eq!(node.retry_config.map(|r| r.backoff), Some(Backoff::Exponential));
        assert_eq!(
            node.circuit_breaker.map(|b| b.status),
            Some(BreakerStatus::Closed)
        );
        assert_eq!(node.parallel_lane_id.as_deref(), Some("lane-a"));
    }

    #[test]
    fn builder_sets_approval_facets() {
        let node = Node::new("gate", NodeType::Approval, "Manager sign-off")
            .with_approval("ops-lead", "4h");
        assert!(node.is_approval_gate());
        assert_eq!(node.approval_state, Some(ApprovalState::Waiting));
        assert_eq!(node.approval_assignee.as_deref(), Some("ops-lead"));
    }

    #[test]
    fn node_serde_roundtrip() {
        let node = Node::new("p1", NodeType::Process, "Normalize")
            .at((340.0, 0.0))
            .with_tools(["search", "crm"]);
        let json = serde_json::to_string(&node).expect("serialize");
        let parsed: Node = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(node, parsed);
    }
}
