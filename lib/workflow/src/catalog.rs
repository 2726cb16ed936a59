//! The built-in catalog of graph variants.
//!
//! Every variant is laid out on the grid, and its group frames are derived
//! from the same grid cells its members occupy. Loading a variant validates
//! it and resolves its execution order; a variant that fails validation is
//! reported with the catalog key as context so callers can offer another.

use crate::connection::{Connection, PathType};
use crate::definition::{GraphDefinition, GraphMetadata, GraphVariant, VariantSummary};
use crate::error::CatalogError;
use crate::facet::{
    Backoff, CircuitBreaker, DraftState, ErrorDirective, MemoryType, ReasoningStep, RetryConfig,
};
use crate::graph::WorkflowGraph;
use crate::group::Group;
use crate::layout::GridLayout;
use crate::node::{Node, NodeType};
use crate::order::ExecutionOrder;
use crate::port::{Port, PortType, SchemaTypes};
use flowlab_core::GraphVersionId;
use rootcause::prelude::{Report, ResultExt};
use serde_json::json;
use tracing::info;

/// Padding between a group frame and the cells it spans.
const GROUP_PADDING: f64 = 24.0;

/// A validated variant ready to simulate.
#[derive(Debug, Clone)]
pub struct LoadedGraph {
    /// Identifies this loaded snapshot; a fresh load gets a fresh id.
    pub version: GraphVersionId,
    pub variant: GraphVariant,
    pub graph: WorkflowGraph,
    /// The computed topological order.
    pub order: ExecutionOrder,
    /// The authored order when present, else the computed one.
    pub presentation: ExecutionOrder,
}

/// A fixed set of graph variants.
#[derive(Debug, Clone)]
pub struct GraphCatalog {
    variants: Vec<GraphVariant>,
}

impl Default for GraphCatalog {
    fn default() -> Self {
        Self::builtin(&GridLayout::default())
    }
}

impl GraphCatalog {
    /// Creates the built-in catalog laid out with `layout`.
    #[must_use]
    pub fn builtin(layout: &GridLayout) -> Self {
        Self {
            variants: vec![
                linear(layout),
                fork_join(layout),
                support_triage(layout),
                content_pipeline(layout),
            ],
        }
    }

    /// Creates a catalog from arbitrary variants.
    #[must_use]
    pub fn from_variants(variants: Vec<GraphVariant>) -> Self {
        Self { variants }
    }

    /// Returns a summary of every variant, in catalog order.
    #[must_use]
    pub fn summaries(&self) -> Vec<VariantSummary> {
        self.variants.iter().map(VariantSummary::from).collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(|v| v.key.as_str())
    }

    #[must_use]
    pub fn variant(&self, key: &str) -> Option<&GraphVariant> {
        self.variants.iter().find(|v| v.key == key)
    }

    /// Validates a variant and resolves its execution order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::UnknownVariant` if no variant has this key, or
    /// `CatalogError::InvalidVariant` wrapping the `GraphError` that made the
    /// variant unloadable.
    pub fn load(&self, key: &str) -> Result<LoadedGraph, Report<CatalogError>> {
        let variant = self
            .variant(key)
            .ok_or_else(|| CatalogError::UnknownVariant {
                key: key.to_string(),
            })?;
        let invalid = || CatalogError::InvalidVariant {
            key: key.to_string(),
        };

        let graph = WorkflowGraph::from_definition(&variant.definition).context(invalid())?;
        let order = ExecutionOrder::resolve(&graph).context(invalid())?;
        let presentation = match &variant.authored_order {
            Some(authored) => ExecutionOrder::authored(&graph, authored).context(invalid())?,
            None => order.clone(),
        };

        let version = GraphVersionId::new();
        info!(
            variant = key,
            version = %version,
            nodes = graph.node_count(),
            connections = graph.connection_count(),
            "graph variant loaded"
        );

        Ok(LoadedGraph {
            version,
            variant: variant.clone(),
            graph,
            order,
            presentation,
        })
    }
}

fn frame(
    layout: &GridLayout,
    id: &str,
    label: &str,
    columns: std::ops::RangeInclusive<u32>,
    rows: std::ops::RangeInclusive<u32>,
    color: &str,
) -> Group {
    Group::new(id, label, layout.group_frame(columns, rows, GROUP_PADDING), color)
}

fn linear(layout: &GridLayout) -> GraphVariant {
    let definition = GraphDefinition {
        nodes: vec![
            Node::new("t1", NodeType::Trigger, "Webhook received")
                .with_icon("webhook")
                .at(layout.position(0, 0))
                .with_execution_data(json!({ "payload": { "event": "order.created" } })),
            Node::new("p1", NodeType::Process, "Normalize order")
                .with_icon("cog")
                .at(layout.position(1, 0))
                .with_schema(SchemaTypes::new(
                    vec![Port::new("payload", PortType::Object)],
                    vec![Port::new("order", PortType::Object)],
                ))
                .with_execution_data(json!({ "order": { "id": "ord_1042", "total": 129.5 } })),
            Node::new("o1", NodeType::Output, "Write to ledger")
                .with_icon("database")
                .at(layout.position(2, 0))
                .with_schema(SchemaTypes::new(
                    vec![Port::new("order", PortType::Object)],
                    vec![],
                ))
                .with_execution_data(json!({ "written": true })),
        ],
        connections: vec![Connection::new("t1", "p1"), Connection::new("p1", "o1")],
        groups: vec![],
    };

    GraphVariant::new(
        "linear",
        GraphMetadata::new("Linear pipeline")
            .with_description("Trigger, one processing step, one output")
            .with_tag("basics"),
        definition,
    )
    .with_authored_order(["t1", "p1", "o1"])
}

fn fork_join(layout: &GridLayout) -> GraphVariant {
    let lane = |id: &str, node_type: NodeType, label: &str, row: u32| {
        Node::new(id, node_type, label)
            .at(layout.position(2, row))
            .in_group("lanes")
            .in_lane(id)
    };

    let definition = GraphDefinition {
        nodes: vec![
            Node::new("start", NodeType::Trigger, "Nightly batch")
                .with_icon("clock")
                .at(layout.position(0, 1)),
            Node::new("fork", NodeType::Fork, "Fan out")
                .at(layout.position(1, 1))
                .with_lanes(3),
            lane("lane-a", NodeType::Ai, "Summarize reviews", 0)
                .with_memory(MemoryType::Summary)
                .with_execution_data(json!({ "summary": "Customers like the new checkout." })),
            lane("lane-b", NodeType::Process, "Aggregate metrics", 1)
                .with_execution_data(json!({ "orders": 412, "refunds": 7 })),
            lane("lane-c", NodeType::Agent, "Audit inventory", 2)
                .with_execution_data(json!({ "low_stock": ["sku-19", "sku-44"] })),
            Node::new("join", NodeType::Join, "Wait for all lanes").at(layout.position(3, 1)),
            Node::new("report", NodeType::Output, "Publish digest")
                .with_icon("mail")
                .at(layout.position(4, 1)),
        ],
        connections: vec![
            Connection::new("start", "fork"),
            Connection::typed("fork", "lane-a", PathType::Parallel),
            Connection::typed("fork", "lane-b", PathType::Parallel),
            Connection::typed("fork", "lane-c", PathType::Parallel),
            Connection::new("lane-a", "join"),
            Connection::new("lane-b", "join"),
            Connection::new("lane-c", "join"),
            Connection::new("join", "report"),
        ],
        groups: vec![frame(layout, "lanes", "Parallel lanes", 2..=2, 0..=2, "#6366f1")],
    };

    GraphVariant::new(
        "fork-join",
        GraphMetadata::new("Fork / join")
            .with_description("Three lanes run side by side and meet at a join barrier")
            .with_tag("parallel"),
        definition,
    )
}

fn support_triage(layout: &GridLayout) -> GraphVariant {
    let definition = GraphDefinition {
        nodes: vec![
            Node::new("ticket", NodeType::Trigger, "Ticket created")
                .with_icon("inbox")
                .at(layout.position(0, 2))
                .in_group("intake")
                .with_execution_data(json!({ "ticket": 88121, "subject": "Charged twice" })),
            Node::new("classify", NodeType::Ai, "Classify ticket")
                .with_description("Labels urgency and topic")
                .with_icon("sparkles")
                .at(layout.position(1, 2))
                .in_group("intake")
                .with_retry(RetryConfig::new(3, 1000, Backoff::Exponential))
                .with_circuit_breaker(CircuitBreaker::closed(5))
                .with_memory(MemoryType::Buffer)
                .with_error_directive(ErrorDirective::Fallback)
                .with_schema(SchemaTypes::new(
                    vec![Port::new("subject", PortType::String)],
                    vec![
                        Port::new("urgent", PortType::Boolean),
                        Port::new("topic", PortType::String),
                    ],
                ))
                .with_execution_data(json!({ "urgent": true, "topic": "billing", "confidence": 0.93 })),
            Node::new("classify-fallback", NodeType::ErrorHandler, "Fallback classifier")
                .at(layout.position(1, 3))
                .in_group("intake"),
            Node::new("route", NodeType::IfElse, "Urgent?")
                .at(layout.position(2, 2))
                .in_group("triage")
                .with_condition("urgent == true")
                .with_schema(SchemaTypes::new(
                    vec![Port::new("urgent", PortType::Boolean)],
                    vec![],
                )),
            Node::new("kb-search", NodeType::Process, "Knowledge base search")
                .with_icon("search")
                .at(layout.position(3, 0))
                .in_group("resolution"),
            Node::new("escalate", NodeType::Agent, "Billing agent")
                .with_icon("bot")
                .at(layout.position(3, 1))
                .in_group("resolution")
                .with_tools(["kb-search", "refund-api"])
                .with_mcp("stripe")
                .with_circuit_breaker(CircuitBreaker::closed(3))
                .with_draft_state(DraftState::Review)
                .with_reasoning(vec![
                    ReasoningStep::new(
                        1,
                        "The customer reports a duplicate charge.",
                        "search kb for duplicate charges",
                        "found refund policy article",
                    ),
                    ReasoningStep::new(
                        2,
                        "Policy allows automatic refunds under 200 USD.",
                        "look up both charges",
                        "two identical charges of 49 USD",
                    ),
                    ReasoningStep::new(
                        3,
                        "A refund needs a human sign-off.",
                        "draft refund request",
                        "refund of 49 USD drafted",
                    ),
                ])
                .with_execution_data(json!({ "refund": { "amount": 49, "currency": "USD" } })),
            Node::new("sign-off", NodeType::Approval, "Manager sign-off")
                .at(layout.position(4, 1))
                .in_group("resolution")
                .with_approval("support-lead", "4h"),
            Node::new("auto-reply", NodeType::Process, "Send canned reply")
                .at(layout.position(3, 3))
                .in_group("resolution"),
            Node::new("merge", NodeType::Merge, "Merge")
                .at(layout.position(5, 2))
                .in_group("delivery"),
            Node::new("respond", NodeType::Output, "Reply to customer")
                .with_icon("send")
                .at(layout.position(6, 2))
                .in_group("delivery")
                .with_execution_data(json!({ "status": "resolved" })),
        ],
        connections: vec![
            Connection::new("ticket", "classify"),
            Connection::typed("classify", "classify-fallback", PathType::Error).labeled("on error"),
            Connection::new("classify", "route"),
            Connection::typed("route", "escalate", PathType::True).labeled("urgent"),
            Connection::typed("route", "auto-reply", PathType::False).labeled("routine"),
            Connection::typed("escalate", "kb-search", PathType::Tool),
            Connection::new("escalate", "sign-off"),
            Connection::new("sign-off", "merge"),
            Connection::new("auto-reply", "merge"),
            Connection::new("merge", "respond"),
        ],
        groups: vec![
            frame(layout, "intake", "Intake", 0..=1, 2..=3, "#0ea5e9"),
            frame(layout, "triage", "Triage", 2..=2, 2..=2, "#f59e0b"),
            frame(layout, "resolution", "Resolution", 3..=4, 0..=3, "#8b5cf6"),
            frame(layout, "delivery", "Delivery", 5..=6, 2..=2, "#10b981"),
        ],
    };

    GraphVariant::new(
        "support-triage",
        GraphMetadata::new("Support triage")
            .with_description("AI classification, a branch, an agent with tools, and a human approval")
            .with_tag("ai")
            .with_tag("approval"),
        definition,
    )
    .with_authored_order([
        "ticket",
        "classify",
        "route",
        "escalate",
        "sign-off",
        "auto-reply",
        "merge",
        "respond",
    ])
}

fn content_pipeline(layout: &GridLayout) -> GraphVariant {
    let definition = GraphDefinition {
        nodes: vec![
            Node::new("schedule", NodeType::Trigger, "Weekly schedule")
                .with_icon("calendar")
                .at(layout.position(0, 1)),
            Node::new("pick-channel", NodeType::Router, "Pick channel")
                .at(layout.position(1, 1))
                .with_condition("channel of the week"),
            Node::new("draft-blog", NodeType::Ai, "Draft blog post")
                .at(layout.position(2, 0))
                .in_group("drafting")
                .with_draft_state(DraftState::Draft)
                .with_memory(MemoryType::Vector)
                .with_execution_data(json!({ "title": "Five lessons from our migration" })),
            Node::new("draft-social", NodeType::Ai, "Draft social thread")
                .at(layout.position(2, 2))
                .in_group("drafting"),
            Node::new("sections", NodeType::Iterator, "For each section")
                .at(layout.position(3, 0))
                .in_group("drafting")
                .with_execution_data(json!({ "sections": 4 })),
            Node::new("edit", NodeType::Process, "Edit section")
                .at(layout.position(4, 0))
                .in_group("drafting"),
            Node::new("cool-down", NodeType::Wait, "Hold for review window")
                .at(layout.position(5, 1)),
            Node::new("publish", NodeType::Subsystem, "Publishing system")
                .with_description("Runs the nested publishing graph")
                .at(layout.position(6, 1))
                .in_group("publishing")
                .with_draft_state(DraftState::Published),
            Node::new("archive", NodeType::Output, "Archive")
                .at(layout.position(7, 1))
                .in_group("publishing"),
        ],
        connections: vec![
            Connection::new("schedule", "pick-channel"),
            Connection::typed("pick-channel", "draft-blog", PathType::Default).labeled("blog"),
            Connection::new("pick-channel", "draft-social").labeled("social"),
            Connection::new("draft-blog", "sections"),
            Connection::new("sections", "edit"),
            Connection::typed("edit", "sections", PathType::Loop).labeled("next section"),
            Connection::new("edit", "cool-down"),
            Connection::new("draft-social", "cool-down"),
            Connection::new("cool-down", "publish"),
            Connection::new("publish", "archive"),
        ],
        groups: vec![
            frame(layout, "drafting", "Drafting", 2..=4, 0..=2, "#ec4899"),
            frame(layout, "publishing", "Publishing", 6..=7, 1..=1, "#14b8a6"),
        ],
    };

    GraphVariant::new(
        "content-pipeline",
        GraphMetadata::new("Content pipeline")
            .with_description("A router, an iterator with a loop edge, a wait, and a subsystem")
            .with_tag("content"),
        definition,
    )
}
