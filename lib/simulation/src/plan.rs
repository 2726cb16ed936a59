//! Run planning: branch selection and liveness.
//!
//! Branch nodes do not evaluate their conditions. Each one takes exactly one
//! outgoing flow edge, chosen deterministically when the run starts: the
//! `true` path, else the `default` path, else the first edge in definition
//! order. A node is dead when every incoming flow edge is dead; dead nodes are
//! skipped when the walk reaches them.

use flowlab_workflow::{
    Connection, EdgeRole, ExecutionOrder, Node, NodeId, PathType, WorkflowGraph,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The fate of one outgoing edge of a branch node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "node", rename_all = "snake_case")]
pub enum BranchOutcome {
    Taken(NodeId),
    NotTaken(NodeId),
}

impl BranchOutcome {
    #[must_use]
    pub fn target(&self) -> &NodeId {
        match self {
            Self::Taken(id) | Self::NotTaken(id) => id,
        }
    }

    #[must_use]
    pub fn is_taken(&self) -> bool {
        matches!(self, Self::Taken(_))
    }
}

/// The outcomes chosen for one branch node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchDecision {
    pub node: NodeId,
    pub outcomes: Vec<BranchOutcome>,
}

impl BranchDecision {
    /// Returns the node the branch hands off to, if it has any outgoing edge.
    #[must_use]
    pub fn taken(&self) -> Option<&NodeId> {
        self.outcomes
            .iter()
            .find(|o| o.is_taken())
            .map(BranchOutcome::target)
    }
}

/// Decisions made once per run.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    branches: Vec<BranchDecision>,
    dead: HashSet<NodeId>,
}

impl RunPlan {
    /// Resolves every branch in `order` and propagates liveness.
    #[must_use]
    pub fn new(graph: &WorkflowGraph, order: &ExecutionOrder) -> Self {
        let mut branches = Vec::new();
        let mut dead = HashSet::new();

        for id in order.iter() {
            let Some(node) = graph.get_node(id) else {
                continue;
            };

            let incoming: Vec<(&Node, &Connection)> = graph
                .predecessors(id, EdgeRole::Flow)
                .into_iter()
                .filter(|(pred, _)| order.contains(&pred.id))
                .collect();
            let live = incoming.is_empty()
                || incoming
                    .iter()
                    .any(|(pred, _)| edge_is_live(&branches, &dead, &pred.id, id));
            if !live {
                dead.insert(id.clone());
            }

            if node.node_type.is_branch() {
                let outgoing: Vec<(&Node, &Connection)> = graph
                    .successors(id, EdgeRole::Flow)
                    .into_iter()
                    .filter(|(next, _)| order.contains(&next.id))
                    .collect();
                if let Some(decision) = decide(id, &outgoing) {
                    branches.push(decision);
                }
            }
        }

        Self { branches, dead }
    }

    /// Returns every branch decision, in execution order.
    #[must_use]
    pub fn branches(&self) -> &[BranchDecision] {
        &self.branches
    }

    /// Returns the decision for one branch node.
    #[must_use]
    pub fn branch(&self, node_id: &NodeId) -> Option<&BranchDecision> {
        self.branches.iter().find(|b| &b.node == node_id)
    }

    /// Returns true if the node will run; false if it will be skipped.
    #[must_use]
    pub fn is_live(&self, node_id: &NodeId) -> bool {
        !self.dead.contains(node_id)
    }
}

fn edge_is_live(
    branches: &[BranchDecision],
    dead: &HashSet<NodeId>,
    from: &NodeId,
    to: &NodeId,
) -> bool {
    if dead.contains(from) {
        return false;
    }
    match branches.iter().find(|b| &b.node == from) {
        Some(decision) => decision.taken() == Some(to),
        None => true,
    }
}

fn decide(node: &NodeId, outgoing: &[(&Node, &Connection)]) -> Option<BranchDecision> {
    let preferred = |path: PathType| {
        outgoing
            .iter()
            .position(|(_, conn)| conn.path_type == Some(path))
    };
    let chosen = preferred(PathType::True)
        .or_else(|| preferred(PathType::Default))
        .or_else(|| (!outgoing.is_empty()).then_some(0))?;
    let taken = &outgoing[chosen].0.id;

    let mut outcomes: Vec<BranchOutcome> = Vec::with_capacity(outgoing.len());
    for (next, _) in outgoing {
        if outcomes.iter().any(|o| o.target() == &next.id) {
            continue;
        }
        outcomes.push(if &next.id == taken {
            BranchOutcome::Taken(next.id.clone())
        } else {
            BranchOutcome::NotTaken(next.id.clone())
        });
    }

    Some(BranchDecision {
        node: node.clone(),
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowlab_workflow::{GraphCatalog, GraphDefinition, NodeType};

    fn plan_for(nodes: Vec<Node>, connections: Vec<Connection>) -> RunPlan {
        let definition = GraphDefinition {
            nodes,
            connections,
            groups: vec![],
        };
        let graph = WorkflowGraph::from_definition(&definition).expect("valid");
        let order = ExecutionOrder::resolve(&graph).expect("acyclic");
        RunPlan::new(&graph, &order)
    }

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    #[test]
    fn ifelse_takes_true_path_and_kills_false_subgraph() {
        let plan = plan_for(
            vec![
                Node::new("check", NodeType::IfElse, "Check"),
                Node::new("no", NodeType::Process, "No"),
                Node::new("no-2", NodeType::Output, "No 2"),
                Node::new("yes", NodeType::Process, "Yes"),
            ],
            vec![
                Connection::typed("check", "no", PathType::False),
                Connection::new("no", "no-2"),
                Connection::typed("check", "yes", PathType::True),
            ],
        );

        let decision = plan.branch(&id("check")).expect("decision");
        assert_eq!(decision.taken(), Some(&id("yes")));
        assert!(decision.outcomes.contains(&BranchOutcome::NotTaken(id("no"))));
        assert!(plan.is_live(&id("yes")));
        assert!(!plan.is_live(&id("no")));
        assert!(!plan.is_live(&id("no-2")));
    }

    #[test]
    fn router_prefers_default_then_first() {
        let plan = plan_for(
            vec![
                Node::new("r", NodeType::Router, "Route"),
                Node::new("a", NodeType::Process, "A"),
                Node::new("b", NodeType::Process, "B"),
            ],
            vec![
                Connection::new("r", "a"),
                Connection::typed("r", "b", PathType::Default),
            ],
        );
        assert_eq!(plan.branch(&id("r")).and_then(BranchDecision::taken), Some(&id("b")));

        let plan = plan_for(
            vec![
                Node::new("r", NodeType::Router, "Route"),
                Node::new("a", NodeType::Process, "A"),
                Node::new("b", NodeType::Process, "B"),
            ],
            vec![Connection::new("r", "a"), Connection::new("r", "b")],
        );
        assert_eq!(plan.branch(&id("r")).and_then(BranchDecision::taken), Some(&id("a")));
    }

    #[test]
    fn merge_stays_live_when_any_input_is_live() {
        let plan = plan_for(
            vec![
                Node::new("check", NodeType::IfElse, "Check"),
                Node::new("yes", NodeType::Process, "Yes"),
                Node::new("no", NodeType::Process, "No"),
                Node::new("merge", NodeType::Merge, "Merge"),
            ],
            vec![
                Connection::typed("check", "yes", PathType::True),
                Connection::typed("check", "no", PathType::False),
                Connection::new("yes", "merge"),
                Connection::new("no", "merge"),
            ],
        );
        assert!(plan.is_live(&id("merge")));
        assert!(!plan.is_live(&id("no")));
    }

    #[test]
    fn fork_is_not_a_branch() {
        let plan = plan_for(
            vec![
                Node::new("f", NodeType::Fork, "Fork"),
                Node::new("a", NodeType::Process, "A"),
                Node::new("b", NodeType::Process, "B"),
            ],
            vec![
                Connection::typed("f", "a", PathType::Parallel),
                Connection::typed("f", "b", PathType::Parallel),
            ],
        );
        assert!(plan.branches().is_empty());
        assert!(plan.is_live(&id("a")));
        assert!(plan.is_live(&id("b")));
    }

    #[test]
    fn triage_variant_skips_routine_reply() {
        let loaded = GraphCatalog::default().load("support-triage").expect("loads");
        let plan = RunPlan::new(&loaded.graph, &loaded.order);
        assert!(!plan.is_live(&id("auto-reply")));
        assert!(plan.is_live(&id("escalate")));
        assert!(plan.is_live(&id("merge")));
        assert!(plan.is_live(&id("respond")));
    }
}
