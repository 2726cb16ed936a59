//! Readiness graph for simulated execution.
//!
//! Execution uses a "remaining work graph":
//! - Start with the walked nodes and the flow edges between them
//! - Remove nodes that have completed or been skipped
//! - Failed nodes get a self-edge (never become ready, block downstream)
//! - Nodes with 0 incoming edges are ready
//! - When no node is ready AND none is executing, the run is complete
//!
//! A join is ready only once every one of its lanes has been removed, which
//! makes this the fan-in barrier for fork/join regions.

use crate::connection::EdgeRole;
use crate::graph::WorkflowGraph;
use crate::node::NodeId;
use crate::order::ExecutionOrder;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

/// Tracks which walked nodes still need to run.
#[derive(Debug, Clone)]
pub struct ReadinessGraph {
    /// Node weights are NodeIds, edge weights are ().
    graph: DiGraph<NodeId, ()>,
    /// Map from NodeId to graph index for O(1) lookup.
    node_to_index: HashMap<NodeId, NodeIndex>,
    /// Execution order position, used to sort ready nodes.
    rank: HashMap<NodeId, usize>,
    executing: HashSet<NodeId>,
    /// Nodes that have failed (have self-edges, block downstream).
    failed: HashSet<NodeId>,
}

impl ReadinessGraph {
    /// Builds the readiness graph for the nodes of `order`.
    #[must_use]
    pub fn new(workflow: &WorkflowGraph, order: &ExecutionOrder) -> Self {
        let mut graph = DiGraph::with_capacity(order.len(), 0);
        let mut node_to_index = HashMap::with_capacity(order.len());
        let mut rank = HashMap::with_capacity(order.len());

        for (position, id) in order.iter().enumerate() {
            let idx = graph.add_node(id.clone());
            node_to_index.insert(id.clone(), idx);
            rank.insert(id.clone(), position);
        }

        for id in order.iter() {
            let source_idx = node_to_index[id];
            for (successor, _) in workflow.successors(id, EdgeRole::Flow) {
                if let Some(&target_idx) = node_to_index.get(&successor.id) {
                    graph.add_edge(source_idx, target_idx, ());
                }
            }
        }

        Self {
            graph,
            node_to_index,
            rank,
            executing: HashSet::new(),
            failed: HashSet::new(),
        }
    }

    /// Marks a node as currently executing.
    ///
    /// The node must still be in the graph.
    pub fn mark_executing(&mut self, node_id: &NodeId) {
        if self.node_to_index.contains_key(node_id) {
            self.executing.insert(node_id.clone());
        }
    }

    /// Marks a node as completed and removes it from the graph.
    ///
    /// This unblocks downstream nodes that were waiting for it.
    pub fn mark_completed(&mut self, node_id: &NodeId) {
        self.executing.remove(node_id);
        if let Some(idx) = self.node_to_index.remove(node_id) {
            self.graph.remove_node(idx);
            // Removal swaps the last index into the hole.
            self.rebuild_index_map();
        }
    }

    /// Marks a node as failed.
    ///
    /// The self-edge keeps it from ever becoming ready and blocks everything
    /// downstream.
    pub fn mark_failed(&mut self, node_id: &NodeId) {
        self.executing.remove(node_id);
        if let Some(&idx) = self.node_to_index.get(node_id) {
            if self.failed.insert(node_id.clone()) {
                self.graph.add_edge(idx, idx, ());
            }
        }
    }

    /// Marks a node as skipped. Skipped nodes unblock downstream like
    /// completed ones.
    pub fn mark_skipped(&mut self, node_id: &NodeId) {
        self.mark_completed(node_id);
    }

    /// Returns nodes with no remaining predecessors that are not executing,
    /// in execution order.
    #[must_use]
    pub fn ready_nodes(&self) -> Vec<NodeId> {
        let mut ready: Vec<NodeId> = self
            .graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .edges_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .filter_map(|idx| self.graph.node_weight(idx))
            .filter(|id| !self.executing.contains(*id))
            .cloned()
            .collect();
        ready.sort_by_key(|id| self.rank.get(id).copied().unwrap_or(usize::MAX));
        ready
    }

    /// Returns true if nothing is ready and nothing is executing.
    ///
    /// This happens either when every node completed or was skipped, or when
    /// the remaining nodes are all blocked by failures.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.executing.is_empty() && self.ready_nodes().is_empty()
    }

    /// Returns all nodes blocked by failures, in execution order.
    ///
    /// A node is blocked if it is reachable from a failed node but not failed
    /// itself.
    #[must_use]
    pub fn blocked_nodes(&self) -> Vec<NodeId> {
        let mut blocked = HashSet::new();

        for failed_id in &self.failed {
            let Some(&start_idx) = self.node_to_index.get(failed_id) else {
                continue;
            };
            let mut to_visit = vec![start_idx];
            while let Some(idx) = to_visit.pop() {
                for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                    let target_idx = edge.target();
                    if target_idx == idx {
                        continue;
                    }
                    let Some(target_id) = self.graph.node_weight(target_idx) else {
                        continue;
                    };
                    if !self.failed.contains(target_id) && blocked.insert(target_id.clone()) {
                        to_visit.push(target_idx);
                    }
                }
            }
        }

        let mut blocked: Vec<NodeId> = blocked.into_iter().collect();
        blocked.sort_by_key(|id| self.rank.get(id).copied().unwrap_or(usize::MAX));
        blocked
    }

    fn rebuild_index_map(&mut self) {
        self.node_to_index.clear();
        for idx in self.graph.node_indices() {
            if let Some(node_id) = self.graph.node_weight(idx) {
                self.node_to_index.insert(node_id.clone(), idx);
            }
        }
    }
}
