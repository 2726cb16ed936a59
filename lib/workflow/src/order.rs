//! Execution order resolution.
//!
//! The order is a topological sort of the walked nodes over flow edges,
//! computed once per graph load. Nodes with no ordering constraint between
//! them keep their definition order, so fork lanes come out in a stable,
//! reproducible sequence. Attached helper nodes (error handlers, tools) are
//! not walked and never appear in the order.
//!
//! A hand-authored order may be supplied for presentation. It is accepted
//! only if it lists the same nodes and respects every flow edge.

use crate::connection::EdgeRole;
use crate::error::GraphError;
use crate::graph::WorkflowGraph;
use crate::node::NodeId;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// One full simulated pass over a graph, as an ordered list of node ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOrder {
    sequence: Vec<NodeId>,
    index: HashMap<NodeId, usize>,
}

impl ExecutionOrder {
    /// Computes the topological order of a graph.
    ///
    /// Ties are broken by definition position.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::CycleDetected` if the walked nodes cannot be
    /// fully ordered.
    pub fn resolve(graph: &WorkflowGraph) -> Result<Self, GraphError> {
        let walked = walked_nodes(graph);
        let mut in_degree: HashMap<&NodeId, usize> = walked.iter().map(|id| (id, 0)).collect();
        for id in &walked {
            for next in flow_successors(graph, id, &walked) {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree += 1;
                }
            }
        }

        let position = |id: &NodeId| graph.definition_position(id).unwrap_or(usize::MAX);
        let mut ready: BinaryHeap<Reverse<(usize, &NodeId)>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| Reverse((position(*id), *id)))
            .collect();

        let mut sequence = Vec::with_capacity(walked.len());
        while let Some(Reverse((_, id))) = ready.pop() {
            sequence.push(id.clone());
            for next in flow_successors(graph, id, &walked) {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse((position(next), next)));
                    }
                }
            }
        }

        if sequence.len() < walked.len() {
            let placed: HashSet<&NodeId> = sequence.iter().collect();
            let mut involved: Vec<NodeId> = walked
                .iter()
                .filter(|id| !placed.contains(id))
                .cloned()
                .collect();
            involved.sort_by_key(|id| position(id));
            return Err(GraphError::CycleDetected { involved });
        }

        Ok(Self::from_sequence(sequence))
    }

    /// Validates a hand-authored order against the graph.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::InvalidAuthoredOrder` if the authored order
    /// repeats or omits a walked node, names a node that is not walked, or
    /// places a node before one of its flow predecessors.
    pub fn authored(graph: &WorkflowGraph, authored: &[NodeId]) -> Result<Self, GraphError> {
        let walked = walked_nodes(graph);
        let invalid = |reason: String| GraphError::InvalidAuthoredOrder { reason };

        let mut index = HashMap::with_capacity(authored.len());
        for (i, id) in authored.iter().enumerate() {
            if !walked.contains(id) {
                return Err(invalid(format!("{id} is not a walked node of this graph")));
            }
            if index.insert(id, i).is_some() {
                return Err(invalid(format!("{id} appears more than once")));
            }
        }
        if let Some(missing) = walked.iter().find(|id| !index.contains_key(id)) {
            return Err(invalid(format!("{missing} is missing")));
        }

        for id in authored {
            for next in flow_successors(graph, id, &walked) {
                if index[next] < index[id] {
                    return Err(invalid(format!("{next} is placed before its predecessor {id}")));
                }
            }
        }

        Ok(Self::from_sequence(authored.to_vec()))
    }

    fn from_sequence(sequence: Vec<NodeId>) -> Self {
        let index = sequence
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        Self { sequence, index }
    }

    /// Returns the position of a node in the order.
    #[must_use]
    pub fn index_of(&self, node_id: &NodeId) -> Option<usize> {
        self.index.get(node_id).copied()
    }

    /// Returns true if the node is walked.
    #[must_use]
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.index.contains_key(node_id)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[NodeId] {
        &self.sequence
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.sequence.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// Returns the ids of every node that takes part in the walk.
fn walked_nodes(graph: &WorkflowGraph) -> HashSet<NodeId> {
    graph
        .nodes()
        .filter(|node| !graph.is_attached(&node.id))
        .map(|node| node.id.clone())
        .collect()
}

/// Returns the flow successors of `id` that are themselves walked.
fn flow_successors<'g>(
    graph: &'g WorkflowGraph,
    id: &NodeId,
    walked: &HashSet<NodeId>,
) -> Vec<&'g NodeId> {
    graph
        .successors(id, EdgeRole::Flow)
        .into_iter()
        .filter(|(node, _)| walked.contains(&node.id))
        .map(|(node, _)| &node.id)
        .collect()
}
