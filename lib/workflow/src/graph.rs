//! Workflow graph implementation using petgraph.
//!
//! A `WorkflowGraph` is an immutable, validated snapshot of a
//! [`GraphDefinition`]: nodes are petgraph nodes in definition order,
//! connections are petgraph edges, and groups ride along for layout.
//! Loading fails fast on dangling connections and on cycles formed by
//! non-loop edges.

use crate::connection::{Connection, EdgeRole};
use crate::definition::GraphDefinition;
use crate::error::GraphError;
use crate::group::Group;
use crate::node::{Node, NodeId};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

/// A validated workflow graph.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    /// The underlying directed graph. Node indices follow definition order.
    graph: DiGraph<Node, Connection>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    node_index_map: HashMap<NodeId, NodeIndex>,
    groups: Vec<Group>,
    /// Nodes that only run on behalf of another step.
    attached: HashSet<NodeId>,
}

impl WorkflowGraph {
    /// Builds and validates a graph from its definition.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Two nodes share an id
    /// - A node references an unknown group
    /// - A connection references a missing node
    /// - Non-loop connections form a cycle
    pub fn from_definition(definition: &GraphDefinition) -> Result<Self, GraphError> {
        let mut graph = DiGraph::with_capacity(
            definition.nodes.len(),
            definition.connections.len(),
        );
        let mut node_index_map = HashMap::with_capacity(definition.nodes.len());

        for node in &definition.nodes {
            if node_index_map.contains_key(&node.id) {
                return Err(GraphError::DuplicateNode {
                    node_id: node.id.clone(),
                });
            }
            if let Some(group) = &node.group {
                if !definition.groups.iter().any(|g| &g.id == group) {
                    return Err(GraphError::UnknownGroup {
                        node_id: node.id.clone(),
                        group: group.clone(),
                    });
                }
            }
            let index = graph.add_node(node.clone());
            node_index_map.insert(node.id.clone(), index);
        }

        for connection in &definition.connections {
            let lookup = |id: &NodeId| {
                node_index_map
                    .get(id)
                    .copied()
                    .ok_or_else(|| GraphError::DanglingConnection {
                        from: connection.from.clone(),
                        to: connection.to.clone(),
                        missing: id.clone(),
                    })
            };
            let source = lookup(&connection.from)?;
            let target = lookup(&connection.to)?;
            graph.add_edge(source, target, connection.clone());
        }

        let attached = attached_nodes(&graph)
            .into_iter()
            .map(|idx| graph[idx].id.clone())
            .collect();
        let workflow = Self {
            graph,
            node_index_map,
            groups: definition.groups.clone(),
            attached,
        };
        workflow.check_acyclic()?;
        Ok(workflow)
    }

    /// Rejects cycles among non-loop edges, naming the nodes involved.
    fn check_acyclic(&self) -> Result<(), GraphError> {
        let mut ordering: DiGraph<(), ()> = DiGraph::with_capacity(self.graph.node_count(), 0);
        for _ in self.graph.node_indices() {
            ordering.add_node(());
        }
        for edge in self.graph.edge_references() {
            if edge.weight().role() != EdgeRole::Back {
                ordering.add_edge(edge.source(), edge.target(), ());
            }
        }

        let mut involved: Vec<NodeIndex> = petgraph::algo::tarjan_scc(&ordering)
            .into_iter()
            .filter(|scc| scc.len() > 1 || ordering.contains_edge(scc[0], scc[0]))
            .flatten()
            .collect();
        if involved.is_empty() {
            return Ok(());
        }

        involved.sort();
        Err(GraphError::CycleDetected {
            involved: involved
                .into_iter()
                .map(|idx| self.graph[idx].id.clone())
                .collect(),
        })
    }

    /// Reproduces the canonical definition this graph was built from.
    #[must_use]
    pub fn to_definition(&self) -> GraphDefinition {
        GraphDefinition {
            nodes: self.graph.node_weights().cloned().collect(),
            connections: self.graph.edge_weights().cloned().collect(),
            groups: self.groups.clone(),
        }
    }

    /// Returns a reference to a node by its ID.
    #[must_use]
    pub fn get_node(&self, node_id: &NodeId) -> Option<&Node> {
        let index = self.node_index_map.get(node_id)?;
        self.graph.node_weight(*index)
    }

    /// Returns true if the graph has a node with this id.
    #[must_use]
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.node_index_map.contains_key(node_id)
    }

    /// Returns the position of a node in the definition's node array.
    #[must_use]
    pub fn definition_position(&self, node_id: &NodeId) -> Option<usize> {
        self.node_index_map.get(node_id).map(|idx| idx.index())
    }

    /// Returns all nodes in definition order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Returns all connections in definition order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.graph.edge_weights()
    }

    /// Returns all groups.
    #[must_use]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Returns a group by id.
    #[must_use]
    pub fn group(&self, group_id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of connections in the graph.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the downstream nodes reached through edges of the given role.
    pub fn successors(&self, node_id: &NodeId, role: EdgeRole) -> Vec<(&Node, &Connection)> {
        self.neighbors(node_id, role, Direction::Outgoing)
    }

    /// Returns the upstream nodes reached through edges of the given role.
    pub fn predecessors(&self, node_id: &NodeId, role: EdgeRole) -> Vec<(&Node, &Connection)> {
        self.neighbors(node_id, role, Direction::Incoming)
    }

    fn neighbors(
        &self,
        node_id: &NodeId,
        role: EdgeRole,
        direction: Direction,
    ) -> Vec<(&Node, &Connection)> {
        let Some(&index) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };

        // petgraph yields edges newest-first; flip back to definition order.
        let mut found: Vec<_> = self
            .graph
            .edges_directed(index, direction)
            .filter(|edge| edge.weight().role() == role)
            .filter_map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                Some((edge.id(), self.graph.node_weight(other)?, edge.weight()))
            })
            .collect();
        found.sort_by_key(|(edge_id, _, _)| *edge_id);
        found.into_iter().map(|(_, node, conn)| (node, conn)).collect()
    }

    /// Returns true if the node hangs off another step: every incoming
    /// non-loop edge is an attachment edge (error, tool, mcp) or a flow edge
    /// out of a node that is itself attached.
    #[must_use]
    pub fn is_attached(&self, node_id: &NodeId) -> bool {
        self.attached.contains(node_id)
    }
}

/// Grows the attached set until no more nodes join it, so a handler's own
/// flow successors are attached too.
fn attached_nodes(graph: &DiGraph<Node, Connection>) -> HashSet<NodeIndex> {
    let mut attached = HashSet::new();
    loop {
        let before = attached.len();
        for index in graph.node_indices() {
            if attached.contains(&index) {
                continue;
            }
            let mut incoming = graph
                .edges_directed(index, Direction::Incoming)
                .filter(|edge| edge.weight().role() != EdgeRole::Back)
                .peekable();
            let hangs_off = incoming.peek().is_some()
                && incoming.all(|edge| {
                    edge.weight().role() == EdgeRole::Attachment
                        || attached.contains(&edge.source())
                });
            if hangs_off {
                attached.insert(index);
            }
        }
        if attached.len() == before {
            return attached;
        }
    }
}
