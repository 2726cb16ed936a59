//! Error types for the workflow crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `GraphError`: structural problems found while loading a graph definition
//! - `CatalogError`: variant lookup and load failures (wraps `GraphError` via context)

use crate::node::NodeId;
use std::fmt;

/// Errors from graph loading and validation.
///
/// These are detected once, at load time, and are fatal to loading that
/// variant. Callers recover by selecting a different variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Two nodes share the same id.
    DuplicateNode { node_id: NodeId },
    /// A connection references a node that does not exist.
    DanglingConnection {
        from: NodeId,
        to: NodeId,
        missing: NodeId,
    },
    /// A node references a group that does not exist.
    UnknownGroup { node_id: NodeId, group: String },
    /// The flow edges of the graph contain a cycle.
    CycleDetected { involved: Vec<NodeId> },
    /// An authored presentation order contradicts the graph's dependencies.
    InvalidAuthoredOrder { reason: String },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateNode { node_id } => write!(f, "duplicate node id: {node_id}"),
            Self::DanglingConnection { from, to, missing } => {
                write!(f, "dangling connection {from} -> {to}: node {missing} does not exist")
            }
            Self::UnknownGroup { node_id, group } => {
                write!(f, "node {node_id} references unknown group '{group}'")
            }
            Self::CycleDetected { involved } => {
                let ids: Vec<&str> = involved.iter().map(NodeId::as_str).collect();
                write!(f, "cycle detected among nodes [{}]", ids.join(", "))
            }
            Self::InvalidAuthoredOrder { reason } => {
                write!(f, "invalid authored execution order: {reason}")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors from the graph catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No variant is registered under the key.
    UnknownVariant { key: String },
    /// The variant failed validation (use as context wrapper).
    InvalidVariant { key: String },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownVariant { key } => write!(f, "unknown graph variant: {key}"),
            Self::InvalidVariant { key } => write!(f, "graph variant '{key}' failed to load"),
        }
    }
}

impl std::error::Error for CatalogError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dangling_connection_display() {
        let err = GraphError::DanglingConnection {
            from: NodeId::from("a"),
            to: NodeId::from("ghost"),
            missing: NodeId::from("ghost"),
        };
        let text = err.to_string();
        assert!(text.contains("dangling connection"));
        assert!(text.contains("ghost"));
    }

    #[test]
    fn cycle_display_lists_nodes() {
        let err = GraphError::CycleDetected {
            involved: vec![NodeId::from("a"), NodeId::from("b")],
        };
        assert_eq!(err.to_string(), "cycle detected among nodes [a, b]");
    }

    #[test]
    fn catalog_error_display() {
        let err = CatalogError::UnknownVariant {
            key: "nope".to_string(),
        };
        assert!(err.to_string().contains("unknown graph variant"));
    }
}
