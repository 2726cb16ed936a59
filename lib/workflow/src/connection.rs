//! Connection types for workflow graphs.
//!
//! A connection is a directed edge between two nodes. Its optional path type
//! selects a rendering style and decides how the edge takes part in ordering:
//! flow edges order the walk, attachment edges hang helper nodes (error
//! handlers, tools) off a step, and loop edges are drawn but never followed.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};

/// The rendering style of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathType {
    True,
    False,
    Default,
    Loop,
    Error,
    Mcp,
    Parallel,
    Tool,
}

/// How an edge participates in ordering and simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeRole {
    /// Orders the walk and carries readiness.
    Flow,
    /// Attaches a helper node that is pulsed rather than walked.
    Attachment,
    /// A back edge (iteration); presentational only.
    Back,
}

impl PathType {
    /// Returns how edges of this path type take part in execution.
    #[must_use]
    pub fn role(self) -> EdgeRole {
        match self {
            Self::True | Self::False | Self::Default | Self::Parallel => EdgeRole::Flow,
            Self::Error | Self::Mcp | Self::Tool => EdgeRole::Attachment,
            Self::Loop => EdgeRole::Back,
        }
    }

    /// Returns the stroke style used when drawing this path.
    #[must_use]
    pub fn stroke(self) -> &'static str {
        match self {
            Self::True => "solid-green",
            Self::False => "solid-red",
            Self::Default => "solid",
            Self::Loop => "dashed-curved",
            Self::Error => "dashed-red",
            Self::Mcp => "dotted-purple",
            Self::Parallel => "double",
            Self::Tool => "dotted",
        }
    }
}

/// A directed connection between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// The source node.
    pub from: NodeId,
    /// The target node.
    pub to: NodeId,
    /// Optional label drawn at the edge midpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Optional rendering style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_type: Option<PathType>,
}

impl Connection {
    /// Creates an unstyled connection.
    #[must_use]
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: None,
            path_type: None,
        }
    }

    /// Creates a connection with a path type.
    #[must_use]
    pub fn typed(from: impl Into<NodeId>, to: impl Into<NodeId>, path_type: PathType) -> Self {
        Self {
            path_type: Some(path_type),
            ..Self::new(from, to)
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns the execution role of this connection.
    ///
    /// Unstyled connections are flow edges.
    #[must_use]
    pub fn role(&self) -> EdgeRole {
        self.path_type.map_or(EdgeRole::Flow, PathType::role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unstyled_connection_is_flow() {
        assert_eq!(Connection::new("a", "b").role(), EdgeRole::Flow);
    }

    #[test]
    fn path_roles() {
        assert_eq!(PathType::False.role(), EdgeRole::Flow);
        assert_eq!(PathType::Parallel.role(), EdgeRole::Flow);
        assert_eq!(PathType::Error.role(), EdgeRole::Attachment);
        assert_eq!(PathType::Tool.role(), EdgeRole::Attachment);
        assert_eq!(PathType::Mcp.role(), EdgeRole::Attachment);
        assert_eq!(PathType::Loop.role(), EdgeRole::Back);
    }

    #[test]
    fn connection_wire_format() {
        let conn = Connection::typed("check", "escalate", PathType::True).labeled("yes");
        let json = serde_json::to_value(&conn).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({ "from": "check", "to": "escalate", "label": "yes", "pathType": "true" })
        );
    }

    #[test]
    fn connection_without_optional_fields_parses() {
        let conn: Connection =
            serde_json::from_value(serde_json::json!({ "from": "a", "to": "b" })).expect("parse");
        assert_eq!(conn, Connection::new("a", "b"));
    }
}
