//! Graph definition types.
//!
//! A graph variant is a named, versioned automation consisting of:
//! - Metadata (name, description, version, tags)
//! - The canonical `(nodes, connections, groups)` triple
//! - An optional hand-authored presentation order

use crate::connection::Connection;
use crate::group::Group;
use crate::node::{Node, NodeId};
use serde::{Deserialize, Serialize};

/// Metadata for a graph variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    /// Human-readable name.
    pub name: String,
    /// What this graph demonstrates.
    pub description: Option<String>,
    /// Semantic version of this definition.
    pub version: String,
    /// Tags for organization/filtering.
    pub tags: Vec<String>,
}

impl GraphMetadata {
    /// Creates new metadata with default values.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            version: "0.1.0".to_string(),
            tags: Vec::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// The canonical node/connection/group triple.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

/// A named entry in the graph catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphVariant {
    /// Catalog key (e.g. `"fork-join"`).
    pub key: String,
    pub metadata: GraphMetadata,
    pub definition: GraphDefinition,
    /// Hand-authored walk order, used for presentation when it agrees with
    /// the connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authored_order: Option<Vec<NodeId>>,
}

impl GraphVariant {
    /// Creates a variant without an authored order.
    #[must_use]
    pub fn new(key: impl Into<String>, metadata: GraphMetadata, definition: GraphDefinition) -> Self {
        Self {
            key: key.into(),
            metadata,
            definition,
            authored_order: None,
        }
    }

    /// Sets the authored presentation order.
    #[must_use]
    pub fn with_authored_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.authored_order = Some(order.into_iter().map(Into::into).collect());
        self
    }
}

/// Summary information about a variant (for listings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSummary {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub version: String,
    pub tags: Vec<String>,
    pub node_count: usize,
    pub connection_count: usize,
}

impl From<&GraphVariant> for VariantSummary {
    fn from(variant: &GraphVariant) -> Self {
        Self {
            key: variant.key.clone(),
            name: variant.metadata.name.clone(),
            description: variant.metadata.description.clone(),
            version: variant.metadata.version.clone(),
            tags: variant.metadata.tags.clone(),
            node_count: variant.definition.nodes.len(),
            connection_count: variant.definition.connections.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    #[test]
    fn metadata_builder() {
        let metadata = GraphMetadata::new("Support triage")
            .with_description("Routes tickets")
            .with_version("1.2.0")
            .with_tag("ai")
            .with_tag("approval");

        assert_eq!(metadata.name, "Support triage");
        assert_eq!(metadata.description.as_deref(), Some("Routes tickets"));
        assert_eq!(metadata.version, "1.2.0");
        assert_eq!(metadata.tags, vec!["ai", "approval"]);
    }

    #[test]
    fn definition_parses_with_missing_sections() {
        let json = serde_json::json!({
            "nodes": [{ "id": "t", "type": "trigger", "label": "Start", "x": 0.0, "y": 0.0 }]
        });
        let definition: GraphDefinition = serde_json::from_value(json).expect("parse");
        assert_eq!(definition.nodes.len(), 1);
        assert!(definition.connections.is_empty());
        assert!(definition.groups.is_empty());
    }

    #[test]
    fn summary_from_variant() {
        let definition = GraphDefinition {
            nodes: vec![
                Node::new("a", NodeType::Trigger, "A"),
                Node::new("b", NodeType::Output, "B"),
            ],
            connections: vec![Connection::new("a", "b")],
            groups: vec![],
        };
        let variant = GraphVariant::new("tiny", GraphMetadata::new("Tiny"), definition)
            .with_authored_order(["a", "b"]);
        let summary = VariantSummary::from(&variant);

        assert_eq!(summary.key, "tiny");
        assert_eq!(summary.node_count, 2);
        assert_eq!(summary.connection_count, 1);
        assert_eq!(variant.authored_order.map(|o| o.len()), Some(2));
    }
}
