//! Workflow graph model for flowlab.
//!
//! This crate provides the static side of a simulated automation pipeline:
//!
//! - **Graph Model**: nodes, typed connections, and groups over a petgraph
//!   `DiGraph`, validated at load time
//! - **Capability Facets**: retry policy, circuit breaker, schema ports,
//!   approval state, reasoning traces, and the rest of the per-node badges
//! - **Layout**: column/row grid placement and group frames
//! - **Execution Order**: topological order with a stable tie-break
//! - **Readiness**: the remaining-work graph that gates fan-in
//! - **Catalog**: the fixed set of built-in graph variants

pub mod catalog;
pub mod connection;
pub mod definition;
pub mod error;
pub mod facet;
pub mod graph;
pub mod group;
pub mod layout;
pub mod node;
pub mod order;
pub mod port;
pub mod readiness;

pub use catalog::{GraphCatalog, LoadedGraph};
pub use connection::{Connection, EdgeRole, PathType};
pub use definition::{GraphDefinition, GraphMetadata, GraphVariant, VariantSummary};
pub use error::{CatalogError, GraphError};
pub use facet::{
    ApprovalState, Backoff, BreakerStatus, CircuitBreaker, DraftState, ErrorDirective, MemoryType,
    ReasoningStep, RetryConfig, RetryDelay,
};
pub use graph::WorkflowGraph;
pub use group::{Group, Rect};
pub use layout::{GridLayout, Position};
pub use node::{Node, NodeId, NodeShape, NodeStatus, NodeType};
pub use order::ExecutionOrder;
pub use port::{Port, PortMismatch, PortType, SchemaTypes};
pub use readiness::ReadinessGraph;
