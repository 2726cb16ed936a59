//! Typed port contracts for workflow nodes.
//!
//! Ports are named connection points rendered as colored dots on a node.
//! They are a descriptive contract only: nothing flows through them during a
//! simulated run, but mismatched types across a connection can be reported.

use serde::{Deserialize, Serialize};

/// The data type carried by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    String,
    Number,
    Object,
    Array,
    Boolean,
}

impl PortType {
    /// Checks if a value of this type can feed a port of the other type.
    ///
    /// Types must match exactly, except that anything may feed an `object`
    /// port (objects act as the catch-all envelope in the demo graphs).
    #[must_use]
    pub fn is_compatible_with(self, other: Self) -> bool {
        self == other || other == Self::Object
    }

    /// Returns the render color for ports of this type.
    #[must_use]
    pub fn color(self) -> &'static str {
        match self {
            Self::String => "#22c55e",
            Self::Number => "#3b82f6",
            Self::Object => "#a855f7",
            Self::Array => "#f97316",
            Self::Boolean => "#eab308",
        }
    }
}

/// A named, typed port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// The name of this port.
    pub name: String,
    /// The data type of this port.
    #[serde(rename = "type")]
    pub port_type: PortType,
}

impl Port {
    /// Creates a new port.
    #[must_use]
    pub fn new(name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            name: name.into(),
            port_type,
        }
    }
}

/// The typed input/output contract of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaTypes {
    /// Input ports.
    #[serde(default)]
    pub inputs: Vec<Port>,
    /// Output ports.
    #[serde(default)]
    pub outputs: Vec<Port>,
}

/// An output/input pair whose types do not line up across a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMismatch {
    pub output: Port,
    pub input: Port,
}

impl SchemaTypes {
    /// Creates a schema from input and output ports.
    #[must_use]
    pub fn new(inputs: Vec<Port>, outputs: Vec<Port>) -> Self {
        Self { inputs, outputs }
    }

    /// Returns the input port with the given name, if any.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name == name)
    }

    /// Returns the output port with the given name, if any.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// Pairs this node's outputs with a downstream node's inputs by name and
    /// returns the pairs whose types are incompatible.
    ///
    /// Ports without a same-named counterpart are not compared.
    #[must_use]
    pub fn mismatches_with(&self, downstream: &Self) -> Vec<PortMismatch> {
        self.outputs
            .iter()
            .filter_map(|output| {
                let input = downstream.input(&output.name)?;
                (!output.port_type.is_compatible_with(input.port_type)).then(|| PortMismatch {
                    output: output.clone(),
                    input: input.clone(),
                })
            })
            .collect()
    }
}
