//! Grid layout for nodes and groups.
//!
//! Nodes are placed on a column/row grid; their pixel position is the
//! top-left corner of the node. Group frames are computed from the same grid
//! cells the group spans, so node and group geometry agree by construction.
//! [`GridLayout::misplaced_nodes`] checks that agreement after the fact.

use crate::graph::WorkflowGraph;
use crate::group::Rect;
use crate::node::{Node, NodeId};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Width of the largest node footprint; every grid cell reserves this much.
pub const CELL_WIDTH: f64 = 240.0;
/// Height of the largest node footprint.
pub const CELL_HEIGHT: f64 = 120.0;

/// A pixel position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl From<Position> for (f64, f64) {
    fn from(p: Position) -> Self {
        (p.x, p.y)
    }
}

/// Grid spacing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridLayout {
    /// Horizontal distance between column origins.
    pub column_spacing: f64,
    /// Vertical distance between row origins.
    pub row_spacing: f64,
    /// Pixel x of column 0.
    pub origin_x: f64,
    /// Pixel y of row 0.
    pub origin_y: f64,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            column_spacing: 340.0,
            row_spacing: 160.0,
            origin_x: 80.0,
            origin_y: 80.0,
        }
    }
}

impl GridLayout {
    /// Returns the pixel position of a grid cell.
    #[must_use]
    pub fn position(&self, column: u32, row: u32) -> Position {
        Position {
            x: self.origin_x + f64::from(column) * self.column_spacing,
            y: self.origin_y + f64::from(row) * self.row_spacing,
        }
    }

    /// Returns the frame of a group spanning the given grid cells.
    ///
    /// The frame covers every cell in the span plus `padding` on each side.
    #[must_use]
    pub fn group_frame(
        &self,
        columns: RangeInclusive<u32>,
        rows: RangeInclusive<u32>,
        padding: f64,
    ) -> Rect {
        let top_left = self.position(*columns.start(), *rows.start());
        let column_span = f64::from(columns.end().saturating_sub(*columns.start()));
        let row_span = f64::from(rows.end().saturating_sub(*rows.start()));
        Rect {
            x: top_left.x - padding,
            y: top_left.y - padding,
            width: column_span * self.column_spacing + CELL_WIDTH + 2.0 * padding,
            height: row_span * self.row_spacing + CELL_HEIGHT + 2.0 * padding,
        }
    }

    /// Returns the rendered bounding box of a node.
    #[must_use]
    pub fn node_bounds(node: &Node) -> Rect {
        let (width, height) = node.size();
        Rect {
            x: node.x,
            y: node.y,
            width,
            height,
        }
    }

    /// Returns the nodes whose bounding box escapes the frame of their group.
    ///
    /// Nodes referencing a group the graph does not know are skipped; loading
    /// already rejects them.
    #[must_use]
    pub fn misplaced_nodes(graph: &WorkflowGraph) -> Vec<NodeId> {
        graph
            .nodes()
            .filter(|node| {
                node.group
                    .as_deref()
                    .and_then(|id| graph.group(id))
                    .is_some_and(|group| !group.frame().contains(&Self::node_bounds(node)))
            })
            .map(|node| node.id.clone())
            .collect()
    }
}
