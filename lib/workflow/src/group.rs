//! Groups: presentational containers around related nodes.
//!
//! A group never affects execution order. Its frame is derived from the same
//! grid arithmetic as node positions (see [`crate::layout`]), not recomputed
//! from the nodes it contains.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Returns true if `other` lies entirely inside this rectangle.
    #[must_use]
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x + other.width <= self.x + self.width
            && other.y + other.height <= self.y + self.height
    }
}

/// A visual container (sub-system) of nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: String,
}

impl Group {
    /// Creates a group occupying the given frame.
    #[must_use]
    pub fn new(id: impl Into<String>, label: impl Into<String>, frame: Rect, color: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            x: frame.x,
            y: frame.y,
            width: frame.width,
            height: frame.height,
            color: color.into(),
        }
    }

    /// Returns the frame of this group.
    #[must_use]
    pub fn frame(&self) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, width: f64, height: f64) -> Rect {
        Rect { x, y, width, height }
    }

    #[test]
    fn contains_inner_rect() {
        let outer = rect(0.0, 0.0, 400.0, 200.0);
        assert!(outer.contains(&rect(10.0, 10.0, 100.0, 50.0)));
        assert!(outer.contains(&outer));
    }

    #[test]
    fn rejects_overhanging_rect() {
        let outer = rect(0.0, 0.0, 400.0, 200.0);
        assert!(!outer.contains(&rect(350.0, 10.0, 100.0, 50.0)));
        assert!(!outer.contains(&rect(-1.0, 10.0, 10.0, 10.0)));
    }

    #[test]
    fn group_frame_matches_fields() {
        let group = Group::new("intake", "Intake", rect(1.0, 2.0, 3.0, 4.0), "#0ea5e9");
        assert_eq!(group.frame(), rect(1.0, 2.0, 3.0, 4.0));
    }
}
