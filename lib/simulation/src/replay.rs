//! Position-indexed replay over an execution order.
//!
//! Replay never walks the graph. Every displayed status is a pure function of
//! a node's index and the current position, so any position can be shown
//! without visiting the ones before it.

use flowlab_workflow::{ExecutionOrder, NodeId, NodeStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which way to step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDirection {
    Forward,
    Backward,
}

/// Derives the status shown for the node at `index` when replay is at
/// `position`.
#[must_use]
pub fn derive_status(index: usize, position: usize) -> NodeStatus {
    match index.cmp(&position) {
        std::cmp::Ordering::Less => NodeStatus::Completed,
        std::cmp::Ordering::Equal => NodeStatus::Running,
        std::cmp::Ordering::Greater => NodeStatus::Idle,
    }
}

/// A user-steerable replay of one execution order.
///
/// Positions run from `0` (first node running) to `len` (every node
/// completed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayController {
    order: Vec<NodeId>,
    position: usize,
    playing: bool,
}

impl ReplayController {
    /// Creates a stopped replay at position 0.
    #[must_use]
    pub fn new(order: &ExecutionOrder) -> Self {
        Self {
            order: order.as_slice().to_vec(),
            position: 0,
            playing: false,
        }
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.position >= self.order.len()
    }

    /// Returns the node shown as running, if any.
    #[must_use]
    pub fn current(&self) -> Option<&NodeId> {
        self.order.get(self.position)
    }

    /// Moves one position and returns the new one. Stepping stops playback.
    pub fn step(&mut self, direction: StepDirection) -> usize {
        self.playing = false;
        self.position = match direction {
            StepDirection::Forward => (self.position + 1).min(self.order.len()),
            StepDirection::Backward => self.position.saturating_sub(1),
        };
        self.position
    }

    /// Jumps to an absolute position, clamped to `0..=len`.
    pub fn seek(&mut self, position: usize) -> usize {
        self.position = position.min(self.order.len());
        self.position
    }

    /// Starts or pauses playback. Starting at the end rewinds first.
    ///
    /// Returns whether replay is now playing.
    pub fn play_toggle(&mut self) -> bool {
        if self.playing {
            self.playing = false;
        } else {
            if self.is_at_end() {
                self.position = 0;
            }
            self.playing = !self.order.is_empty();
        }
        self.playing
    }

    /// Advances one position while playing. Playback stops at the end.
    ///
    /// Returns true if the position moved.
    pub fn tick(&mut self) -> bool {
        if !self.playing {
            return false;
        }
        if self.is_at_end() {
            self.playing = false;
            return false;
        }
        self.position += 1;
        if self.is_at_end() {
            self.playing = false;
        }
        true
    }

    /// Returns the derived status of one node. Nodes outside the order are
    /// idle.
    #[must_use]
    pub fn status_of(&self, node_id: &NodeId) -> NodeStatus {
        self.order
            .iter()
            .position(|id| id == node_id)
            .map_or(NodeStatus::Idle, |index| derive_status(index, self.position))
    }

    /// Returns the derived status of every node in the order.
    #[must_use]
    pub fn statuses(&self) -> BTreeMap<NodeId, NodeStatus> {
        self.order
            .iter()
            .enumerate()
            .map(|(index, id)| (id.clone(), derive_status(index, self.position)))
            .collect()
    }
}
