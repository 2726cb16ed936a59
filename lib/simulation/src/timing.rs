//! Simulation timing configuration.
//!
//! All durations are virtual milliseconds. The runner maps them onto wall
//! time with its speed multiplier; the engine itself never reads a clock.

use flowlab_workflow::NodeType;
use serde::{Deserialize, Serialize};

/// Timing for node transitions and pulse effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Delay between a node becoming ready and entering `pending`.
    #[serde(default = "default_lead_ms")]
    pub lead_ms: u64,
    /// Delay between `pending` and `running`.
    #[serde(default = "default_pending_ms")]
    pub pending_ms: u64,

    #[serde(default = "default_trigger_ms")]
    pub trigger_ms: u64,
    #[serde(default = "default_process_ms")]
    pub process_ms: u64,
    #[serde(default = "default_output_ms")]
    pub output_ms: u64,
    #[serde(default = "default_ai_ms")]
    pub ai_ms: u64,
    #[serde(default = "default_agent_ms")]
    pub agent_ms: u64,
    #[serde(default = "default_condition_agent_ms")]
    pub condition_agent_ms: u64,
    /// Running time of `ifelse`, `router`, `merge`, `fork` and `join`.
    #[serde(default = "default_control_ms")]
    pub control_ms: u64,
    #[serde(default = "default_iterator_ms")]
    pub iterator_ms: u64,
    #[serde(default = "default_subsystem_ms")]
    pub subsystem_ms: u64,
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,
    #[serde(default = "default_approval_ms")]
    pub approval_ms: u64,
    /// Running time of an error handler that sits on the walk.
    #[serde(default = "default_error_handler_ms")]
    pub error_handler_ms: u64,

    /// How long an attached error handler stays `pending` when flashed.
    #[serde(default = "default_error_flash_ms")]
    pub error_flash_ms: u64,
    /// How long a circuit breaker stays `half-open` when pulsed.
    #[serde(default = "default_breaker_pulse_ms")]
    pub breaker_pulse_ms: u64,
    /// How long before completion an approval auto-resolves.
    #[serde(default = "default_approval_auto_resolve_lead_ms")]
    pub approval_auto_resolve_lead_ms: u64,
    /// Delay between a user approval and the gate completing.
    #[serde(default = "default_approval_resume_ms")]
    pub approval_resume_ms: u64,
    /// Whether approvals resolve themselves when nobody answers.
    #[serde(default = "default_auto_approve")]
    pub auto_approve: bool,
    /// Delay between replay steps while playing.
    #[serde(default = "default_replay_interval_ms")]
    pub replay_interval_ms: u64,
}

fn default_lead_ms() -> u64 {
    200
}

fn default_pending_ms() -> u64 {
    300
}

fn default_trigger_ms() -> u64 {
    600
}

fn default_process_ms() -> u64 {
    1000
}

fn default_output_ms() -> u64 {
    800
}

fn default_ai_ms() -> u64 {
    2000
}

fn default_agent_ms() -> u64 {
    2500
}

fn default_condition_agent_ms() -> u64 {
    1800
}

fn default_control_ms() -> u64 {
    500
}

fn default_iterator_ms() -> u64 {
    1200
}

fn default_subsystem_ms() -> u64 {
    1500
}

fn default_wait_ms() -> u64 {
    3000
}

fn default_approval_ms() -> u64 {
    3500
}

fn default_error_handler_ms() -> u64 {
    600
}

fn default_error_flash_ms() -> u64 {
    600
}

fn default_breaker_pulse_ms() -> u64 {
    900
}

fn default_approval_auto_resolve_lead_ms() -> u64 {
    500
}

fn default_approval_resume_ms() -> u64 {
    300
}

fn default_auto_approve() -> bool {
    true
}

fn default_replay_interval_ms() -> u64 {
    800
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            lead_ms: default_lead_ms(),
            pending_ms: default_pending_ms(),
            trigger_ms: default_trigger_ms(),
            process_ms: default_process_ms(),
            output_ms: default_output_ms(),
            ai_ms: default_ai_ms(),
            agent_ms: default_agent_ms(),
            condition_agent_ms: default_condition_agent_ms(),
            control_ms: default_control_ms(),
            iterator_ms: default_iterator_ms(),
            subsystem_ms: default_subsystem_ms(),
            wait_ms: default_wait_ms(),
            approval_ms: default_approval_ms(),
            error_handler_ms: default_error_handler_ms(),
            error_flash_ms: default_error_flash_ms(),
            breaker_pulse_ms: default_breaker_pulse_ms(),
            approval_auto_resolve_lead_ms: default_approval_auto_resolve_lead_ms(),
            approval_resume_ms: default_approval_resume_ms(),
            auto_approve: default_auto_approve(),
            replay_interval_ms: default_replay_interval_ms(),
        }
    }
}

impl TimingConfig {
    /// Returns how long a node of this type stays `running`.
    #[must_use]
    pub fn running_ms(&self, node_type: NodeType) -> u64 {
        match node_type {
            NodeType::Trigger => self.trigger_ms,
            NodeType::Process => self.process_ms,
            NodeType::Output => self.output_ms,
            NodeType::Ai => self.ai_ms,
            NodeType::Agent => self.agent_ms,
            NodeType::ConditionAgent => self.condition_agent_ms,
            NodeType::IfElse
            | NodeType::Router
            | NodeType::Merge
            | NodeType::Fork
            | NodeType::Join => self.control_ms,
            NodeType::Iterator => self.iterator_ms,
            NodeType::Subsystem => self.subsystem_ms,
            NodeType::Wait => self.wait_ms,
            NodeType::Approval => self.approval_ms,
            NodeType::ErrorHandler => self.error_handler_ms,
        }
    }

    /// Returns when, relative to entering `running`, an unanswered approval
    /// resolves itself.
    #[must_use]
    pub fn auto_resolve_after_ms(&self, running_ms: u64) -> u64 {
        running_ms.saturating_sub(self.approval_auto_resolve_lead_ms)
    }
}
