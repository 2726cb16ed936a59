//! Simulation engine for flowlab graphs.
//!
//! This crate animates a [`flowlab_workflow`] graph:
//!
//! - **Engine**: a discrete-event simulation over virtual milliseconds that
//!   walks the graph, forks parallel lanes, and joins them on fan-in
//! - **Effects**: error-handler flashes, breaker pulses, tool highlights, and
//!   reasoning reveals, selected by rules rather than hardcoded node ids
//! - **Replay**: position-indexed stepping over an execution order
//! - **Session**: the single command surface over all of the above
//! - **Runner**: an async task mapping virtual time onto tokio time

pub mod effects;
pub mod engine;
pub mod error;
pub mod events;
pub mod inspect;
pub mod plan;
pub mod replay;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod timing;
pub mod working;

pub use effects::{Effect, EffectRule, Lifecycle, Selector, default_rules};
pub use engine::Simulation;
pub use error::{InteractionError, SessionError, SimulationStateError};
pub use events::{
    ApprovalDecision, EngineState, RunMode, RunOutcome, SimulationEvent, StatusSnapshot,
};
pub use inspect::{NodeInspection, inspect};
pub use plan::{BranchDecision, BranchOutcome, RunPlan};
pub use replay::{ReplayController, StepDirection};
pub use runner::{RunnerConfig, SimulationHandle, spawn};
pub use session::{Command, Reply, Session};
pub use timing::TimingConfig;
pub use working::{NodeTiming, WorkingGraph};
