//! The discrete-event simulation engine.
//!
//! A run walks the walked nodes of a loaded graph on a virtual clock:
//!
//! 1. Nodes with no remaining predecessors are ready (see [`ReadinessGraph`])
//! 2. A ready node enters `pending` after `lead_ms`, `running` after
//!    `pending_ms`, and `completed` after its type's running time
//! 3. Completing a node removes it from the readiness graph, which may make
//!    more nodes ready
//! 4. Nodes on a branch path that was not taken are skipped when reached
//!
//! Fork lanes become ready together and so start together; a join only
//! becomes ready once every lane has been removed. Each node has at most one
//! lifecycle transition in flight. Starting, stopping or resetting cancels
//! every outstanding event by bumping the scheduler generation.
//!
//! The engine never reads a clock. Callers drive it with
//! [`Simulation::advance_to`]; the runner maps wall time onto it.

use crate::effects::{Effect, EffectRule, Lifecycle, default_rules, effects_for};
use crate::error::{InteractionError, SimulationStateError};
use crate::events::{
    ApprovalDecision, EngineState, RunMode, RunOutcome, SimulationEvent, StatusSnapshot,
};
use crate::plan::RunPlan;
use crate::scheduler::{Scheduler, Ticket};
use crate::timing::TimingConfig;
use crate::working::WorkingGraph;
use chrono::Utc;
use flowlab_core::{GraphVersionId, RunId};
use flowlab_workflow::{
    ApprovalState, BreakerStatus, EdgeRole, ErrorDirective, ExecutionOrder, LoadedGraph, Node,
    NodeId, NodeStatus, PathType, ReadinessGraph, WorkflowGraph,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Pending,
    Running,
    Complete,
    /// End of an error-handler flash.
    FlashEnd,
    AutoApprove,
    PulseEnd,
    Reveal(usize),
}

#[derive(Debug, Clone)]
struct Scheduled {
    node: NodeId,
    step: Step,
}

/// Per-run bookkeeping, discarded on reset.
#[derive(Debug)]
struct Run {
    id: RunId,
    mode: RunMode,
    plan: RunPlan,
    readiness: ReadinessGraph,
    /// Breakpoint nodes the user has resumed past in this run.
    released: HashSet<NodeId>,
    rejected: Option<NodeId>,
}

/// The simulation of one loaded graph.
#[derive(Debug)]
pub struct Simulation {
    variant: String,
    version: GraphVersionId,
    graph: WorkflowGraph,
    order: ExecutionOrder,
    timing: TimingConfig,
    rules: Vec<EffectRule>,
    working: WorkingGraph,
    scheduler: Scheduler<Scheduled>,
    /// The one lifecycle transition each node may have in flight.
    transitions: HashMap<NodeId, Ticket>,
    auto_approvals: HashMap<NodeId, Ticket>,
    run: Option<Run>,
    state: EngineState,
    events: Vec<SimulationEvent>,
    halt: Option<SimulationStateError>,
}

impl Simulation {
    /// Creates an idle simulation over a fresh working copy of `loaded`.
    #[must_use]
    pub fn new(loaded: &LoadedGraph, timing: TimingConfig) -> Self {
        Self {
            variant: loaded.variant.key.clone(),
            version: loaded.version,
            graph: loaded.graph.clone(),
            order: loaded.order.clone(),
            timing,
            rules: default_rules(),
            working: WorkingGraph::new(&loaded.graph),
            scheduler: Scheduler::new(),
            transitions: HashMap::new(),
            auto_approvals: HashMap::new(),
            run: None,
            state: EngineState::Idle,
            events: Vec::new(),
            halt: None,
        }
    }

    /// Replaces the pulse rules.
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<EffectRule>) -> Self {
        self.rules = rules;
        self
    }

    #[must_use]
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    #[must_use]
    pub fn working(&self) -> &WorkingGraph {
        &self.working
    }

    #[must_use]
    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    #[must_use]
    pub fn order(&self) -> &ExecutionOrder {
        &self.order
    }

    #[must_use]
    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    #[must_use]
    pub fn variant(&self) -> &str {
        &self.variant
    }

    #[must_use]
    pub fn version(&self) -> GraphVersionId {
        self.version
    }

    /// Returns the current virtual time.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.scheduler.now_ms()
    }

    /// Returns the id of the current or most recent run.
    #[must_use]
    pub fn run_id(&self) -> Option<RunId> {
        self.run.as_ref().map(|run| run.id)
    }

    /// Returns the branch decisions of the current run.
    #[must_use]
    pub fn plan(&self) -> Option<&RunPlan> {
        self.run.as_ref().map(|run| &run.plan)
    }

    /// Takes the events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<SimulationEvent> {
        std::mem::take(&mut self.events)
    }

    /// Takes the error that last halted a run, if any.
    pub fn take_halt(&mut self) -> Option<SimulationStateError> {
        self.halt.take()
    }

    /// Returns when the next event is due, or `None` if the run is not
    /// advancing (idle, paused, stopped, finished, or waiting on a user).
    pub fn next_due(&mut self) -> Option<u64> {
        if self.state != EngineState::Running {
            return None;
        }
        self.scheduler.next_due()
    }

    /// Starts a new run.
    ///
    /// Anything left from a previous run is cancelled and the working copy
    /// returns to idle first. User edits and approval decisions recorded
    /// while idle are kept.
    ///
    /// # Errors
    ///
    /// Returns the `SimulationStateError` that halted the run, if activating
    /// the entry nodes failed.
    pub fn start(&mut self, mode: RunMode) -> Result<RunId, SimulationStateError> {
        self.cancel_outstanding();
        if self.state != EngineState::Idle {
            self.working.reset();
        }

        let id = RunId::new();
        let plan = RunPlan::new(&self.graph, &self.order);
        let branches = plan.branches().to_vec();
        self.run = Some(Run {
            id,
            mode,
            plan,
            readiness: ReadinessGraph::new(&self.graph, &self.order),
            released: HashSet::new(),
            rejected: None,
        });
        self.state = EngineState::Running;

        info!(
            run_id = %id,
            variant = %self.variant,
            ?mode,
            at_ms = self.now_ms(),
            "simulation started"
        );
        let graph_version = self.version;
        self.record(|run_id, at_ms| SimulationEvent::RunStarted {
            run_id,
            graph_version,
            mode,
            at_ms,
        });
        for decision in branches {
            debug!(node_id = %decision.node, taken = ?decision.taken(), "branch resolved");
            self.record(|run_id, at_ms| SimulationEvent::BranchResolved {
                run_id,
                decision,
                at_ms,
            });
        }

        if let Err(err) = self.activate() {
            return Err(self.halt(err));
        }
        Ok(id)
    }

    /// Stops the run. Nodes keep whatever status they had.
    pub fn stop(&mut self) {
        if !self.state.is_active() {
            debug!(state = ?self.state, "stop ignored; no active run");
            return;
        }
        self.cancel_outstanding();
        self.state = EngineState::Stopped;
        info!(run_id = ?self.run_id(), at_ms = self.now_ms(), "simulation stopped");
        self.record(|run_id, at_ms| SimulationEvent::RunStopped { run_id, at_ms });
    }

    /// Cancels the run and returns every node to idle with baseline facets.
    pub fn reset(&mut self) {
        self.cancel_outstanding();
        self.working.reset();
        self.run = None;
        self.state = EngineState::Idle;
        info!(variant = %self.variant, "nodes reset");
        self.events.push(SimulationEvent::NodesReset {
            at_ms: self.now_ms(),
        });
    }

    /// Continues a run paused at a breakpoint.
    ///
    /// # Errors
    ///
    /// Returns `InteractionError::NotPaused` if the run is not paused. If
    /// continuing trips an engine invariant the run halts; see
    /// [`Simulation::take_halt`].
    pub fn resume(&mut self) -> Result<(), InteractionError> {
        let EngineState::Paused { node } = &self.state else {
            return Err(InteractionError::NotPaused);
        };
        let node = node.clone();
        if let Some(run) = self.run.as_mut() {
            run.released.insert(node.clone());
        }
        self.state = EngineState::Running;
        info!(node_id = %node, at_ms = self.now_ms(), "simulation resumed");
        self.record(|run_id, at_ms| SimulationEvent::RunResumed { run_id, at_ms });

        if let Err(err) = self.activate() {
            self.halt(err);
        }
        Ok(())
    }

    /// Processes every event due at or before `at_ms`, then moves the clock
    /// there.
    ///
    /// Processing stops early if the run pauses or finishes; the clock then
    /// stays at the time of the last processed event.
    ///
    /// # Errors
    ///
    /// Returns the `SimulationStateError` that halted the run. The run is
    /// already reset to idle when this returns.
    pub fn advance_to(&mut self, at_ms: u64) -> Result<(), SimulationStateError> {
        if self.state != EngineState::Running {
            return Ok(());
        }
        while let Some((ticket, scheduled)) = self.scheduler.pop_due(at_ms) {
            if let Err(err) = self.fire(ticket, scheduled) {
                return Err(self.halt(err));
            }
            self.finish_if_settled();
            if self.state != EngineState::Running {
                return Ok(());
            }
        }
        self.scheduler.advance_to(at_ms);
        Ok(())
    }

    /// Advances through every queued event until the run stops advancing.
    ///
    /// # Errors
    ///
    /// Returns the `SimulationStateError` that halted the run.
    pub fn run_until_settled(&mut self) -> Result<(), SimulationStateError> {
        while let Some(at_ms) = self.next_due() {
            self.advance_to(at_ms)?;
        }
        Ok(())
    }

    /// Records a user decision on an approval gate.
    ///
    /// A gate that is already running reacts at once: approval completes it
    /// after `approval_resume_ms`, rejection fails it and skips everything
    /// downstream. A decision on a gate that has not started yet is held
    /// until it does.
    ///
    /// # Errors
    ///
    /// Returns `UnknownNode`, `NotAnApprovalNode`, or
    /// `ApprovalAlreadyResolved`.
    pub fn resolve_approval(
        &mut self,
        node_id: &NodeId,
        decision: ApprovalDecision,
    ) -> Result<(), InteractionError> {
        let node = self
            .working
            .get(node_id)
            .ok_or_else(|| InteractionError::UnknownNode {
                node_id: node_id.clone(),
            })?;
        if !node.is_approval_gate() {
            return Err(InteractionError::NotAnApprovalNode {
                node_id: node_id.clone(),
            });
        }
        let current = node.approval_state.unwrap_or_default();
        if current != ApprovalState::Waiting {
            return Err(InteractionError::ApprovalAlreadyResolved {
                node_id: node_id.clone(),
                state: current,
            });
        }
        let status = node.status;

        let state = ApprovalState::from(decision);
        self.working.set_approval(node_id, state);
        match decision {
            ApprovalDecision::Approved => info!(node_id = %node_id, %status, "approval granted"),
            ApprovalDecision::Rejected => warn!(node_id = %node_id, %status, "approval rejected"),
        }
        self.events.push(SimulationEvent::ApprovalChanged {
            run_id: self.run_id(),
            node_id: node_id.clone(),
            state,
            at_ms: self.now_ms(),
        });

        if status == NodeStatus::Running && self.state.is_active() {
            if let Some(ticket) = self.auto_approvals.remove(node_id) {
                self.scheduler.cancel(ticket);
            }
            if let Some(ticket) = self.transitions.remove(node_id) {
                self.scheduler.cancel(ticket);
            }
            let resume_ms = self.timing.approval_resume_ms;
            let result = match decision {
                ApprovalDecision::Approved => self.schedule(node_id, resume_ms, Step::Complete),
                ApprovalDecision::Rejected => self.reject(node_id),
            };
            if let Err(err) = result {
                self.halt(err);
            }
        }
        Ok(())
    }

    /// Flips a node's pin flag.
    ///
    /// # Errors
    ///
    /// Returns `InteractionError::UnknownNode`.
    pub fn toggle_pin(&mut self, node_id: &NodeId) -> Result<bool, InteractionError> {
        let pinned = self.working.toggle_pin(node_id)?;
        debug!(node_id = %node_id, pinned, "pin toggled");
        Ok(pinned)
    }

    /// Sets or clears a node's custom color.
    ///
    /// # Errors
    ///
    /// Returns `InteractionError::UnknownNode`.
    pub fn set_custom_color(
        &mut self,
        node_id: &NodeId,
        color: Option<String>,
    ) -> Result<(), InteractionError> {
        debug!(node_id = %node_id, color = ?color, "custom color set");
        self.working.set_custom_color(node_id, color)
    }

    /// Flips a node's breakpoint. Takes effect the next time the node
    /// becomes ready.
    ///
    /// # Errors
    ///
    /// Returns `InteractionError::UnknownNode`.
    pub fn toggle_breakpoint(&mut self, node_id: &NodeId) -> Result<bool, InteractionError> {
        let breakpoint = self.working.toggle_breakpoint(node_id)?;
        debug!(node_id = %node_id, breakpoint, "breakpoint toggled");
        Ok(breakpoint)
    }

    /// Sets or clears a node's error directive.
    ///
    /// # Errors
    ///
    /// Returns `InteractionError::UnknownNode`.
    pub fn set_error_directive(
        &mut self,
        node_id: &NodeId,
        directive: Option<ErrorDirective>,
    ) -> Result<(), InteractionError> {
        debug!(node_id = %node_id, directive = ?directive, "error directive set");
        self.working.set_error_directive(node_id, directive)
    }

    /// Captures every node's status and the data of completed nodes.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            run_id: self.run_id(),
            graph_version: self.version,
            variant: self.variant.clone(),
            at_ms: self.now_ms(),
            state: self.state.clone(),
            statuses: self
                .working
                .nodes()
                .map(|node| (node.id.clone(), node.status))
                .collect(),
            execution_data: self
                .working
                .nodes()
                .filter_map(|node| {
                    self.working
                        .execution_data(&node.id)
                        .map(|data| (node.id.clone(), data))
                })
                .collect(),
            replay_position: None,
            captured_at: Utc::now(),
        }
    }

    fn cancel_outstanding(&mut self) {
        self.scheduler.cancel_all();
        self.transitions.clear();
        self.auto_approvals.clear();
    }

    fn halt(&mut self, err: SimulationStateError) -> SimulationStateError {
        error!(
            run_id = ?self.run_id(),
            error = %err,
            at_ms = self.now_ms(),
            "simulation halted; resetting nodes to idle"
        );
        let message = err.to_string();
        self.record(|run_id, at_ms| SimulationEvent::RunHalted {
            run_id,
            error: message,
            at_ms,
        });
        self.record(|run_id, at_ms| SimulationEvent::RunFinished {
            run_id,
            outcome: RunOutcome::Halted,
            at_ms,
        });
        self.cancel_outstanding();
        self.working.reset();
        self.state = EngineState::Finished {
            outcome: RunOutcome::Halted,
        };
        self.halt = Some(err.clone());
        err
    }

    fn record(&mut self, event: impl FnOnce(RunId, u64) -> SimulationEvent) {
        if let Some(run) = &self.run {
            let event = event(run.id, self.scheduler.now_ms());
            self.events.push(event);
        }
    }

    fn readiness_mut(&mut self) -> Option<&mut ReadinessGraph> {
        self.run.as_mut().map(|run| &mut run.readiness)
    }

    fn set_status(&mut self, node_id: &NodeId, to: NodeStatus) -> Result<(), SimulationStateError> {
        let from = self.working.transition(node_id, to)?;
        debug!(node_id = %node_id, %from, %to, at_ms = self.now_ms(), "node transition");
        let node_id = node_id.clone();
        self.record(|run_id, at_ms| SimulationEvent::NodeTransitioned {
            run_id,
            node_id,
            from,
            to,
            at_ms,
        });
        Ok(())
    }

    /// Schedules a node's next lifecycle transition.
    fn schedule(
        &mut self,
        node_id: &NodeId,
        delay_ms: u64,
        step: Step,
    ) -> Result<(), SimulationStateError> {
        if self.transitions.contains_key(node_id) {
            return Err(SimulationStateError::DoubleScheduled {
                node_id: node_id.clone(),
            });
        }
        let ticket = self.scheduler.schedule_in(
            delay_ms,
            Scheduled {
                node: node_id.clone(),
                step,
            },
        );
        self.transitions.insert(node_id.clone(), ticket);
        Ok(())
    }

    fn fire(&mut self, ticket: Ticket, scheduled: Scheduled) -> Result<(), SimulationStateError> {
        let Scheduled { node, step } = scheduled;
        if self.transitions.get(&node) == Some(&ticket) {
            self.transitions.remove(&node);
        }

        match step {
            Step::Pending => {
                self.set_status(&node, NodeStatus::Pending)?;
                let pending_ms = self.timing.pending_ms;
                self.schedule(&node, pending_ms, Step::Running)
            }
            Step::Running => {
                self.set_status(&node, NodeStatus::Running)?;
                let now = self.now_ms();
                self.working.record_start(&node, now);
                self.on_started(&node)
            }
            Step::Complete => self.on_completed(&node),
            Step::FlashEnd => self.set_status(&node, NodeStatus::Skipped),
            Step::AutoApprove => {
                self.auto_approvals.remove(&node);
                if self.working.approval(&node) == Some(ApprovalState::Waiting) {
                    self.working.set_approval(&node, ApprovalState::Approved);
                    debug!(node_id = %node, "approval auto-resolved");
                    self.record(|run_id, at_ms| SimulationEvent::ApprovalChanged {
                        run_id: Some(run_id),
                        node_id: node,
                        state: ApprovalState::Approved,
                        at_ms,
                    });
                }
                Ok(())
            }
            Step::PulseEnd => {
                if self.working.set_breaker(&node, BreakerStatus::Closed) {
                    self.record(|run_id, at_ms| SimulationEvent::BreakerChanged {
                        run_id,
                        node_id: node,
                        status: BreakerStatus::Closed,
                        at_ms,
                    });
                }
                Ok(())
            }
            Step::Reveal(steps) => {
                self.working.reveal(&node, steps);
                let steps = self.working.revealed(&node);
                self.record(|run_id, at_ms| SimulationEvent::ReasoningRevealed {
                    run_id,
                    node_id: node,
                    steps,
                    at_ms,
                });
                Ok(())
            }
        }
    }

    fn on_started(&mut self, node_id: &NodeId) -> Result<(), SimulationStateError> {
        let node = self.node(node_id)?;
        self.apply_effects(&node, Lifecycle::Started)?;

        if !node.is_approval_gate() {
            let running_ms = self.timing.running_ms(node.node_type);
            return self.schedule(node_id, running_ms, Step::Complete);
        }

        match node.approval_state.unwrap_or_default() {
            ApprovalState::Approved => {
                let resume_ms = self.timing.approval_resume_ms;
                self.schedule(node_id, resume_ms, Step::Complete)
            }
            ApprovalState::Rejected => self.reject(node_id),
            ApprovalState::Waiting if self.timing.auto_approve => {
                let running_ms = self.timing.running_ms(node.node_type);
                let ticket = self.scheduler.schedule_in(
                    self.timing.auto_resolve_after_ms(running_ms),
                    Scheduled {
                        node: node_id.clone(),
                        step: Step::AutoApprove,
                    },
                );
                self.auto_approvals.insert(node_id.clone(), ticket);
                self.schedule(node_id, running_ms, Step::Complete)
            }
            ApprovalState::Waiting => {
                info!(node_id = %node_id, "approval waiting for a decision");
                Ok(())
            }
        }
    }

    fn on_completed(&mut self, node_id: &NodeId) -> Result<(), SimulationStateError> {
        self.set_status(node_id, NodeStatus::Completed)?;
        let now = self.now_ms();
        self.working.record_completion(node_id, now);
        if let Some(readiness) = self.readiness_mut() {
            readiness.mark_completed(node_id);
        }

        let node = self.node(node_id)?;
        self.apply_effects(&node, Lifecycle::Completed)?;
        self.activate()
    }

    /// Fails a rejected gate and skips everything downstream of it.
    fn reject(&mut self, node_id: &NodeId) -> Result<(), SimulationStateError> {
        self.set_status(node_id, NodeStatus::Failed)?;
        warn!(node_id = %node_id, at_ms = self.now_ms(), "approval gate failed; skipping downstream");

        let blocked = match self.run.as_mut() {
            Some(run) => {
                run.readiness.mark_failed(node_id);
                run.rejected.get_or_insert_with(|| node_id.clone());
                run.readiness.blocked_nodes()
            }
            None => Vec::new(),
        };
        for blocked_id in blocked {
            self.set_status(&blocked_id, NodeStatus::Skipped)?;
            if let Some(readiness) = self.readiness_mut() {
                readiness.mark_skipped(&blocked_id);
            }
        }
        self.activate()
    }

    /// Schedules every ready node, skipping dead ones and stopping at an
    /// unreleased breakpoint in debug mode.
    fn activate(&mut self) -> Result<(), SimulationStateError> {
        loop {
            let Some(run) = self.run.as_ref() else {
                return Ok(());
            };
            let ready = run.readiness.ready_nodes();
            let mut skipped_any = false;

            for node_id in ready {
                let Some(run) = self.run.as_ref() else {
                    return Ok(());
                };
                let live = run.plan.is_live(&node_id);
                let released = run.released.contains(&node_id);
                let debugging = run.mode == RunMode::Debug;

                if !live {
                    self.set_status(&node_id, NodeStatus::Skipped)?;
                    if let Some(readiness) = self.readiness_mut() {
                        readiness.mark_skipped(&node_id);
                    }
                    skipped_any = true;
                    continue;
                }

                let breakpoint = self.working.get(&node_id).is_some_and(|n| n.breakpoint);
                if debugging && breakpoint && !released {
                    self.pause_at(node_id);
                    return Ok(());
                }

                let lead_ms = self.timing.lead_ms;
                self.schedule(&node_id, lead_ms, Step::Pending)?;
                if let Some(readiness) = self.readiness_mut() {
                    readiness.mark_executing(&node_id);
                }
            }

            if !skipped_any {
                break;
            }
        }
        self.finish_if_settled();
        Ok(())
    }

    fn pause_at(&mut self, node_id: NodeId) {
        info!(node_id = %node_id, at_ms = self.now_ms(), "paused at breakpoint");
        self.state = EngineState::Paused {
            node: node_id.clone(),
        };
        self.record(|run_id, at_ms| SimulationEvent::RunPaused {
            run_id,
            node_id,
            at_ms,
        });
    }

    /// Finishes the run once nothing is ready, nothing is executing, and
    /// no pulse is still in flight.
    fn finish_if_settled(&mut self) {
        if self.state != EngineState::Running {
            return;
        }
        let outcome = match &self.run {
            Some(run) if run.readiness.is_complete() => match &run.rejected {
                Some(node) => RunOutcome::Rejected { node: node.clone() },
                None => RunOutcome::Completed,
            },
            _ => return,
        };
        if !self.scheduler.is_empty() {
            return;
        }

        info!(run_id = ?self.run_id(), outcome = ?outcome, at_ms = self.now_ms(), "simulation finished");
        self.state = EngineState::Finished {
            outcome: outcome.clone(),
        };
        self.record(|run_id, at_ms| SimulationEvent::RunFinished {
            run_id,
            outcome,
            at_ms,
        });
    }

    fn node(&self, node_id: &NodeId) -> Result<Node, SimulationStateError> {
        self.working
            .get(node_id)
            .cloned()
            .ok_or_else(|| SimulationStateError::UnknownNode {
                node_id: node_id.clone(),
            })
    }

    fn apply_effects(&mut self, node: &Node, lifecycle: Lifecycle) -> Result<(), SimulationStateError> {
        for effect in effects_for(&self.rules, node, lifecycle) {
            debug!(node_id = %node.id, ?effect, ?lifecycle, "pulse effect");
            match effect {
                Effect::FlashErrorHandlers => self.flash_error_handlers(&node.id)?,
                Effect::PulseCircuitBreaker => self.pulse_breaker(&node.id),
                Effect::HighlightTools => self.highlight_tools(&node.id, true),
                Effect::ClearToolHighlights => self.highlight_tools(&node.id, false),
                Effect::RevealReasoning => self.reveal_reasoning(node),
            }
        }
        Ok(())
    }

    /// Pulses idle attached error handlers `pending -> skipped`.
    fn flash_error_handlers(&mut self, node_id: &NodeId) -> Result<(), SimulationStateError> {
        let handlers: Vec<NodeId> = self
            .graph
            .successors(node_id, EdgeRole::Attachment)
            .into_iter()
            .filter(|(_, conn)| conn.path_type == Some(PathType::Error))
            .map(|(handler, _)| handler.id.clone())
            .collect();

        let flash_ms = self.timing.error_flash_ms;
        for handler in handlers {
            if self.working.status(&handler) != Some(NodeStatus::Idle) {
                continue;
            }
            self.set_status(&handler, NodeStatus::Pending)?;
            self.schedule(&handler, flash_ms, Step::FlashEnd)?;
        }
        Ok(())
    }

    fn pulse_breaker(&mut self, node_id: &NodeId) {
        if !self.working.set_breaker(node_id, BreakerStatus::HalfOpen) {
            return;
        }
        let id = node_id.clone();
        self.record(|run_id, at_ms| SimulationEvent::BreakerChanged {
            run_id,
            node_id: id,
            status: BreakerStatus::HalfOpen,
            at_ms,
        });
        self.scheduler.schedule_in(
            self.timing.breaker_pulse_ms,
            Scheduled {
                node: node_id.clone(),
                step: Step::PulseEnd,
            },
        );
    }

    fn highlight_tools(&mut self, node_id: &NodeId, highlighted: bool) {
        let tools: Vec<NodeId> = self
            .graph
            .successors(node_id, EdgeRole::Attachment)
            .into_iter()
            .filter(|(_, conn)| matches!(conn.path_type, Some(PathType::Tool | PathType::Mcp)))
            .map(|(tool, _)| tool.id.clone())
            .collect();

        for tool_id in tools {
            if self.working.set_highlight(&tool_id, highlighted) {
                let node_id = node_id.clone();
                self.record(|run_id, at_ms| SimulationEvent::ToolHighlighted {
                    run_id,
                    node_id,
                    tool_id,
                    highlighted,
                    at_ms,
                });
            }
        }
    }

    /// Reveals the first step now and spreads the rest over the node's
    /// running time.
    fn reveal_reasoning(&mut self, node: &Node) {
        let steps = node.agent_reasoning_trace.len();
        if steps == 0 {
            return;
        }
        self.working.reveal(&node.id, 1);
        let id = node.id.clone();
        self.record(|run_id, at_ms| SimulationEvent::ReasoningRevealed {
            run_id,
            node_id: id,
            steps: 1,
            at_ms,
        });

        let running_ms = self.timing.running_ms(node.node_type);
        let total = steps as u64;
        for step in 2..=steps {
            let at = running_ms.saturating_mul(step as u64 - 1) / total;
            self.scheduler.schedule_in(
                at,
                Scheduled {
                    node: node.id.clone(),
                    step: Step::Reveal(step),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowlab_workflow::{
        Connection, GraphCatalog, GraphDefinition, GraphMetadata, GraphVariant, NodeType,
    };

    fn simulation(key: &str) -> Simulation {
        simulation_with(key, TimingConfig::default())
    }

    fn simulation_with(key: &str, timing: TimingConfig) -> Simulation {
        let loaded = GraphCatalog::default().load(key).expect("variant loads");
        Simulation::new(&loaded, timing)
    }

    fn custom(nodes: Vec<Node>, connections: Vec<Connection>) -> Simulation {
        let definition = GraphDefinition {
            nodes,
            connections,
            groups: vec![],
        };
        let catalog = GraphCatalog::from_variants(vec![GraphVariant::new(
            "custom",
            GraphMetadata::new("Custom"),
            definition,
        )]);
        let loaded = catalog.load("custom").expect("variant loads");
        Simulation::new(&loaded, TimingConfig::default())
    }

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    /// Returns `(node, from, to, at_ms)` for every transition event.
    fn transitions(events: &[SimulationEvent]) -> Vec<(NodeId, NodeStatus, NodeStatus, u64)> {
        events
            .iter()
            .filter_map(|event| match event {
                SimulationEvent::NodeTransitioned {
                    node_id,
                    from,
                    to,
                    at_ms,
                    ..
                } => Some((node_id.clone(), *from, *to, *at_ms)),
                _ => None,
            })
            .collect()
    }

    fn time_of(events: &[SimulationEvent], node: &str, to: NodeStatus) -> u64 {
        transitions(events)
            .into_iter()
            .find(|(n, _, t, _)| n.as_str() == node && *t == to)
            .map(|(_, _, _, at)| at)
            .unwrap_or_else(|| panic!("{node} never reached {to}"))
    }

    fn advance_until(sim: &mut Simulation, node: &str, status: NodeStatus) {
        let node = id(node);
        while sim.working().status(&node) != Some(status) {
            let at = sim.next_due().expect("run still advancing");
            sim.advance_to(at).expect("advances");
        }
    }

    #[test]
    fn linear_run_completes_in_order() {
        let mut sim = simulation("linear");
        sim.start(RunMode::Normal).expect("starts");
        sim.run_until_settled().expect("runs");

        let snapshot = sim.snapshot();
        assert!(snapshot.all(NodeStatus::Completed));
        assert_eq!(
            sim.state(),
            &EngineState::Finished {
                outcome: RunOutcome::Completed
            }
        );

        let events = sim.drain_events();
        let t1 = time_of(&events, "t1", NodeStatus::Completed);
        let p1 = time_of(&events, "p1", NodeStatus::Completed);
        let o1 = time_of(&events, "o1", NodeStatus::Completed);
        assert!(t1 < p1 && p1 < o1);
    }

    #[test]
    fn transitions_follow_reference_timing() {
        let mut sim = simulation("linear");
        sim.start(RunMode::Normal).expect("starts");
        sim.run_until_settled().expect("runs");
        let events = sim.drain_events();

        assert_eq!(time_of(&events, "t1", NodeStatus::Pending), 200);
        assert_eq!(time_of(&events, "t1", NodeStatus::Running), 500);
        assert_eq!(time_of(&events, "t1", NodeStatus::Completed), 1100);
        assert_eq!(time_of(&events, "p1", NodeStatus::Pending), 1300);
        assert_eq!(time_of(&events, "o1", NodeStatus::Completed), 3900);
    }

    #[test]
    fn observed_transitions_are_legal_paths() {
        for key in ["linear", "fork-join", "support-triage", "content-pipeline"] {
            let mut sim = simulation(key);
            sim.start(RunMode::Normal).expect("starts");
            sim.run_until_settled().expect("runs");

            let mut last: HashMap<NodeId, NodeStatus> = HashMap::new();
            for (node, from, to, _) in transitions(&sim.drain_events()) {
                let previous = last.get(&node).copied().unwrap_or(NodeStatus::Idle);
                assert_eq!(previous, from, "{key}: {node} jumped from {previous}");
                assert!(from.can_transition_to(to), "{key}: {node} {from} -> {to}");
                last.insert(node, to);
            }
            assert!(matches!(sim.state(), EngineState::Finished { .. }));
        }
    }

    #[test]
    fn fork_lanes_start_together_and_join_waits_for_all() {
        let mut sim = simulation("fork-join");
        sim.start(RunMode::Normal).expect("starts");
        sim.run_until_settled().expect("runs");
        let events = sim.drain_events();

        let lanes = ["lane-a", "lane-b", "lane-c"];
        let started: Vec<u64> = lanes
            .iter()
            .map(|lane| time_of(&events, lane, NodeStatus::Running))
            .collect();
        assert!(started.iter().all(|at| *at == started[0]));

        let last_lane = lanes
            .iter()
            .map(|lane| time_of(&events, lane, NodeStatus::Completed))
            .max()
            .expect("lanes");
        assert!(time_of(&events, "join", NodeStatus::Running) > last_lane);
        assert!(time_of(&events, "join", NodeStatus::Pending) > last_lane);
    }

    #[test]
    fn breakpoint_pauses_before_node_in_debug_mode() {
        let mut sim = simulation("linear");
        sim.toggle_breakpoint(&id("p1")).expect("known node");
        sim.start(RunMode::Debug).expect("starts");
        sim.run_until_settled().expect("runs");

        assert_eq!(sim.state(), &EngineState::Paused { node: id("p1") });
        assert_eq!(sim.working().status(&id("t1")), Some(NodeStatus::Completed));
        assert_eq!(sim.working().status(&id("p1")), Some(NodeStatus::Idle));
        assert_eq!(sim.working().status(&id("o1")), Some(NodeStatus::Idle));

        // The clock is frozen while paused.
        let paused_at = sim.now_ms();
        sim.advance_to(paused_at + 10_000).expect("no-op");
        assert_eq!(sim.now_ms(), paused_at);

        sim.resume().expect("paused");
        sim.run_until_settled().expect("runs");
        assert!(sim.snapshot().all(NodeStatus::Completed));
    }

    #[test]
    fn breakpoints_are_ignored_in_normal_mode() {
        let mut sim = simulation("linear");
        sim.toggle_breakpoint(&id("p1")).expect("known node");
        sim.start(RunMode::Normal).expect("starts");
        sim.run_until_settled().expect("runs");
        assert!(sim.snapshot().all(NodeStatus::Completed));
    }

    #[test]
    fn resume_requires_pause() {
        let mut sim = simulation("linear");
        assert_eq!(sim.resume(), Err(InteractionError::NotPaused));
    }

    #[test]
    fn triage_run_pulses_effects_and_auto_approves() {
        let mut sim = simulation("support-triage");
        sim.start(RunMode::Normal).expect("starts");
        sim.run_until_settled().expect("runs");

        let working = sim.working();
        assert_eq!(working.status(&id("auto-reply")), Some(NodeStatus::Skipped));
        assert_eq!(working.status(&id("classify-fallback")), Some(NodeStatus::Skipped));
        assert_eq!(working.status(&id("respond")), Some(NodeStatus::Completed));
        assert_eq!(working.approval(&id("sign-off")), Some(ApprovalState::Approved));
        assert_eq!(working.revealed(&id("escalate")), 3);
        assert_eq!(working.highlighted().count(), 0);
        assert_eq!(
            working
                .get(&id("classify"))
                .and_then(|n| n.circuit_breaker)
                .map(|b| b.status),
            Some(BreakerStatus::Closed)
        );

        let events = sim.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            SimulationEvent::BreakerChanged { status: BreakerStatus::HalfOpen, node_id, .. }
                if node_id.as_str() == "classify"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            SimulationEvent::ToolHighlighted { tool_id, highlighted: true, .. }
                if tool_id.as_str() == "kb-search"
        )));
        assert!(events.iter().any(|e| matches!(e, SimulationEvent::BranchResolved { .. })));
        assert_eq!(
            time_of(&events, "classify-fallback", NodeStatus::Pending),
            time_of(&events, "classify", NodeStatus::Completed)
        );
    }

    #[test]
    fn tools_are_highlighted_while_agent_runs() {
        let mut sim = simulation("support-triage");
        sim.start(RunMode::Normal).expect("starts");
        advance_until(&mut sim, "escalate", NodeStatus::Running);

        assert!(sim.working().is_highlighted(&id("kb-search")));
        assert_eq!(sim.working().revealed(&id("escalate")), 1);
    }

    #[test]
    fn rejecting_a_running_gate_skips_downstream() {
        let mut sim = simulation("support-triage");
        sim.start(RunMode::Normal).expect("starts");
        advance_until(&mut sim, "sign-off", NodeStatus::Running);

        let gate = id("sign-off");
        sim.resolve_approval(&gate, ApprovalDecision::Rejected)
            .expect("waiting gate");
        sim.run_until_settled().expect("runs");

        let working = sim.working();
        assert_eq!(working.approval(&gate), Some(ApprovalState::Rejected));
        assert_eq!(working.status(&gate), Some(NodeStatus::Failed));
        assert_eq!(working.status(&id("merge")), Some(NodeStatus::Skipped));
        assert_eq!(working.status(&id("respond")), Some(NodeStatus::Skipped));
        assert_eq!(
            sim.state(),
            &EngineState::Finished {
                outcome: RunOutcome::Rejected { node: gate.clone() }
            }
        );

        assert_eq!(
            sim.resolve_approval(&gate, ApprovalDecision::Approved),
            Err(InteractionError::ApprovalAlreadyResolved {
                node_id: gate,
                state: ApprovalState::Rejected
            })
        );
    }

    #[test]
    fn rejected_gate_in_one_lane_lets_the_other_lane_finish() {
        let mut sim = custom(
            vec![
                Node::new("f", NodeType::Fork, "Fork"),
                Node::new("gate", NodeType::Approval, "Gate").with_approval("lead", "1h"),
                Node::new("b", NodeType::Process, "B"),
                Node::new("b2", NodeType::Process, "B2"),
                Node::new("j", NodeType::Join, "Join"),
                Node::new("out", NodeType::Output, "Out"),
            ],
            vec![
                Connection::typed("f", "gate", PathType::Parallel),
                Connection::typed("f", "b", PathType::Parallel),
                Connection::new("b", "b2"),
                Connection::new("gate", "j"),
                Connection::new("b2", "j"),
                Connection::new("j", "out"),
            ],
        );
        let gate = id("gate");
        sim.resolve_approval(&gate, ApprovalDecision::Rejected)
            .expect("waiting gate");
        sim.start(RunMode::Normal).expect("starts");
        sim.run_until_settled().expect("runs");

        let working = sim.working();
        assert_eq!(working.status(&gate), Some(NodeStatus::Failed));
        assert_eq!(working.status(&id("b")), Some(NodeStatus::Completed));
        assert_eq!(working.status(&id("b2")), Some(NodeStatus::Completed));
        assert_eq!(working.status(&id("j")), Some(NodeStatus::Skipped));
        assert_eq!(working.status(&id("out")), Some(NodeStatus::Skipped));
        assert_eq!(
            sim.state(),
            &EngineState::Finished {
                outcome: RunOutcome::Rejected { node: gate }
            }
        );

        let events = sim.drain_events();
        assert!(
            time_of(&events, "gate", NodeStatus::Failed)
                < time_of(&events, "b2", NodeStatus::Completed)
        );
    }

    #[test]
    fn handler_flow_successors_never_run() {
        let mut sim = custom(
            vec![
                Node::new("t", NodeType::Trigger, "Trigger"),
                Node::new("ai", NodeType::Ai, "Classify"),
                Node::new("eh", NodeType::ErrorHandler, "Fallback"),
                Node::new("notify", NodeType::Process, "Notify"),
                Node::new("out", NodeType::Output, "Out"),
            ],
            vec![
                Connection::new("t", "ai"),
                Connection::typed("ai", "eh", PathType::Error),
                Connection::new("eh", "notify"),
                Connection::new("ai", "out"),
            ],
        );
        sim.start(RunMode::Normal).expect("starts");
        sim.run_until_settled().expect("runs");

        let working = sim.working();
        assert_eq!(working.status(&id("notify")), Some(NodeStatus::Idle));
        assert_eq!(working.status(&id("eh")), Some(NodeStatus::Skipped));
        assert_eq!(working.status(&id("out")), Some(NodeStatus::Completed));
        assert_eq!(
            sim.state(),
            &EngineState::Finished {
                outcome: RunOutcome::Completed
            }
        );

        let events = sim.drain_events();
        assert!(
            transitions(&events)
                .iter()
                .all(|(node, _, _, _)| node.as_str() != "notify")
        );
        let ai_done = time_of(&events, "ai", NodeStatus::Completed);
        assert!(time_of(&events, "t", NodeStatus::Completed) < ai_done);
        assert_eq!(time_of(&events, "eh", NodeStatus::Pending), ai_done);
        assert!(time_of(&events, "out", NodeStatus::Pending) > ai_done);
    }

    #[test]
    fn decision_recorded_before_the_gate_runs_applies_when_it_starts() {
        let mut sim = simulation("support-triage");
        sim.resolve_approval(&id("sign-off"), ApprovalDecision::Rejected)
            .expect("waiting gate");
        sim.start(RunMode::Normal).expect("starts");
        sim.run_until_settled().expect("runs");

        assert_eq!(sim.working().status(&id("sign-off")), Some(NodeStatus::Failed));
        assert_eq!(sim.working().status(&id("respond")), Some(NodeStatus::Skipped));
        assert!(matches!(
            sim.state(),
            EngineState::Finished {
                outcome: RunOutcome::Rejected { .. }
            }
        ));
    }

    #[test]
    fn gate_waits_for_a_user_without_auto_approve() {
        let timing = TimingConfig {
            auto_approve: false,
            ..TimingConfig::default()
        };
        let mut sim = simulation_with("support-triage", timing);
        sim.start(RunMode::Normal).expect("starts");
        sim.run_until_settled().expect("runs");

        let gate = id("sign-off");
        assert_eq!(sim.state(), &EngineState::Running);
        assert_eq!(sim.working().status(&gate), Some(NodeStatus::Running));
        assert_eq!(sim.working().approval(&gate), Some(ApprovalState::Waiting));

        let decided_at = sim.now_ms();
        sim.resolve_approval(&gate, ApprovalDecision::Approved)
            .expect("waiting gate");
        sim.run_until_settled().expect("runs");

        let events = sim.drain_events();
        assert_eq!(
            time_of(&events, "sign-off", NodeStatus::Completed),
            decided_at + sim.timing().approval_resume_ms
        );
        assert_eq!(sim.working().status(&id("respond")), Some(NodeStatus::Completed));
    }

    #[test]
    fn approval_errors() {
        let mut sim = simulation("support-triage");
        assert_eq!(
            sim.resolve_approval(&id("classify"), ApprovalDecision::Approved),
            Err(InteractionError::NotAnApprovalNode {
                node_id: id("classify")
            })
        );
        assert_eq!(
            sim.resolve_approval(&id("ghost"), ApprovalDecision::Approved),
            Err(InteractionError::UnknownNode { node_id: id("ghost") })
        );
    }

    #[test]
    fn reset_after_run_restores_baseline() {
        let mut sim = simulation("support-triage");
        sim.toggle_pin(&id("classify")).expect("known node");
        sim.start(RunMode::Normal).expect("starts");
        sim.run_until_settled().expect("runs");
        sim.reset();

        assert_eq!(sim.state(), &EngineState::Idle);
        assert!(sim.snapshot().all(NodeStatus::Idle));
        assert!(sim.snapshot().execution_data.is_empty());
        assert_eq!(sim.working().approval(&id("sign-off")), Some(ApprovalState::Waiting));
        for node in sim.working().nodes() {
            if let Some(breaker) = node.circuit_breaker {
                assert_eq!(breaker.status, BreakerStatus::Closed);
            }
        }
        assert!(sim.working().get(&id("classify")).is_some_and(|n| n.pinned));
        assert_eq!(sim.run_id(), None);
    }

    #[test]
    fn stop_leaves_nodes_mid_flight() {
        let mut sim = simulation("linear");
        sim.start(RunMode::Normal).expect("starts");
        sim.advance_to(1600).expect("advances");
        assert_eq!(sim.working().status(&id("p1")), Some(NodeStatus::Running));

        sim.stop();
        assert_eq!(sim.state(), &EngineState::Stopped);
        assert_eq!(sim.next_due(), None);
        sim.advance_to(100_000).expect("no-op");
        assert_eq!(sim.working().status(&id("p1")), Some(NodeStatus::Running));
        assert_eq!(sim.working().status(&id("o1")), Some(NodeStatus::Idle));
    }

    #[test]
    fn restarting_discards_the_previous_run() {
        let mut sim = simulation("linear");
        let first = sim.start(RunMode::Normal).expect("starts");
        sim.advance_to(1600).expect("advances");
        let second = sim.start(RunMode::Normal).expect("restarts");
        assert_ne!(first, second);
        assert_eq!(sim.working().status(&id("p1")), Some(NodeStatus::Idle));

        sim.drain_events();
        sim.run_until_settled().expect("runs");
        let events = sim.drain_events();
        assert!(events.iter().all(|e| e.run_id().is_none_or(|run| run == second)));
        assert!(sim.snapshot().all(NodeStatus::Completed));
    }

    #[test]
    fn completed_nodes_expose_execution_data() {
        let mut sim = simulation("linear");
        sim.start(RunMode::Normal).expect("starts");
        sim.advance_to(1100).expect("advances");

        let snapshot = sim.snapshot();
        assert_eq!(snapshot.execution_data.len(), 1);
        let data = &snapshot.execution_data[&id("t1")];
        assert_eq!(data["startedAtMs"], 500);
        assert_eq!(data["completedAtMs"], 1100);
    }

    #[test]
    fn double_scheduling_is_rejected() {
        let mut sim = simulation("linear");
        sim.start(RunMode::Normal).expect("starts");
        assert_eq!(
            sim.schedule(&id("t1"), 0, Step::Complete),
            Err(SimulationStateError::DoubleScheduled { node_id: id("t1") })
        );
    }

    #[test]
    fn invariant_violation_halts_and_resets() {
        let mut sim = simulation("linear");
        sim.start(RunMode::Normal).expect("starts");
        sim.advance_to(500).expect("advances");
        sim.scheduler.schedule_in(
            0,
            Scheduled {
                node: id("o1"),
                step: Step::Complete,
            },
        );

        let err = sim.advance_to(600).expect_err("illegal transition");
        assert!(matches!(err, SimulationStateError::IllegalTransition { .. }));
        assert_eq!(
            sim.state(),
            &EngineState::Finished {
                outcome: RunOutcome::Halted
            }
        );
        assert!(sim.snapshot().all(NodeStatus::Idle));
        assert_eq!(sim.take_halt(), Some(err));
        assert!(
            sim.drain_events()
                .iter()
                .any(|e| matches!(e, SimulationEvent::RunHalted { .. }))
        );
    }

    #[test]
    fn custom_rules_replace_defaults() {
        let loaded = GraphCatalog::default().load("support-triage").expect("loads");
        let rules = vec![EffectRule::new(
            crate::effects::Selector::Node(id("escalate")),
            Lifecycle::Completed,
            vec![Effect::PulseCircuitBreaker],
        )];
        let mut sim = Simulation::new(&loaded, TimingConfig::default()).with_rules(rules);
        sim.start(RunMode::Normal).expect("starts");
        sim.run_until_settled().expect("runs");

        let pulsed: Vec<NodeId> = sim
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                SimulationEvent::BreakerChanged {
                    node_id,
                    status: BreakerStatus::HalfOpen,
                    ..
                } => Some(node_id),
                _ => None,
            })
            .collect();
        assert_eq!(pulsed, vec![id("escalate")]);
        assert_eq!(sim.working().status(&id("classify-fallback")), Some(NodeStatus::Idle));
        assert_eq!(sim.working().revealed(&id("escalate")), 0);
    }
}
