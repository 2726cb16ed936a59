//! The session command surface.
//!
//! A `Session` owns the catalog, the selected variant, its simulation and an
//! optional replay. It is the single writer of the working graph: every user
//! action arrives as a [`Command`] and is answered with a [`Reply`].

use crate::engine::Simulation;
use crate::error::{InteractionError, SessionError, SimulationStateError};
use crate::events::{ApprovalDecision, EngineState, RunMode, SimulationEvent, StatusSnapshot};
use crate::inspect::{NodeInspection, inspect};
use crate::replay::{ReplayController, StepDirection};
use crate::timing::TimingConfig;
use flowlab_workflow::{ErrorDirective, GraphCatalog, LoadedGraph, NodeId, NodeStatus};
use rootcause::prelude::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

/// A user action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Switch variant; the working copy and its edits are discarded.
    SelectVariant { key: String },
    Run { mode: RunMode },
    Stop,
    Reset,
    Resume,
    StartReplay,
    StepReplay { direction: StepDirection },
    /// Toggle replay playback.
    PlayReplay,
    SeekReplay { position: usize },
    /// Leave replay and show the simulation again.
    StopReplay,
    TogglePin { node: NodeId },
    SetCustomColor { node: NodeId, color: Option<String> },
    ToggleBreakpoint { node: NodeId },
    SetErrorDirective {
        node: NodeId,
        directive: Option<ErrorDirective>,
    },
    ResolveApproval {
        node: NodeId,
        decision: ApprovalDecision,
    },
    Inspect { node: NodeId },
    Snapshot,
}

/// The answer to a [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reply", content = "body", rename_all = "snake_case")]
pub enum Reply {
    Snapshot(Box<StatusSnapshot>),
    Inspection(Box<NodeInspection>),
    Ack,
}

pub struct Session {
    catalog: GraphCatalog,
    timing: TimingConfig,
    loaded: LoadedGraph,
    simulation: Simulation,
    replay: Option<ReplayController>,
    events: Vec<SimulationEvent>,
}

impl Session {
    /// Creates a session with `key` selected.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::VariantUnavailable` if the variant does not
    /// exist or fails validation.
    pub fn new(
        catalog: GraphCatalog,
        key: &str,
        timing: TimingConfig,
    ) -> Result<Self, Report<SessionError>> {
        let loaded = load(&catalog, key)?;
        let simulation = Simulation::new(&loaded, timing.clone());
        let mut session = Self {
            catalog,
            timing,
            loaded,
            simulation,
            replay: None,
            events: Vec::new(),
        };
        session.announce_variant();
        Ok(session)
    }

    /// Switches to another variant with a fresh working copy.
    ///
    /// On failure the current variant stays selected.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::VariantUnavailable`.
    pub fn select_variant(&mut self, key: &str) -> Result<(), Report<SessionError>> {
        let loaded = load(&self.catalog, key)?;
        self.simulation.stop();
        self.collect();
        self.simulation = Simulation::new(&loaded, self.timing.clone());
        self.loaded = loaded;
        self.replay = None;
        self.announce_variant();
        Ok(())
    }

    #[must_use]
    pub fn catalog(&self) -> &GraphCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn loaded(&self) -> &LoadedGraph {
        &self.loaded
    }

    #[must_use]
    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    #[must_use]
    pub fn replay(&self) -> Option<&ReplayController> {
        self.replay.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> &EngineState {
        self.simulation.state()
    }

    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.simulation.now_ms()
    }

    #[must_use]
    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Returns when the simulation next needs to advance.
    pub fn next_due(&mut self) -> Option<u64> {
        self.simulation.next_due()
    }

    /// Returns true while replay playback is running.
    #[must_use]
    pub fn replay_playing(&self) -> bool {
        self.replay.as_ref().is_some_and(ReplayController::is_playing)
    }

    /// Advances the simulation to `at_ms`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::RunHalted` if an engine invariant failed.
    pub fn advance_to(&mut self, at_ms: u64) -> Result<(), Report<SessionError>> {
        let result = self.simulation.advance_to(at_ms);
        self.settle(result)
    }

    /// Advances replay playback by one step. Returns true if it moved.
    pub fn tick_replay(&mut self) -> bool {
        let Some(replay) = self.replay.as_mut() else {
            return false;
        };
        let moved = replay.tick();
        if moved {
            self.announce_replay();
        }
        moved
    }

    /// Takes the events emitted since the last call, in order.
    pub fn drain_events(&mut self) -> Vec<SimulationEvent> {
        self.collect();
        std::mem::take(&mut self.events)
    }

    /// Captures the displayed statuses. While replaying, statuses are
    /// derived from the replay position.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        let mut snapshot = self.simulation.snapshot();
        if let Some(replay) = &self.replay {
            for (node_id, status) in &mut snapshot.statuses {
                *status = replay.status_of(node_id);
            }
            snapshot.execution_data = snapshot
                .statuses
                .iter()
                .filter(|(_, status)| **status == NodeStatus::Completed)
                .filter_map(|(node_id, _)| {
                    let data = self.simulation.working().get(node_id)?.execution_data.clone()?;
                    Some((node_id.clone(), json!({ "data": data })))
                })
                .collect();
            snapshot.replay_position = Some(replay.position());
        }
        snapshot
    }

    /// Applies one command.
    ///
    /// # Errors
    ///
    /// - `InvalidCommand` if a user edit or decision was rejected
    /// - `ReplayNotStarted` for replay commands before `StartReplay`
    /// - `RunHalted` if the run hit an engine invariant violation
    /// - `VariantUnavailable` if a variant switch failed
    pub fn apply(&mut self, command: Command) -> Result<Reply, Report<SessionError>> {
        let reply = match command {
            Command::SelectVariant { key } => {
                self.select_variant(&key)?;
                self.snapshot_reply()
            }
            Command::Run { mode } => {
                self.replay = None;
                let result = self.simulation.start(mode).map(|_| ());
                self.settle(result)?;
                self.snapshot_reply()
            }
            Command::Stop => {
                if self.replay_playing() {
                    self.replay_mut()?.play_toggle();
                }
                self.simulation.stop();
                self.snapshot_reply()
            }
            Command::Reset => {
                self.replay = None;
                self.simulation.reset();
                self.snapshot_reply()
            }
            Command::Resume => {
                rejected(self.simulation.resume())?;
                self.check_halt()?;
                self.snapshot_reply()
            }
            Command::StartReplay => {
                info!(variant = %self.loaded.variant.key, "replay started");
                self.replay = Some(ReplayController::new(&self.loaded.presentation));
                self.announce_replay();
                self.snapshot_reply()
            }
            Command::StepReplay { direction } => {
                self.replay_mut()?.step(direction);
                self.announce_replay();
                self.snapshot_reply()
            }
            Command::PlayReplay => {
                self.replay_mut()?.play_toggle();
                self.announce_replay();
                self.snapshot_reply()
            }
            Command::SeekReplay { position } => {
                self.replay_mut()?.seek(position);
                self.announce_replay();
                self.snapshot_reply()
            }
            Command::StopReplay => {
                self.replay = None;
                self.snapshot_reply()
            }
            Command::TogglePin { node } => {
                rejected(self.simulation.toggle_pin(&node))?;
                Reply::Ack
            }
            Command::SetCustomColor { node, color } => {
                rejected(self.simulation.set_custom_color(&node, color))?;
                Reply::Ack
            }
            Command::ToggleBreakpoint { node } => {
                rejected(self.simulation.toggle_breakpoint(&node))?;
                Reply::Ack
            }
            Command::SetErrorDirective { node, directive } => {
                rejected(self.simulation.set_error_directive(&node, directive))?;
                Reply::Ack
            }
            Command::ResolveApproval { node, decision } => {
                rejected(self.simulation.resolve_approval(&node, decision))?;
                self.check_halt()?;
                self.snapshot_reply()
            }
            Command::Inspect { node } => {
                let replay_status = self.replay.as_ref().map(|replay| replay.status_of(&node));
                let inspection = rejected(inspect(&self.simulation, &node, replay_status))?;
                Reply::Inspection(Box::new(inspection))
            }
            Command::Snapshot => self.snapshot_reply(),
        };
        self.collect();
        Ok(reply)
    }

    fn snapshot_reply(&self) -> Reply {
        Reply::Snapshot(Box::new(self.snapshot()))
    }

    fn replay_mut(&mut self) -> Result<&mut ReplayController, Report<SessionError>> {
        Ok(self.replay.as_mut().ok_or(SessionError::ReplayNotStarted)?)
    }

    /// Moves engine events into the session stream so they stay ordered
    /// with session events.
    fn collect(&mut self) {
        let events = self.simulation.drain_events();
        self.events.extend(events);
    }

    fn settle(&mut self, result: Result<(), SimulationStateError>) -> Result<(), Report<SessionError>> {
        self.simulation.take_halt();
        result.context(SessionError::RunHalted)
    }

    fn check_halt(&mut self) -> Result<(), Report<SessionError>> {
        match self.simulation.take_halt() {
            Some(err) => Err::<(), _>(err).context(SessionError::RunHalted),
            None => Ok(()),
        }
    }

    fn announce_variant(&mut self) {
        info!(
            variant = %self.loaded.variant.key,
            version = %self.loaded.version,
            "variant selected"
        );
        self.collect();
        self.events.push(SimulationEvent::VariantSelected {
            key: self.loaded.variant.key.clone(),
            graph_version: self.loaded.version,
            at_ms: self.simulation.now_ms(),
        });
    }

    fn announce_replay(&mut self) {
        let Some(replay) = &self.replay else {
            return;
        };
        let event = SimulationEvent::ReplayMoved {
            position: replay.position(),
            playing: replay.is_playing(),
            at_ms: self.simulation.now_ms(),
        };
        self.collect();
        self.events.push(event);
    }
}

fn load(catalog: &GraphCatalog, key: &str) -> Result<LoadedGraph, Report<SessionError>> {
    catalog.load(key).context(SessionError::VariantUnavailable {
        key: key.to_string(),
    })
}

fn rejected<T>(result: Result<T, InteractionError>) -> Result<T, Report<SessionError>> {
    result
        .inspect_err(|err| warn!(error = %err, "command rejected"))
        .context(SessionError::InvalidCommand)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RunOutcome;

    fn session(key: &str) -> Session {
        Session::new(GraphCatalog::default(), key, TimingConfig::default()).expect("session")
    }

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    fn snapshot(reply: Reply) -> StatusSnapshot {
        match reply {
            Reply::Snapshot(snapshot) => *snapshot,
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    fn run_to_end(session: &mut Session) {
        while let Some(at) = session.next_due() {
            session.advance_to(at).expect("advances");
        }
    }

    #[test]
    fn unknown_variant_is_unavailable() {
        let err = Session::new(GraphCatalog::default(), "nope", TimingConfig::default())
            .err()
            .expect("unknown variant");
        assert!(err.to_string().contains("'nope' is unavailable"));
    }

    #[test]
    fn run_command_drives_simulation() {
        let mut session = session("linear");
        let started = snapshot(session.apply(Command::Run { mode: RunMode::Normal }).expect("runs"));
        assert_eq!(started.state, EngineState::Running);
        assert!(started.run_id.is_some());

        run_to_end(&mut session);
        let done = snapshot(session.apply(Command::Snapshot).expect("snapshot"));
        assert!(done.all(NodeStatus::Completed));
        assert_eq!(done.execution_data.len(), 3);
        assert_eq!(
            done.state,
            EngineState::Finished {
                outcome: RunOutcome::Completed
            }
        );
    }

    #[test]
    fn switching_variants_discards_edits() {
        let mut session = session("linear");
        session
            .apply(Command::TogglePin { node: id("p1") })
            .expect("known node");
        assert!(session.simulation().working().get(&id("p1")).is_some_and(|n| n.pinned));

        session
            .apply(Command::SelectVariant {
                key: "fork-join".to_string(),
            })
            .expect("switches");
        session
            .apply(Command::SelectVariant {
                key: "linear".to_string(),
            })
            .expect("switches back");
        assert!(session.simulation().working().get(&id("p1")).is_some_and(|n| !n.pinned));
        assert!(
            session
                .loaded()
                .graph
                .get_node(&id("p1"))
                .is_some_and(|n| !n.pinned)
        );
    }

    #[test]
    fn failed_switch_keeps_current_variant() {
        let mut session = session("linear");
        let err = session
            .apply(Command::SelectVariant {
                key: "missing".to_string(),
            })
            .expect_err("unknown variant");
        assert!(err.to_string().contains("unavailable"));
        assert_eq!(session.loaded().variant.key, "linear");
    }

    #[test]
    fn replay_commands_require_started_replay() {
        let mut session = session("linear");
        let err = session
            .apply(Command::StepReplay {
                direction: StepDirection::Forward,
            })
            .expect_err("not started");
        assert!(err.to_string().contains("replay has not been started"));
    }

    #[test]
    fn replay_drives_displayed_statuses() {
        let mut session = session("linear");
        let start = snapshot(session.apply(Command::StartReplay).expect("starts"));
        assert_eq!(start.replay_position, Some(0));
        assert_eq!(start.status(&id("t1")), Some(NodeStatus::Running));

        let stepped = snapshot(
            session
                .apply(Command::StepReplay {
                    direction: StepDirection::Forward,
                })
                .expect("steps"),
        );
        assert_eq!(stepped.status(&id("t1")), Some(NodeStatus::Completed));
        assert_eq!(stepped.status(&id("p1")), Some(NodeStatus::Running));
        assert!(stepped.execution_data.contains_key(&id("t1")));

        let inspection = match session.apply(Command::Inspect { node: id("p1") }).expect("inspects") {
            Reply::Inspection(inspection) => inspection,
            other => panic!("expected inspection, got {other:?}"),
        };
        assert_eq!(inspection.status, NodeStatus::Running);

        let left = snapshot(session.apply(Command::StopReplay).expect("stops"));
        assert_eq!(left.replay_position, None);
        assert!(left.all(NodeStatus::Idle));
    }

    #[test]
    fn replay_playback_ticks_to_end() {
        let mut session = session("linear");
        session.apply(Command::StartReplay).expect("starts");
        session.apply(Command::PlayReplay).expect("plays");
        assert!(session.replay_playing());
        while session.tick_replay() {}
        assert!(!session.replay_playing());
        assert_eq!(session.snapshot().replay_position, Some(3));

        let moves = session
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, SimulationEvent::ReplayMoved { .. }))
            .count();
        assert_eq!(moves, 5);
    }

    #[test]
    fn invalid_edits_are_rejected_without_halting() {
        let mut session = session("linear");
        session.apply(Command::Run { mode: RunMode::Normal }).expect("runs");
        let err = session
            .apply(Command::ToggleBreakpoint { node: id("ghost") })
            .expect_err("unknown node");
        assert!(err.to_string().contains("command rejected"));
        assert_eq!(session.state(), &EngineState::Running);

        let err = session
            .apply(Command::ResolveApproval {
                node: id("p1"),
                decision: ApprovalDecision::Approved,
            })
            .expect_err("not a gate");
        assert!(err.to_string().contains("command rejected"));
    }

    #[test]
    fn debug_run_pauses_and_resumes() {
        let mut session = session("linear");
        session
            .apply(Command::ToggleBreakpoint { node: id("o1") })
            .expect("known node");
        session.apply(Command::Run { mode: RunMode::Debug }).expect("runs");
        run_to_end(&mut session);
        assert_eq!(session.state(), &EngineState::Paused { node: id("o1") });

        session.apply(Command::Resume).expect("resumes");
        run_to_end(&mut session);
        assert!(session.snapshot().all(NodeStatus::Completed));
    }

    #[test]
    fn events_start_with_variant_selection() {
        let mut session = session("fork-join");
        session.apply(Command::Run { mode: RunMode::Normal }).expect("runs");
        let events = session.drain_events();
        assert!(matches!(events[0], SimulationEvent::VariantSelected { .. }));
        assert!(matches!(events[1], SimulationEvent::RunStarted { .. }));
    }

    #[test]
    fn commands_deserialize_from_tagged_json() {
        let command: Command = serde_json::from_value(serde_json::json!({
            "command": "resolve_approval",
            "node": "sign-off",
            "decision": "rejected"
        }))
        .expect("deserialize");
        assert_eq!(
            command,
            Command::ResolveApproval {
                node: id("sign-off"),
                decision: ApprovalDecision::Rejected
            }
        );
    }
}
