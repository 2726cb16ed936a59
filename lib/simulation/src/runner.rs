//! Async runner driving a [`Session`] on a virtual clock.
//!
//! The session lives on one task. Commands arrive over an mpsc channel with a
//! oneshot reply each; events fan out over a broadcast channel and the latest
//! snapshot is kept in a watch channel. The virtual clock maps engine
//! milliseconds onto tokio time through a speed multiplier and stands still
//! whenever the engine is not running.

use crate::error::SessionError;
use crate::events::{EngineState, SimulationEvent, StatusSnapshot};
use crate::session::{Command, Reply, Session};
use rootcause::prelude::Report;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

/// Runner configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunnerConfig {
    /// Virtual milliseconds per wall millisecond.
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Events buffered per subscriber before the slowest one lags.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

fn default_speed() -> f64 {
    1.0
}

fn default_event_capacity() -> usize {
    256
}

fn default_command_capacity() -> usize {
    32
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            event_capacity: default_event_capacity(),
            command_capacity: default_command_capacity(),
        }
    }
}

type ReplyResult = Result<Reply, Report<SessionError>>;

struct Request {
    command: Command,
    reply: oneshot::Sender<ReplyResult>,
}

/// A cloneable handle to a running session.
#[derive(Clone)]
pub struct SimulationHandle {
    commands: mpsc::Sender<Request>,
    events: broadcast::Sender<SimulationEvent>,
    snapshots: watch::Receiver<StatusSnapshot>,
}

impl SimulationHandle {
    /// Sends a command and waits for its reply.
    ///
    /// # Errors
    ///
    /// Returns the session's error, or `SessionError::RunnerClosed` if the
    /// runner task is gone.
    pub async fn send(&self, command: Command) -> ReplyResult {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Request { command, reply })
            .await
            .map_err(|_| SessionError::RunnerClosed)?;
        response.await.map_err(|_| SessionError::RunnerClosed)?
    }

    /// Subscribes to events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SimulationEvent> {
        self.events.subscribe()
    }

    /// Returns the latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshots.borrow().clone()
    }

    #[must_use]
    pub fn snapshots(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshots.clone()
    }

    /// Waits until a published snapshot satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::RunnerClosed` if the runner stops first.
    pub async fn wait_for(
        &self,
        predicate: impl Fn(&StatusSnapshot) -> bool,
    ) -> Result<StatusSnapshot, Report<SessionError>> {
        let mut rx = self.snapshots.clone();
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if predicate(&snapshot) {
                    return Ok(snapshot.clone());
                }
            }
            rx.changed().await.map_err(|_| SessionError::RunnerClosed)?;
        }
    }
}

/// Maps engine time onto tokio time.
#[derive(Debug, Clone, Copy)]
struct VirtualClock {
    anchor_real: Instant,
    anchor_virtual: u64,
    speed: f64,
}

impl VirtualClock {
    fn new(speed: f64, at_ms: u64) -> Self {
        Self {
            anchor_real: Instant::now(),
            anchor_virtual: at_ms,
            speed,
        }
    }

    /// Pins the clock to `at_ms` as of now.
    fn anchor(&mut self, at_ms: u64) {
        self.anchor_real = Instant::now();
        self.anchor_virtual = at_ms;
    }

    fn now_ms(&self) -> u64 {
        let elapsed = self.anchor_real.elapsed().as_nanos() as f64;
        self.anchor_virtual + (elapsed * self.speed / 1_000_000.0) as u64
    }

    fn real_duration(&self, virtual_ms: u64) -> Duration {
        Duration::from_nanos((virtual_ms as f64 * 1_000_000.0 / self.speed).round() as u64)
    }

    fn instant_for(&self, at_ms: u64) -> Instant {
        self.anchor_real + self.real_duration(at_ms.saturating_sub(self.anchor_virtual))
    }
}

/// Spawns the runner task for `session`.
///
/// The task ends when every handle has been dropped.
pub fn spawn(mut session: Session, config: RunnerConfig) -> (SimulationHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
    let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
    let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
    // Events from before the first subscriber are dropped.
    publish(&mut session, &event_tx, &snapshot_tx);

    let handle = SimulationHandle {
        commands: command_tx,
        events: event_tx.clone(),
        snapshots: snapshot_rx,
    };
    let task = tokio::spawn(run(session, config, command_rx, event_tx, snapshot_tx));
    (handle, task)
}

async fn run(
    mut session: Session,
    config: RunnerConfig,
    mut commands: mpsc::Receiver<Request>,
    events: broadcast::Sender<SimulationEvent>,
    snapshots: watch::Sender<StatusSnapshot>,
) {
    let speed = if config.speed.is_finite() && config.speed > 0.0 {
        config.speed
    } else {
        warn!(speed = config.speed, "invalid speed, using 1.0");
        1.0
    };
    let mut clock = VirtualClock::new(speed, session.now_ms());
    let replay_interval = session.timing().replay_interval_ms;
    let mut replay_tick: Option<Instant> = None;

    info!(
        variant = %session.loaded().variant.key,
        speed,
        "simulation runner started"
    );

    loop {
        let due = session.next_due();
        let due_at = due.map_or_else(Instant::now, |at| clock.instant_for(at));
        if session.replay_playing() {
            replay_tick.get_or_insert_with(|| Instant::now() + clock.real_duration(replay_interval));
        } else {
            replay_tick = None;
        }
        let tick_at = replay_tick.unwrap_or_else(Instant::now);

        tokio::select! {
            request = commands.recv() => {
                let Some(Request { command, reply }) = request else {
                    break;
                };
                debug!(?command, "command received");
                if matches!(session.state(), EngineState::Running) {
                    let now = clock.now_ms();
                    if let Err(err) = session.advance_to(now) {
                        error!(error = %err, "run halted");
                    }
                }
                let result = session.apply(command);
                clock.anchor(session.now_ms());
                publish(&mut session, &events, &snapshots);
                // The caller may have stopped waiting.
                let _ = reply.send(result);
            }
            () = sleep_until(due_at), if due.is_some() => {
                let target = due.map_or(0, |at| clock.now_ms().max(at));
                if let Err(err) = session.advance_to(target) {
                    error!(error = %err, "run halted");
                }
                clock.anchor(session.now_ms());
                publish(&mut session, &events, &snapshots);
            }
            () = sleep_until(tick_at), if replay_tick.is_some() => {
                replay_tick = None;
                session.tick_replay();
                publish(&mut session, &events, &snapshots);
            }
        }
    }
    debug!("simulation runner stopped");
}

fn publish(
    session: &mut Session,
    events: &broadcast::Sender<SimulationEvent>,
    snapshots: &watch::Sender<StatusSnapshot>,
) {
    for event in session.drain_events() {
        // No subscribers is fine.
        let _ = events.send(event);
    }
    snapshots.send_replace(session.snapshot());
}
