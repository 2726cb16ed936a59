//! `flowlab`: run and replay built-in graph simulations from the terminal.
//!
//! JSON goes to stdout, logs go to stderr.

mod config;
mod error;

use crate::config::FlowlabConfig;
use crate::error::CliError;
use clap::{Parser, Subcommand};
use flowlab_simulation::{
    ApprovalDecision, Command, Reply, RunMode, Session, SimulationEvent, SimulationHandle,
    StatusSnapshot, runner,
};
use flowlab_workflow::{GraphCatalog, NodeId};
use rootcause::prelude::ResultExt;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

type CliResult<T = ()> = flowlab_core::Result<T, CliError>;

#[derive(Debug, Parser)]
#[command(name = "flowlab", version, about = "Simulate workflow graphs")]
struct Cli {
    /// Configuration file (TOML or JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// List the built-in graph variants.
    List,
    /// Print the execution order of a variant.
    Order { variant: String },
    /// Print the inspection of one node.
    Inspect { variant: String, node: String },
    /// Simulate a variant and stream its events.
    Run {
        variant: String,
        /// Honor breakpoints; each pause is printed and then resumed.
        #[arg(long)]
        debug: bool,
        /// Set a breakpoint on a node. Only honored with `--debug`.
        #[arg(long = "break", value_name = "NODE")]
        breakpoints: Vec<String>,
        /// Reject an approval gate ahead of time.
        #[arg(long, value_name = "NODE")]
        reject: Option<String>,
        /// Virtual milliseconds per wall millisecond.
        #[arg(long)]
        speed: Option<f64>,
    },
    /// Print replay snapshots of a variant.
    Replay {
        variant: String,
        /// Print only this position.
        #[arg(long)]
        position: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match FlowlabConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match execute(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("error: {report}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: CliCommand, config: FlowlabConfig) -> CliResult {
    let catalog = GraphCatalog::builtin(&config.layout);
    match command {
        CliCommand::List => print_json(&catalog.summaries()),
        CliCommand::Order { variant } => {
            let loaded = catalog.load(&variant).context(CliError::Session)?;
            print_json(&json!({
                "variant": loaded.variant.key,
                "graphVersion": loaded.version,
                "order": loaded.order.as_slice(),
                "presentation": loaded.presentation.as_slice(),
            }))
        }
        CliCommand::Inspect { variant, node } => {
            let mut session = open(catalog, &variant, &config)?;
            let reply = session
                .apply(Command::Inspect {
                    node: NodeId::from(node),
                })
                .context(CliError::Session)?;
            print_reply(&reply)
        }
        CliCommand::Run {
            variant,
            debug,
            breakpoints,
            reject,
            speed,
        } => {
            let mut session = open(catalog, &variant, &config)?;
            for node in breakpoints {
                session
                    .apply(Command::ToggleBreakpoint {
                        node: NodeId::from(node),
                    })
                    .context(CliError::Session)?;
            }
            if let Some(node) = reject {
                session
                    .apply(Command::ResolveApproval {
                        node: NodeId::from(node),
                        decision: ApprovalDecision::Rejected,
                    })
                    .context(CliError::Session)?;
            }
            let mut runner_config = config.runner.clone();
            if let Some(speed) = speed {
                runner_config.speed = speed;
            }
            let mode = if debug { RunMode::Debug } else { RunMode::Normal };
            let (handle, _task) = runner::spawn(session, runner_config);
            let snapshot = stream_run(&handle, mode).await?;
            print_json(&snapshot)
        }
        CliCommand::Replay { variant, position } => {
            let mut session = open(catalog, &variant, &config)?;
            session
                .apply(Command::StartReplay)
                .context(CliError::Session)?;
            let positions = match position {
                Some(position) => position..=position,
                None => 0..=session.loaded().presentation.len(),
            };
            for position in positions {
                let reply = session
                    .apply(Command::SeekReplay { position })
                    .context(CliError::Session)?;
                print_reply(&reply)?;
            }
            Ok(())
        }
    }
}

fn open(catalog: GraphCatalog, variant: &str, config: &FlowlabConfig) -> CliResult<Session> {
    Session::new(catalog, variant, config.timing.clone()).context(CliError::Session)
}

/// Starts a run and prints its events until it finishes or Ctrl-C stops it.
async fn stream_run(handle: &SimulationHandle, mode: RunMode) -> CliResult<StatusSnapshot> {
    let mut events = handle.subscribe();
    handle
        .send(Command::Run { mode })
        .await
        .context(CliError::Session)?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    print_json(&event)?;
                    match event {
                        SimulationEvent::RunPaused { node_id, .. } => {
                            info!(node_id = %node_id, "breakpoint hit, resuming");
                            handle.send(Command::Resume).await.context(CliError::Session)?;
                        }
                        SimulationEvent::RunFinished { .. } | SimulationEvent::RunStopped { .. } => {
                            break;
                        }
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping run");
                handle.send(Command::Stop).await.context(CliError::Session)?;
                break;
            }
        }
    }
    Ok(handle.snapshot())
}

fn print_reply(reply: &Reply) -> CliResult {
    match reply {
        Reply::Snapshot(snapshot) => print_json(snapshot),
        Reply::Inspection(inspection) => print_json(inspection),
        Reply::Ack => Ok(()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    let line = serde_json::to_string(value).context(CliError::Output)?;
    println!("{line}");
    Ok(())
}
