mod scenario;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use ludics::{DialogueEngine, DialogueEvent, EngineConfig, InMemoryMoveStore, TargetRef, TargetType};
use scenario::Scenario;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Engine config file (TOML); LUDICS_* variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Insert scenario moves without validation instead of submitting them
    #[arg(long, global = true, default_value_t = false)]
    seed: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit every scenario move and print the outcomes
    Replay { scenario: PathBuf },

    /// Print the moves an actor may play at a locus
    Legal {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long, default_value = "0")]
        locus: String,
        #[arg(long)]
        actor: String,
    },

    /// Print the loci where a daimon may be placed
    Hints {
        #[command(flatten)]
        target: TargetArgs,
        /// Print every locus with its closure status instead
        #[arg(long, default_value_t = false)]
        report: bool,
    },

    /// Print the compiled interaction tree
    Tree {
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Args, Debug)]
struct TargetArgs {
    scenario: PathBuf,
    #[arg(long)]
    dialogue: String,
    #[arg(long, default_value = "claim")]
    target_type: TargetType,
    #[arg(long)]
    target_id: String,
}

impl TargetArgs {
    fn target(&self) -> TargetRef {
        TargetRef::new(&self.dialogue, self.target_type, &self.target_id)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    let path = match &cli.command {
        Command::Replay { scenario } => scenario,
        Command::Legal { target, .. } | Command::Hints { target, .. } | Command::Tree { target } => {
            &target.scenario
        }
    };
    let scenario = Scenario::from_file(path)?;
    info!(
        scenario = %path.display(),
        targets = scenario.authors.len(),
        moves = scenario.moves.len(),
        "Loaded scenario"
    );

    let engine = DialogueEngine::with_config(
        InMemoryMoveStore::new().shared(),
        scenario.authors().shared(),
        config,
    )
    .with_events();

    let events = engine
        .event_bus()
        .map(|bus| bus.subscribe())
        .context("engine has no event bus")?;
    let listener = tokio::spawn(log_events(events));

    let outcomes = if cli.seed {
        scenario.seed(&engine)?;
        Vec::new()
    } else {
        scenario.replay(&engine)?
    };

    match &cli.command {
        Command::Replay { .. } => print_json(&outcomes)?,
        Command::Legal { target, locus, actor } => {
            print_json(&engine.legal_moves(&target.target(), locus, actor)?)?
        }
        Command::Hints { target, report } => {
            if *report {
                print_json(&engine.closure_report(&target.target())?)?
            } else {
                print_json(&engine.closure_hints(&target.target())?)?
            }
        }
        Command::Tree { target } => print_json(&*engine.compiled_tree(&target.target())?)?,
    }

    drop(engine);
    if let Err(e) = listener.await {
        warn!(error = %e, "Event listener failed");
    }
    Ok(())
}

/// Log every event at debug level until the bus closes. Returns how many
/// were logged; a lagging receiver skips ahead instead of stopping.
async fn log_events(mut events: broadcast::Receiver<DialogueEvent>) -> usize {
    let mut logged = 0;
    loop {
        match events.recv().await {
            Ok(event) => {
                let body = serde_json::to_string(&event).unwrap_or_default();
                tracing::debug!(event_type = event.event_type(), "{}", body);
                logged += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event listener lagged");
            }
            Err(RecvError::Closed) => return logged,
        }
    }
}
