//! SkyAid - plan and fly a medical supply delivery round trip.
//!
//! Usage:
//!   skyaid optimize [--scenario file.json] [--seed N]
//!   skyaid simulate [--scenario file.json] [--seed N] [--tick-ms N] [--max-ticks N] [--random-hazard] [--commands]
//!
//! Results go to stdout as JSON, logs go to stderr. With `--commands`, stdin
//! takes one operator command per line: pause, resume, stop or reroute.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use skyaid_cli::scenario::{self, Scenario};
use skyaid_cli::{run_delivery_loop, AppState, Config, LoopOutcome};
use skyaid_core::{optimize_with_report, DeliveryCommand, DeliveryController, DeliverySnapshot};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "skyaid", author, version, about = "Drone delivery route planner and simulator")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Optimize the visiting order and print the route
    Optimize(PlanArgs),
    /// Optimize, then fly the route and stream one snapshot per tick
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
struct PlanArgs {
    /// Scenario JSON file (defaults to the built-in hospital demo)
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Seed for the genetic algorithm and hazard placement
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    #[command(flatten)]
    plan: PlanArgs,

    /// Wall-clock milliseconds between ticks
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Give up after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Drop one random hazard on a leg of the optimized route
    #[arg(long)]
    random_hazard: bool,

    /// Read operator commands (pause, resume, stop, reroute) from stdin
    #[arg(long)]
    commands: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    let config = Config::from_env();
    match cli.command {
        Command::Optimize(args) => run_optimize(&args, &config),
        Command::Simulate(args) => run_simulate(&args, &config).await,
    }
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("skyaid=info".parse()?);
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

/// Resolve the scenario and apply flag and environment overrides.
fn load_scenario(args: &PlanArgs, config: &Config) -> Result<Scenario> {
    let mut scenario = match &args.scenario {
        Some(path) => Scenario::load(path)?,
        None => {
            tracing::info!("No scenario given, using the built-in hospital demo");
            Scenario::demo()
        }
    };

    if let Some(seed) = args.seed.or(config.seed) {
        scenario.optimizer.seed = Some(seed);
    }
    if let Some(speed_kmh) = config.speed_kmh {
        scenario.simulation.speed_kmh = speed_kmh;
    }
    if let Some(tick_seconds) = config.tick_seconds {
        scenario.simulation.tick_seconds = tick_seconds;
    }
    Ok(scenario)
}

fn run_optimize(args: &PlanArgs, config: &Config) -> Result<()> {
    let scenario = load_scenario(args, config)?;
    let report = optimize_with_report(&scenario.origin, &scenario.destinations, &scenario.optimizer)
        .context("Route optimization failed")?;

    tracing::info!(
        route = %report.route.describe(),
        distance_km = report.route.total_distance_km,
        generations = report.generations_run,
        "Route optimized"
    );

    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, &report)?;
    writeln!(out)?;
    Ok(())
}

async fn run_simulate(args: &SimulateArgs, config: &Config) -> Result<()> {
    let scenario = load_scenario(&args.plan, config)?;
    let tick_ms = args.tick_ms.unwrap_or(config.tick_ms);
    let max_ticks = args.max_ticks.unwrap_or(config.max_ticks);

    let report = optimize_with_report(&scenario.origin, &scenario.destinations, &scenario.optimizer)
        .context("Route optimization failed")?;
    let route = report.route;
    tracing::info!(
        route = %route.describe(),
        distance_km = route.total_distance_km,
        "Route optimized"
    );

    let mut hazards = scenario.hazards.clone();
    if args.random_hazard {
        let mut rng = match scenario.optimizer.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        match scenario::random_hazard(&route, &scenario.rules, &mut rng) {
            Some(hazard) => {
                tracing::info!(
                    hazard = %hazard.name,
                    center = %hazard.center,
                    description = %hazard.description(),
                    "Random hazard placed"
                );
                hazards.push(hazard);
            }
            None => tracing::warn!("Could not place a random hazard clear of every destination"),
        }
    }

    let mut controller = DeliveryController::new(scenario.simulation.clone(), scenario.rules.clone());
    controller
        .start_delivery(route, hazards)
        .context("Failed to start delivery")?;

    let state = Arc::new(AppState::new(controller));
    let printer = tokio::spawn(print_snapshots(state.subscribe()));
    let operator = args
        .commands
        .then(|| tokio::spawn(apply_commands(state.clone(), spawn_stdin_reader())));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut delivery = tokio::spawn(run_delivery_loop(
        state.clone(),
        Duration::from_millis(tick_ms),
        max_ticks,
        shutdown_rx,
    ));

    let outcome = tokio::select! {
        outcome = &mut delivery => outcome?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, stopping delivery");
            let _ = shutdown_tx.send(());
            delivery.await?
        }
    };

    if let Some(operator) = operator {
        operator.abort();
        let _ = operator.await;
    }

    let last = state.snapshot();
    // Dropping the last sender closes the snapshot feed and ends the printer.
    drop(state);
    printer.await??;

    if let Some(snapshot) = last {
        tracing::info!(
            status = %snapshot.status,
            stops_completed = snapshot.stops_completed,
            total_stops = snapshot.total_stops,
            distance_km = snapshot.distance_traveled_km,
            elapsed_s = snapshot.elapsed_s,
            "Simulation finished"
        );
    }

    match outcome {
        LoopOutcome::Completed { ticks } => {
            tracing::info!(ticks, "Delivery complete");
            Ok(())
        }
        LoopOutcome::Stopped { ticks } => {
            tracing::info!(ticks, "Delivery stopped before completion");
            Ok(())
        }
        LoopOutcome::Shutdown { ticks } => {
            tracing::info!(ticks, "Delivery interrupted");
            Ok(())
        }
        LoopOutcome::TickLimit { ticks } => {
            anyhow::bail!("delivery did not complete within {ticks} ticks")
        }
        LoopOutcome::Faulted { ticks } => {
            anyhow::bail!("delivery controller failed after {ticks} ticks")
        }
    }
}

/// Forward stdin lines from a plain thread, so a pending read never holds up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn apply_commands(state: Arc<AppState>, mut lines: mpsc::Receiver<String>) {
    while let Some(line) = lines.recv().await {
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<DeliveryCommand>() {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!(error = %err, "Ignoring operator input");
                continue;
            }
        };
        match state.command(command) {
            Ok(()) => tracing::info!(%command, "Operator command applied"),
            Err(err) => tracing::warn!(%command, error = %err, "Operator command rejected"),
        }
    }
}

async fn print_snapshots(mut snapshots: broadcast::Receiver<DeliverySnapshot>) -> Result<()> {
    loop {
        match snapshots.recv().await {
            Ok(snapshot) => {
                let line = serde_json::to_string(&snapshot)?;
                let mut out = std::io::stdout().lock();
                writeln!(out, "{line}")?;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Snapshot printer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}
