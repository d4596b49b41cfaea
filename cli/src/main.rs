//! `rosca` - replay rotating-savings scenarios against the settlement engine

mod scenario;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rosca_core_rs::{Event, PoolConfig, SettlementEngine};
use scenario::{replay, Scenario};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rosca",
    version = env!("CARGO_PKG_VERSION"),
    about = "Rotating savings pool engine: replay scenarios and check pool configs."
)]
struct Cli {
    /// Log every committed operation (same as RUST_LOG=debug)
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    /// Output machine-readable JSON instead of human-readable text
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file and print the event log and pool summaries
    Run {
        /// Scenario JSON (registry, wallets, steps)
        #[arg(value_name = "PATH")]
        scenario: PathBuf,

        /// Continue past steps with unexpected outcomes
        #[arg(long, default_value_t = false)]
        keep_going: bool,

        /// Write an engine snapshot here after the replay
        #[arg(long, value_name = "PATH", env = "ROSCA_SNAPSHOT")]
        snapshot: Option<PathBuf>,
    },

    /// Validate a pool config file and show its derived amounts
    CheckConfig {
        #[arg(value_name = "PATH")]
        config: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn describe(event: &Event) -> String {
    let pool = event
        .pool_id()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    let member = event.member().unwrap_or("-");
    format!("[{:>10}] {:<20} pool={} member={}", event.at(), event.event_type(), pool, member)
}

fn print_report(engine: &SettlementEngine, json: bool) -> Result<()> {
    let summaries = engine
        .pool_ids()
        .iter()
        .map(|id| engine.summary(id))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if json {
        let report = serde_json::json!({
            "events": engine.event_log().events(),
            "pools": summaries,
            "wallets": engine.wallets().iter().collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("EVENTS");
    for event in engine.event_log().events() {
        println!("  {}", describe(event));
    }
    println!();
    println!("POOLS");
    for summary in &summaries {
        println!(
            "  {}  {:?}  cycle {}/{}  vault {}  collateral {}{}",
            summary.pool_id,
            summary.status,
            summary.current_cycle,
            summary.total_cycles,
            summary.vault_balance,
            summary.collateral_balance,
            if summary.frozen { "  FROZEN" } else { "" }
        );
    }
    println!();
    println!("WALLETS");
    for wallet in engine.wallets().iter() {
        println!("  {:<16} {:>12}", wallet.owner(), wallet.balance());
    }
    Ok(())
}

fn cmd_run(path: PathBuf, keep_going: bool, snapshot: Option<PathBuf>, json: bool) -> Result<()> {
    let scenario = Scenario::load(&path)?;
    let outcome = replay(scenario, keep_going)?;
    for (alias, pool_id) in &outcome.aliases {
        tracing::debug!(alias = %alias, pool = %pool_id, "pool alias");
    }
    print_report(&outcome.engine, json)?;

    if let Some(out) = snapshot {
        let snapshot = outcome.engine.snapshot(&outcome.registry)?;
        std::fs::write(&out, snapshot.to_json()?)
            .with_context(|| format!("writing snapshot {}", out.display()))?;
        tracing::info!(path = %out.display(), "snapshot written");
    }
    if outcome.rejected > 0 {
        tracing::info!(rejected = outcome.rejected, "replay finished with rejected steps");
    }
    Ok(())
}

fn cmd_check_config(path: PathBuf, json: bool) -> Result<()> {
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: PoolConfig =
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    config.validate()?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "config": config,
                "pot_size": config.pot_size(),
                "required_collateral": config.required_collateral(),
            })
        );
    } else {
        println!("config ok");
        println!("  seats               {}", config.max_participants);
        println!("  pot size            {}", config.pot_size());
        println!("  required collateral {}", config.required_collateral());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            scenario,
            keep_going,
            snapshot,
        } => cmd_run(scenario, keep_going, snapshot, cli.json),
        Commands::CheckConfig { config } => cmd_check_config(config, cli.json),
    }
}
