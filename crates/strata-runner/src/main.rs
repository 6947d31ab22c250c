//! Strata runner
//!
//! Opens the telemetry store, starts a run and drives a simulated bandit
//! environment through the staged cognition engine until `--steps` is reached
//! or the process receives SIGINT/SIGTERM.

mod simulated;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use strata_core::{
    AbortFlag, Clock, Engine, FeedQueue, FeedSample, FeedSender, HashedTimeSource, MonotonicClock,
    RunEventKind, RuntimeConfig, StepLoop, Storage, TelemetrySink,
};

use crate::simulated::SimulatedEnvironment;

/// Samples buffered between two step boundaries
const FEED_CAPACITY: usize = 256;

/// Strata - staged cognition engine runner
#[derive(Parser, Debug)]
#[command(name = "strata-run")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run the staged cognition engine against a simulated environment")]
struct Cli {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Telemetry database path (overrides config and STRATA_DB_PATH)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Stop after this many steps (0 runs until interrupted)
    #[arg(long)]
    steps: Option<u64>,

    /// Sleep between steps in milliseconds
    #[arg(long)]
    step_ms: Option<u64>,

    /// Emit JSON-lines telemetry on stdout
    #[arg(long)]
    json_telemetry: bool,

    /// Log as JSON instead of plain text
    #[arg(long)]
    log_json: bool,

    /// Seed of the simulated environment
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of bandit arms
    #[arg(long, default_value_t = 4)]
    arms: usize,

    /// Steps per episode
    #[arg(long, default_value_t = 20)]
    episode_len: i64,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .with_target(false)
            .with_ansi(false)
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<RuntimeConfig> {
    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::default(),
    };
    config.apply_env_overrides()?;

    if let Some(db) = &cli.db {
        config.db_path = Some(db.clone());
    }
    if let Some(steps) = cli.steps {
        config.max_steps = (steps > 0).then_some(steps);
    }
    if let Some(step_ms) = cli.step_ms {
        config.step_ms = step_ms;
    }
    if cli.json_telemetry {
        config.telemetry.enabled = true;
    }
    config.validate()?;
    Ok(config)
}

/// Resolves with the name of the first shutdown signal
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

/// Simulated spike stream feeding the step loop through a bounded queue
async fn spike_feed(tx: FeedSender, abort: AbortFlag, seed: u64) {
    let mut rng = SmallRng::seed_from_u64(seed ^ 0x5eed);
    let mut ticker = tokio::time::interval(Duration::from_millis(25));
    while !abort.is_set() && !tx.is_closed() {
        ticker.tick().await;
        let value: f64 = rng.gen_range(0.0..1.0);
        tx.try_send(FeedSample {
            stream: "spikes".to_string(),
            value,
        });
    }
}

/// Close a run whose step loop died, unless it already ended with a fatal event
fn close_failed_run(storage: &Storage, run_id: i64, ts_ms: i64, message: &str) {
    let closed = storage
        .list_run_events(run_id)
        .ok()
        .and_then(|events| events.last().map(|e| e.kind == RunEventKind::Fatal.as_str()))
        .unwrap_or(false);
    if closed {
        return;
    }
    if let Err(e) = storage.record_fatal(run_id, ts_ms, 0, message) {
        error!(run_id, "Fatal event not recorded: {}", e);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    info!("Strata runner v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(2);
        }
    };

    let storage = match Storage::new(config.db_path.clone()) {
        Ok(s) => {
            info!(path = %s.path().display(), "Storage initialized successfully");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to initialize storage: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry = TelemetrySink::from_config(&config.telemetry);
    let metadata = json!({
        "driver": "strata-run",
        "environment": "bandit",
        "seed": cli.seed,
        "arms": cli.arms,
        "episode_len": cli.episode_len,
        "pid": std::process::id(),
    });
    let bucket_ms = config.context.update_ms.max(1);
    let clock = Arc::new(MonotonicClock::new());

    let engine = match Engine::start_run(
        Arc::clone(&storage),
        clock.clone(),
        config,
        &metadata,
        telemetry,
        Box::new(HashedTimeSource::new(bucket_ms)),
    ) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to start run: {}", e);
            std::process::exit(1);
        }
    };
    let run_id = engine.run_id();

    let abort = AbortFlag::new();
    {
        let abort = abort.clone();
        tokio::spawn(async move {
            let name = shutdown_signal().await;
            info!("Received {}, shutting down", name);
            abort.request(name);
        });
    }

    let (feed_tx, feed_rx) = FeedQueue::bounded(FEED_CAPACITY);
    tokio::spawn(spike_feed(feed_tx, abort.clone(), cli.seed));

    let env = SimulatedEnvironment::new(cli.seed, cli.arms, cli.episode_len);
    let loop_abort = abort.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let mut step_loop = StepLoop::new(engine, env, loop_abort).with_feeds(feed_rx);
        step_loop.run()
    })
    .await;

    match joined {
        Ok(Ok(report)) => {
            info!(
                run_id,
                steps = report.steps,
                aborted = report.aborted,
                episodes = report.summary.finished_episodes,
                successes = report.summary.successes,
                total_return = report.summary.total_return,
                stage_failures = report.stage_failures,
                "Run finished"
            );
        }
        Ok(Err(e)) => {
            error!(run_id, "Run failed: {}", e);
            close_failed_run(&storage, run_id, clock.now_ms(), &format!("run: {}", e));
            std::process::exit(1);
        }
        Err(e) => {
            error!(run_id, "Step loop task failed: {}", e);
            close_failed_run(&storage, run_id, clock.now_ms(), &format!("step loop task: {}", e));
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_overrides_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strata.json");
        std::fs::write(&path, r#"{"step_ms": 5, "max_steps": 10, "reasoner": {"mode": "on"}}"#).unwrap();

        let cli = Cli::parse_from([
            "strata-run",
            "--config",
            path.to_str().unwrap(),
            "--steps",
            "0",
            "--json-telemetry",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.step_ms, 5);
        assert_eq!(config.max_steps, None);
        assert!(config.telemetry.enabled);
        assert_eq!(config.reasoner.mode.as_str(), "on");
    }

    #[test]
    fn test_failed_run_gets_one_fatal_event() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(Some(dir.path().join("runner.db"))).unwrap();
        let run_id = storage.begin_run(0, "{}").unwrap();

        close_failed_run(&storage, run_id, 25, "step loop task: panicked");
        close_failed_run(&storage, run_id, 30, "step loop task: panicked");

        let events = storage.list_run_events(run_id).unwrap();
        assert_eq!(events.iter().filter(|e| e.kind == "fatal").count(), 1);
        assert_eq!(events.last().unwrap().exit_code, Some(1));
        assert_eq!(storage.get_run(run_id).unwrap().unwrap().ended_ms, Some(25));
    }

    #[test]
    fn test_bad_config_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"ethics": {"risk_threshold": 3.0}}"#).unwrap();
        let cli = Cli::parse_from(["strata-run", "--config", path.to_str().unwrap()]);
        assert!(load_config(&cli).is_err());
    }
}
