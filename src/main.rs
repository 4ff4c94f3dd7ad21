//! hazardtail - live natural-disaster monitoring from your terminal.
//!
//! Ingests the GDACS event feed, normalizes it, and raises proximity
//! alerts against your position: within a radius, in your state, or in
//! your country.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::error;

mod cli;
mod client;
mod coordinator;
mod dedup;
mod engine;
mod errors;
mod geocode;
mod history;
mod location;
mod models;
mod normalize;
mod output;
mod proximity;
mod server;
mod stats;

use cli::{Cli, Command, EngineArgs};
use dedup::AlertLedger;
use engine::{Engine, EngineConfig};
use location::FixedLocation;
use output::AlertReport;

/// Smallest allowed poll interval, in seconds.
const MIN_POLL_INTERVAL_SECS: u64 = 30;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    let runtime = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Command::Check(args) => cmd_check(args).await,
            Command::Events(args) => cmd_events(args).await,
            Command::Watch(args) => cmd_watch(args).await,
            Command::Stats(args) => cmd_stats(args).await,
            Command::Serve(args) => cmd_serve(args).await,
        }
    })
}

/// Initialize tracing subscriber.
fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn engine_setup(args: &EngineArgs) -> Result<(EngineConfig, Engine)> {
    let config = args.engine_config().map_err(|e| anyhow!(e))?;
    let location = FixedLocation::from_parts(args.lat, args.lon);
    let engine = Engine::from_config(&config, Arc::new(location)).context("failed to create engine")?;
    Ok((config, engine))
}

/// Execute the `check` command - one-shot alert evaluation.
async fn cmd_check(args: cli::CheckArgs) -> Result<()> {
    let (config, engine) = engine_setup(&args.engine)?;
    engine
        .start(config.history_days)
        .await
        .context("failed to load events")?;

    let alert = engine.alert_state().await;
    let user = engine.user().await;
    let notices = engine.drain_notices().await;
    let report = AlertReport {
        phase: engine.phase().await,
        policy: engine.policy().await,
        user: user.as_ref(),
        alert: &alert,
        notices: &notices,
    };

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    output::write_report(&mut handle, &report, args.format)?;
    Ok(())
}

/// Execute the `events` command - list the composed event set.
async fn cmd_events(args: cli::EventsArgs) -> Result<()> {
    let (config, engine) = engine_setup(&args.engine)?;

    engine.refresh_live().await;
    if let Some(days) = config.history_days {
        engine.set_history_window(days).await?;
    }
    for notice in engine.drain_notices().await {
        tracing::warn!("{}", notice);
    }

    let mut events = engine.composed_events().await;

    // Sort by start time descending (most recent first)
    events.sort_by_key(|e| std::cmp::Reverse(e.start_time()));
    events.truncate(args.limit);

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    output::write_events(&mut handle, &events, args.format)?;
    Ok(())
}

/// Execute the `watch` command - poll and report new alerts.
async fn cmd_watch(args: cli::WatchArgs) -> Result<()> {
    // Validate poll interval
    let poll_interval = args.poll_interval.max(MIN_POLL_INTERVAL_SECS);
    if poll_interval != args.poll_interval {
        tracing::warn!("poll interval clamped to minimum of {MIN_POLL_INTERVAL_SECS} seconds");
    }

    let (config, engine) = engine_setup(&args.engine)?;
    engine.start(config.history_days).await?;

    let mut ledger = AlertLedger::default();

    tracing::info!(
        "watching for {} alerts (poll every {}s)",
        engine.policy().await.as_str(),
        poll_interval
    );

    loop {
        for notice in engine.drain_notices().await {
            tracing::warn!("{}", notice);
        }

        let alert = engine.alert_state().await;
        let fresh: Vec<_> = alert
            .matched_events
            .iter()
            .filter(|e| ledger.check(e).should_report())
            .cloned()
            .collect();

        if !fresh.is_empty() {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            if let Some(address) = output::fresh_address(&alert, &fresh) {
                writeln!(handle, "📍 {address}")?;
            }
            if let Err(e) = output::write_events(&mut handle, &fresh, args.format) {
                tracing::warn!("failed to write alerts: {}", e);
            }
            // Flush after each batch for real-time output
            let _ = handle.flush();
        }

        tracing::debug!(
            "{} alert(s) tracked, {} repeat(s) suppressed",
            ledger.tracked(),
            ledger.repeats()
        );

        tokio::time::sleep(Duration::from_secs(poll_interval)).await;
        engine.refresh_live().await;
    }
}

/// Execute the `stats` command.
async fn cmd_stats(args: cli::StatsArgs) -> Result<()> {
    let (config, engine) = engine_setup(&args.engine)?;

    let history = async {
        match config.history_days {
            Some(days) => engine.set_history_window(days).await,
            None => Ok(()),
        }
    };
    let ((), history) = tokio::join!(engine.refresh_live(), history);
    history?;
    for notice in engine.drain_notices().await {
        tracing::warn!("{}", notice);
    }

    let stats = engine.stats().await;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    output::write_stats(&mut handle, &stats, args.format)?;
    Ok(())
}

/// Execute the `serve` command - start the HTTP API.
async fn cmd_serve(args: cli::ServeArgs) -> Result<()> {
    let engine = args.engine.engine_config().map_err(|e| anyhow!(e))?;
    let config = server::ServerConfig {
        port: args.port,
        host: args.host,
        poll_interval: args.poll_interval.max(MIN_POLL_INTERVAL_SECS),
        engine,
        location: FixedLocation::from_parts(args.engine.lat, args.engine.lon),
    };

    server::run_server(config).await
}
