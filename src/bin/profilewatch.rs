//! CLI binary for profilewatch.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use profilewatch::config::{LoggingConfig, Target, TargetConfig};
use profilewatch::{
    HttpGateway, MonitorContext, ScheduleManager, StateStore, WatchConfig, WatchError, paths,
};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Watch remote profiles and record what changes between polls.
#[derive(Parser)]
#[command(name = "profilewatch", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root directory for per-profile state and media.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Base URL of the profile gateway.
    #[arg(long)]
    gateway: Option<String>,

    /// Bearer token for the gateway session.
    #[arg(long, env = "PROFILEWATCH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Do not poll highlights.
    #[arg(long)]
    no_highlights: bool,

    /// Do not poll stories.
    #[arg(long)]
    no_stories: bool,

    /// Skip the whole-profile archive after each cycle.
    #[arg(long)]
    no_profile_snapshot: bool,

    /// Profiles to watch, as `entity` or `entity:interval_minutes`.
    targets: Vec<TargetConfig>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, targets) = match resolve_config(cli) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    let _log_guard = init_tracing(&config.logging);

    match run(config, targets).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            let config_error = e
                .downcast_ref::<WatchError>()
                .is_some_and(|w| matches!(w, WatchError::Config(_)));
            ExitCode::from(if config_error { 2 } else { 1 })
        }
    }
}

/// Load the config file, apply command-line overrides and resolve targets.
fn resolve_config(cli: Cli) -> profilewatch::Result<(WatchConfig, Vec<Target>)> {
    let mut config = WatchConfig::load(cli.config.as_deref())?;

    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = Some(dir);
    }
    if let Some(url) = cli.gateway {
        config.gateway.base_url = url;
    }
    if cli.token.is_some() {
        config.gateway.token = cli.token;
    }
    if cli.no_highlights {
        config.monitor.download_highlights = false;
    }
    if cli.no_stories {
        config.monitor.download_stories = false;
    }
    if cli.no_profile_snapshot {
        config.monitor.snapshot_profile = false;
    }
    config.merge_targets(cli.targets);

    let targets = config.resolve_targets()?;
    Ok((config, targets))
}

/// Stderr logging, plus a daily rolling file when enabled.
fn init_tracing(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("profilewatch=info"));
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let file = if logging.file {
        let dir = logging.directory.clone().unwrap_or_else(paths::logs_dir);
        match RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("profilewatch")
            .filename_suffix("log")
            .build(&dir)
        {
            Ok(appender) => Some(tracing_appender::non_blocking(appender)),
            Err(e) => {
                eprintln!("cannot open log directory {}: {e}", dir.display());
                None
            }
        }
    } else {
        None
    };

    match file {
        Some((writer, guard)) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .init();
            None
        }
    }
}

async fn run(config: WatchConfig, targets: Vec<Target>) -> anyhow::Result<()> {
    let store = StateStore::new(config.storage.resolved_data_dir());
    let gateway = Arc::new(HttpGateway::new(&config.gateway, store.clone())?);
    let context = MonitorContext::new(store.clone(), gateway.clone(), gateway)
        .with_options(config.monitor.monitor_options());
    let mut manager =
        ScheduleManager::new(context).with_cycle_timeout(config.monitor.cycle_timeout());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %store.root().display(),
        gateway = %config.gateway.base_url,
        targets = targets.len(),
        "profilewatch starting"
    );

    // First cycles run one target at a time; a signal during that phase
    // abandons the remaining targets.
    let signal = shutdown_signal();
    tokio::pin!(signal);
    let started = tokio::select! {
        started = start_targets(&mut manager, &targets) => started,
        () = &mut signal => {
            info!("shutdown signal received during startup, stopping schedules");
            manager.shutdown().await;
            return Ok(());
        }
    };
    if let Err(e) = started {
        manager.shutdown().await;
        return Err(e.into());
    }

    signal.await;
    info!("shutdown signal received, stopping schedules");
    manager.shutdown().await;
    Ok(())
}

/// Add every target, running each first cycle inline. Stops at the first
/// fatal error.
async fn start_targets(
    manager: &mut ScheduleManager,
    targets: &[Target],
) -> Result<(), WatchError> {
    for target in targets {
        if let Some(report) = manager.add_and_start(&target.entity, target.interval).await? {
            info!(
                entity = %target.entity,
                new_sets = report.new_set_count(),
                failed_downloads = report.failed_downloads,
                not_following_back = report.not_following_back.len(),
                "first cycle complete"
            );
        }
    }
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "cannot listen for SIGTERM"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
}
