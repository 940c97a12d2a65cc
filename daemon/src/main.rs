mod action;
mod config;
mod debounce;
mod desktop;
mod event;
mod logging;
mod monitor;
mod paths;
mod readiness;
mod udev_monitor;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;

use crate::action::{ActionTrigger, Reconfigure};
use crate::debounce::Debouncer;
use crate::desktop::ExclusionPolicy;
use crate::readiness::{ReadinessPolicy, ReadinessProber, UdevConnectorProbe};

#[tokio::main]
async fn main() -> ExitCode {
    // ── Configuration ─────────────────────────────────────────────────────────
    let explicit_path = std::env::args_os().nth(1).map(PathBuf::from);
    let candidates = paths::config_candidates(explicit_path.as_deref());
    let config_path = paths::find_config_file(&candidates).map(PathBuf::from);
    let config = match &config_path {
        Some(path) => config::load_or_default(path).unwrap_or_else(|e| {
            eprintln!("[config] Error (using defaults): {e:#}");
            config::Config::default()
        }),
        None => config::Config::default(),
    };

    // ── Logging ───────────────────────────────────────────────────────────────
    logging::init(config.level_filter().unwrap_or(LevelFilter::INFO));
    if config.level_filter().is_none() {
        tracing::warn!("Unknown log_level '{}', using INFO", config.log_level);
    }
    match &config_path {
        Some(path) => tracing::debug!("Loaded configuration from {}", path.display()),
        None => tracing::debug!("No configuration file found, using defaults"),
    }

    // ── Exclusion policy ──────────────────────────────────────────────────────
    let policy = ExclusionPolicy::new(&config.excluded_desktops);
    if policy.excludes_current_desktop() {
        tracing::info!("Desktop environment is excluded, exiting");
        return ExitCode::SUCCESS;
    }

    tracing::info!("Starting screen monitor v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Command to execute: {}", config.command);

    // ── Coordinator ───────────────────────────────────────────────────────────
    let prober = ReadinessProber::new(Arc::new(UdevConnectorProbe), ReadinessPolicy::default());
    let trigger = ActionTrigger::new(config.command.clone(), policy);
    let debouncer = Debouncer::new(
        config.debounce_duration(),
        Arc::new(Reconfigure::new(prober, trigger)),
    );
    tracing::debug!("Debounce delay: {:?}", debouncer.delay());

    // ── Event source ──────────────────────────────────────────────────────────
    let (event_tx, event_rx) = mpsc::channel::<event::LoopMessage>(64);

    if let Err(e) = udev_monitor::spawn(event_tx.clone()) {
        tracing::error!("{e:#}");
        return ExitCode::FAILURE;
    }

    // Graceful shutdown on Ctrl+C / SIGTERM.
    tokio::spawn(async move {
        if let Err(e) = monitor::forward_shutdown_signals(event_tx).await {
            tracing::error!("Signal handling unavailable: {e:#}");
        }
    });

    // ── Event loop ────────────────────────────────────────────────────────────
    match monitor::run(event_rx, &debouncer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Error in monitor loop: {e:#}");
            ExitCode::FAILURE
        }
    }
}
