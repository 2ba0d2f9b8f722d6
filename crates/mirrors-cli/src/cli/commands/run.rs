//! `mirrors run`: load the config and drive the scheduler until exit.

use anyhow::{Context, Result};
use mirrors_core::logging::{self, Verbosity};
use mirrors_core::mirror::MirrorStatus;
use mirrors_core::{config, loader, Scheduler};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::cli::console;

/// How long running syncs get to exit after SIGTERM before they are killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub log: Option<PathBuf>,
    pub verbosity: Verbosity,
    /// Queue every loaded mirror for an initial sync.
    pub enqueue: bool,
    pub console: bool,
    pub socket: Option<PathBuf>,
}

pub async fn run_daemon(opts: &RunOptions) -> Result<()> {
    let config_path = match &opts.config {
        Some(path) => path.clone(),
        None => config::config_path()?,
    };
    let cfg = config::load_from_path(&config_path)?;
    let global = cfg
        .global()
        .with_context(|| format!("invalid [global] in {}", config_path.display()))?;

    let log_path = opts.log.clone().or_else(|| global.log_file.clone());
    if let Err(e) = logging::init_logging(log_path.as_deref(), opts.verbosity) {
        logging::init_logging_stderr(opts.verbosity);
        tracing::warn!("could not open log file, logging to stderr: {:#}", e);
    }
    tracing::info!(
        config = %config_path.display(),
        async_processes = global.max_running,
        "starting mirrors"
    );

    let scheduler = Scheduler::from_config(&global);
    let dispatcher = scheduler.spawn_dispatcher();

    let report = loader::load_mirrors(&scheduler, &cfg, opts.enqueue);
    println!(
        "Loaded {} mirror(s), skipped {}.",
        report.loaded.len(),
        report.skipped.len()
    );
    for (name, e) in &report.skipped {
        eprintln!("skipped {}: {}", name, e);
    }

    let (exit_tx, mut exit_rx) = mpsc::channel::<()>(1);

    #[cfg(unix)]
    let control = start_control_socket(&scheduler, opts.socket.clone(), exit_tx.clone());

    if opts.console {
        if let Err(e) = console::spawn_console(scheduler.clone(), exit_tx.clone()) {
            tracing::warn!("could not start console: {}", e);
        }
    }

    tokio::select! {
        _ = exit_rx.recv() => tracing::info!("exit requested"),
        _ = shutdown_signal() => tracing::info!("signal received"),
    }

    scheduler.shutdown();
    if tokio::time::timeout(SHUTDOWN_GRACE, scheduler.wait_idle())
        .await
        .is_err()
    {
        tracing::warn!(
            "syncs still running after {}s, killing them",
            SHUTDOWN_GRACE.as_secs()
        );
        for snap in scheduler.snapshots() {
            if snap.status == MirrorStatus::Running {
                let _ = scheduler.kill(snap.name());
            }
        }
        scheduler.wait_idle().await;
    }
    if let Err(e) = dispatcher.await {
        tracing::warn!("dispatcher task failed: {}", e);
    }

    #[cfg(unix)]
    if let Some((handle, path)) = control {
        handle.abort();
        let _ = std::fs::remove_file(&path);
    }

    tracing::info!("mirrors stopped");
    Ok(())
}

#[cfg(unix)]
fn start_control_socket(
    scheduler: &Scheduler,
    socket: Option<PathBuf>,
    exit_tx: mpsc::Sender<()>,
) -> Option<(tokio::task::JoinHandle<()>, PathBuf)> {
    use crate::cli::control_socket;

    let path = match socket {
        Some(path) => path,
        None => match mirrors_core::control::default_control_socket_path() {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("no control socket path: {}", e);
                return None;
            }
        },
    };
    match control_socket::spawn_control_listener(scheduler.clone(), &path, exit_tx) {
        Ok(handle) => {
            tracing::debug!(path = %path.display(), "control socket listening");
            Some((handle, path))
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "control socket unavailable: {:#}", e);
            None
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::debug!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
