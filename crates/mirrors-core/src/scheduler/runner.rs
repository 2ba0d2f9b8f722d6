//! Job runner: executes one run of a mirror and supervises its processes.
//!
//! A run is: optional `pre_command` → sync program → optional
//! `post_command`, all writing to the mirror's log target. Whichever child
//! is active receives terminate/kill requests from the control surface.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::mirror::{MirrorSpec, RunOutcome, StopSignal};

use super::dispatch::AdmittedJob;
use super::guard::RunSlot;
use super::Shared;

/// Job task body: run the mirror, then complete the run slot.
pub(super) async fn run_job(shared: Arc<Shared>, job: AdmittedJob) {
    let AdmittedJob { spec, mut stop_rx } = job;
    let slot = RunSlot::new(Arc::clone(&shared), spec.name.clone());
    let started = slot
        .started_at()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    tracing::info!(mirror = %spec.name, started, "starting sync");

    let outcome = execute(&shared.settings.sync_program, &spec, &mut stop_rx).await;

    if outcome.is_success() {
        tracing::info!(mirror = %spec.name, "finished sync");
    } else {
        tracing::warn!(mirror = %spec.name, "sync {}", outcome);
    }
    slot.complete(outcome);
}

/// Run every command of one mirror run and report how the sync ended.
/// Never fails: problems are folded into the returned outcome.
pub(crate) async fn execute(
    program: &str,
    spec: &MirrorSpec,
    stop_rx: &mut mpsc::Receiver<StopSignal>,
) -> RunOutcome {
    if let Err(e) = prepare_destination(&spec.destination) {
        return RunOutcome::CouldNotStart(format!(
            "create destination {}: {}",
            spec.destination.display(),
            e
        ));
    }
    let log = match open_log(&spec.log_target) {
        Ok(f) => f,
        Err(e) => {
            return RunOutcome::CouldNotStart(format!(
                "open log {}: {}",
                spec.log_target.display(),
                e
            ))
        }
    };

    if !spec.pre_command.trim().is_empty() {
        tracing::debug!(mirror = %spec.name, "running pre_command {}", spec.pre_command);
        match run_to_exit(shell_command(&spec.pre_command), &log, stop_rx).await {
            Ok(status) if status.success() => {}
            Ok(status) => return RunOutcome::PreCommandFailed(status.code()),
            Err(e) => return RunOutcome::CouldNotStart(format!("pre_command: {}", e)),
        }
    }

    tracing::debug!(
        mirror = %spec.name,
        "running {} {} {} {}",
        program,
        spec.sync_args,
        spec.source,
        spec.destination.display()
    );
    let outcome = match run_to_exit(sync_command(program, spec), &log, stop_rx).await {
        Ok(status) => outcome_from_status(status),
        Err(e) => return RunOutcome::CouldNotStart(format!("{}: {}", program, e)),
    };

    if !spec.post_command.trim().is_empty() {
        tracing::debug!(mirror = %spec.name, "running post_command {}", spec.post_command);
        match run_to_exit(shell_command(&spec.post_command), &log, stop_rx).await {
            Ok(status) if status.success() => {
                tracing::info!(mirror = %spec.name, "done running post_command")
            }
            Ok(status) => {
                tracing::warn!(mirror = %spec.name, "post_command exited with {}", status)
            }
            Err(e) => tracing::warn!(mirror = %spec.name, "post_command: {}", e),
        }
    }

    outcome
}

/// `<program> <sync_args...> <source> <destination>`, no shell.
pub(crate) fn sync_command(program: &str, spec: &MirrorSpec) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(spec.sync_args.split_whitespace())
        .arg(&spec.source)
        .arg(&spec.destination);
    cmd
}

fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line);
    cmd
}

fn outcome_from_status(status: ExitStatus) -> RunOutcome {
    if status.success() {
        return RunOutcome::Succeeded;
    }
    match status.code() {
        Some(code) => RunOutcome::Failed(code),
        None => RunOutcome::Signalled,
    }
}

/// A destination ending in `/` is a directory to create; otherwise its parent is.
fn prepare_destination(destination: &Path) -> io::Result<()> {
    let dir = if destination.to_string_lossy().ends_with('/') {
        Some(destination)
    } else {
        destination.parent()
    };
    match dir {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => {
            tracing::info!("creating {}", dir.display());
            fs::create_dir_all(dir)
        }
        _ => Ok(()),
    }
}

fn open_log(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Spawn `cmd` with stdout and stderr appended to `log`, then wait for it,
/// forwarding stop requests.
async fn run_to_exit(
    mut cmd: Command,
    log: &File,
    stop_rx: &mut mpsc::Receiver<StopSignal>,
) -> io::Result<ExitStatus> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(log.try_clone()?))
        .stderr(Stdio::from(log.try_clone()?))
        .kill_on_drop(true);
    let child = cmd.spawn()?;
    supervise(child, stop_rx).await
}

async fn supervise(
    mut child: Child,
    stop_rx: &mut mpsc::Receiver<StopSignal>,
) -> io::Result<ExitStatus> {
    loop {
        tokio::select! {
            status = child.wait() => return status,
            Some(signal) = stop_rx.recv() => {
                let sent = match signal {
                    StopSignal::Terminate => send_terminate(&child),
                    StopSignal::Kill => child.start_kill(),
                };
                if let Err(e) = sent {
                    tracing::debug!(?signal, "could not signal process: {}", e);
                }
            }
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &Child) -> io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions; the pid belongs to
    // a child we have not reaped yet.
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &Child) -> io::Result<()> {
    let _ = child;
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "graceful terminate is only supported on unix",
    ))
}
