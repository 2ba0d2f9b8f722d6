//! Mutable per-mirror state owned by the registry.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::spec::MirrorSpec;

/// Lifecycle state. A mirror is in exactly one of these at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorStatus {
    Deactivated,
    /// Waiting for its next enqueue (cooldown pending or manual).
    Idle,
    Queued,
    Running,
}

impl MirrorStatus {
    /// Name shown to the control surface.
    pub fn as_str(self) -> &'static str {
        match self {
            MirrorStatus::Deactivated => "deactivated",
            MirrorStatus::Idle => "sleeping",
            MirrorStatus::Queued => "queued",
            MirrorStatus::Running => "syncing",
        }
    }
}

impl fmt::Display for MirrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request sent by the control surface to the process of a running mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGTERM.
    Terminate,
    /// SIGKILL.
    Kill,
}

/// How the last run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    /// Sync exited with a non-zero code.
    Failed(i32),
    /// Sync was ended by a signal (terminate/kill or external).
    Signalled,
    /// Pre-command exited unsuccessfully; sync was skipped.
    PreCommandFailed(Option<i32>),
    /// A command or the log sink could not be opened/spawned.
    CouldNotStart(String),
    /// The job task ended before the run completed.
    Abandoned,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Succeeded => write!(f, "succeeded"),
            RunOutcome::Failed(code) => write!(f, "failed with exit code {}", code),
            RunOutcome::Signalled => write!(f, "stopped by signal"),
            RunOutcome::PreCommandFailed(Some(code)) => {
                write!(f, "pre_command failed with exit code {}", code)
            }
            RunOutcome::PreCommandFailed(None) => write!(f, "pre_command stopped by signal"),
            RunOutcome::CouldNotStart(reason) => write!(f, "could not start: {}", reason),
            RunOutcome::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Control-side handle to an in-flight run. The child process itself is
/// owned by the job task; this only carries stop requests to it.
#[derive(Debug)]
pub(crate) struct RunHandle {
    pub(crate) stop_tx: mpsc::Sender<StopSignal>,
}

/// Pending re-enqueue armed by the rescheduler.
#[derive(Debug)]
pub(crate) struct Wakeup {
    pub(crate) id: u64,
    pub(crate) handle: AbortHandle,
}

/// One registered mirror. Only reachable through the scheduler's lock.
#[derive(Debug)]
pub struct Mirror {
    pub(crate) spec: Arc<MirrorSpec>,
    pub(crate) active: bool,
    pub(crate) status: MirrorStatus,
    /// Ticket of the live admission queue entry while Queued.
    pub(crate) queue_ticket: Option<u64>,
    /// Present iff `status == Running`.
    pub(crate) run: Option<RunHandle>,
    pub(crate) wakeup: Option<Wakeup>,
    pub(crate) last_run: Option<SystemTime>,
    pub(crate) last_run_length: Option<Duration>,
    pub(crate) last_outcome: Option<RunOutcome>,
}

impl Mirror {
    pub(crate) fn new(spec: MirrorSpec) -> Self {
        Self {
            spec: Arc::new(spec),
            active: true,
            status: MirrorStatus::Idle,
            queue_ticket: None,
            run: None,
            wakeup: None,
            last_run: None,
            last_run_length: None,
            last_outcome: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &MirrorSpec {
        &self.spec
    }

    pub fn status(&self) -> MirrorStatus {
        self.status
    }

    /// Abort the pending re-enqueue, if any.
    pub(crate) fn cancel_wakeup(&mut self) {
        if let Some(wakeup) = self.wakeup.take() {
            wakeup.handle.abort();
        }
    }

    pub fn snapshot(&self) -> MirrorSnapshot {
        MirrorSnapshot {
            spec: Arc::clone(&self.spec),
            active: self.active,
            status: self.status,
            wakeup_pending: self.wakeup.is_some(),
            last_run: self.last_run,
            last_run_length: self.last_run_length,
            last_outcome: self.last_outcome.clone(),
        }
    }
}

/// Point-in-time copy of a mirror handed out to callers.
#[derive(Debug, Clone)]
pub struct MirrorSnapshot {
    pub spec: Arc<MirrorSpec>,
    pub active: bool,
    pub status: MirrorStatus,
    /// A cooldown re-enqueue is armed.
    pub wakeup_pending: bool,
    /// Start time of the last completed run.
    pub last_run: Option<SystemTime>,
    pub last_run_length: Option<Duration>,
    pub last_outcome: Option<RunOutcome>,
}

impl MirrorSnapshot {
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}
