//! RAII guard that returns a run slot and completes the mirror's run when dropped.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::mirror::{MirrorStatus, RunOutcome};

use super::Shared;

/// What the job runner records on completion.
#[derive(Debug)]
pub(super) struct RunRecord {
    pub(super) started_at: SystemTime,
    pub(super) length: Duration,
    pub(super) outcome: RunOutcome,
}

/// Held by the job task for the whole run. `complete` is the normal path;
/// if the task is dropped first (panic, runtime shutdown) the slot is still
/// released and the mirror leaves Running, without arming a cooldown.
pub(super) struct RunSlot {
    shared: Option<Arc<Shared>>,
    name: String,
    started_at: SystemTime,
    clock: Instant,
}

impl RunSlot {
    pub(super) fn new(shared: Arc<Shared>, name: String) -> Self {
        Self {
            shared: Some(shared),
            name,
            started_at: SystemTime::now(),
            clock: Instant::now(),
        }
    }

    pub(super) fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub(super) fn complete(mut self, outcome: RunOutcome) {
        if let Some(shared) = self.shared.take() {
            let record = self.record(outcome);
            shared.finish_run(&self.name, record, true);
        }
    }

    fn record(&self, outcome: RunOutcome) -> RunRecord {
        RunRecord {
            started_at: self.started_at,
            length: self.clock.elapsed(),
            outcome,
        }
    }
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            let record = self.record(RunOutcome::Abandoned);
            shared.finish_run(&self.name, record, false);
        }
    }
}

impl Shared {
    /// Running → Idle (or Deactivated if deactivated mid-run), release the
    /// run slot and, when `reschedule` is set, arm the cooldown.
    pub(super) fn finish_run(self: &Arc<Self>, name: &str, record: RunRecord, reschedule: bool) {
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.budget.release();
            let wakeup_id = state.next_ticket();
            match state.registry.get_mut(name) {
                Ok(mirror) => {
                    mirror.run = None;
                    mirror.last_run = Some(record.started_at);
                    mirror.last_run_length = Some(record.length);
                    mirror.last_outcome = Some(record.outcome);
                    if mirror.active {
                        mirror.status = MirrorStatus::Idle;
                        if reschedule && !self.is_shutting_down() {
                            self.arm_reschedule(mirror, wakeup_id);
                        }
                    } else {
                        mirror.status = MirrorStatus::Deactivated;
                        tracing::info!(mirror = %name, "deactivated during run; not rescheduled");
                    }
                }
                Err(_) => tracing::warn!(mirror = %name, "run finished for unknown mirror"),
            }
        }
        self.wake.notify_one();
        self.finished.notify_waiters();
    }
}
