//! Dispatcher: the single loop that moves mirrors from Queued to Running.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::mirror::{MirrorSpec, MirrorStatus, RunHandle, StopSignal};

use super::{runner, Shared};

/// Room for a few stop requests; extra ones while the process is still
/// exiting are dropped.
const STOP_CHANNEL_CAPACITY: usize = 4;

/// A mirror that has been moved to Running and must be handed to a job task.
pub(super) struct AdmittedJob {
    pub(super) spec: Arc<MirrorSpec>,
    pub(super) stop_rx: mpsc::Receiver<StopSignal>,
}

pub(super) enum Admission {
    Started(AdmittedJob),
    /// Queue has work but the run budget is exhausted.
    Saturated,
    Empty,
    ShuttingDown,
}

impl Shared {
    /// Admit the head of the queue if the budget allows. Stale heads
    /// (deactivated, removed or re-enqueued mirrors) are discarded first.
    /// The head is only popped once it is admitted, so a mirror waiting on
    /// the budget keeps its place. The shutdown flag is read under the lock:
    /// a run admitted here is always seen by the shutdown sweep.
    pub(super) fn try_admit(&self) -> Admission {
        let mut guard = self.lock();
        if self.is_shutting_down() {
            return Admission::ShuttingDown;
        }
        let state = &mut *guard;
        loop {
            let Some(head) = state.queue.peek() else {
                return Admission::Empty;
            };
            let live = state.registry.get(&head.name).is_ok_and(|m| {
                m.status == MirrorStatus::Queued && m.queue_ticket == Some(head.ticket)
            });
            if !live {
                if let Some(stale) = state.queue.pop() {
                    tracing::debug!(mirror = %stale.name, "discarding stale queue entry");
                }
                continue;
            }
            if !state.budget.try_reserve() {
                return Admission::Saturated;
            }
            let Some(entry) = state.queue.pop() else {
                state.budget.release();
                return Admission::Empty;
            };
            let mirror = match state.registry.get_mut(&entry.name) {
                Ok(mirror) => mirror,
                Err(_) => {
                    state.budget.release();
                    continue;
                }
            };
            let (stop_tx, stop_rx) = mpsc::channel(STOP_CHANNEL_CAPACITY);
            mirror.status = MirrorStatus::Running;
            mirror.queue_ticket = None;
            mirror.run = Some(RunHandle { stop_tx });
            tracing::debug!(
                mirror = %entry.name,
                running = state.budget.running(),
                waiting = state.queue.len(),
                "acquired run slot"
            );
            return Admission::Started(AdmittedJob {
                spec: Arc::clone(&mirror.spec),
                stop_rx,
            });
        }
    }
}

/// Runs until shutdown. Waits on the scheduler's wake signal; while the
/// budget is exhausted the wait is bounded by `check_sleep` as a fallback.
pub(super) async fn run_dispatcher(shared: Arc<Shared>) {
    tracing::debug!(
        max_running = shared.settings.max_running,
        "dispatcher started"
    );
    loop {
        match shared.try_admit() {
            Admission::Started(job) => {
                tokio::spawn(runner::run_job(Arc::clone(&shared), job));
            }
            Admission::Saturated => {
                tracing::debug!(
                    "no open run slots, waiting up to {}s",
                    shared.settings.check_sleep.as_secs()
                );
                let _ = tokio::time::timeout(shared.settings.check_sleep, shared.wake.notified())
                    .await;
            }
            Admission::Empty => shared.wake.notified().await,
            Admission::ShuttingDown => break,
        }
    }
    tracing::debug!("dispatcher stopped");
}
