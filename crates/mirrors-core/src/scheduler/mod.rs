//! Mirror scheduler.
//!
//! One [`Scheduler`] is built at startup and handed to every caller. It owns
//! a single lock over the registry, the admission queue and the run budget;
//! the dispatcher task, job tasks, cooldown timers and the control surface
//! all go through it:
//!
//! enqueue → admission queue → dispatcher (under `async_processes`) →
//! job runner → rescheduler (cooldown) → enqueue …

mod budget;
mod dispatch;
mod guard;
mod queue;
mod reschedule;
mod runner;

pub use reschedule::parse_duration;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::GlobalConfig;
use crate::error::{RepoError, RepoErrorKind};
use crate::mirror::{MirrorSnapshot, MirrorSpec, MirrorStatus, StopSignal};
use crate::registry::Registry;

use budget::RunBudget;
use queue::{AdmissionQueue, QueueEntry};

/// Floor for `check_sleep`; a zero wait would spin the dispatcher.
const MIN_CHECK_SLEEP: Duration = Duration::from_secs(1);

/// Settings the scheduler needs from `[global]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Admission ceiling.
    pub max_running: usize,
    /// Fallback re-check interval while the ceiling is reached.
    pub check_sleep: Duration,
    pub sync_program: String,
}

impl From<&GlobalConfig> for SchedulerSettings {
    fn from(global: &GlobalConfig) -> Self {
        Self {
            max_running: global.max_running,
            check_sleep: global.check_sleep,
            sync_program: global.sync_program.clone(),
        }
    }
}

/// Everything guarded by the scheduler lock.
#[derive(Debug)]
pub(crate) struct State {
    registry: Registry,
    queue: AdmissionQueue,
    budget: RunBudget,
    next_ticket: u64,
}

impl State {
    fn next_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }
}

pub(crate) struct Shared {
    state: Mutex<State>,
    /// Signalled on enqueue, run completion and shutdown; the dispatcher waits on it.
    wake: Notify,
    /// Signalled to all waiters whenever a run completes.
    finished: Notify,
    settings: SchedulerSettings,
    shutting_down: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Idle + active → Queued, pushing a fresh queue entry. Cancels a pending
    /// cooldown wakeup, since the mirror is about to run anyway. The shutdown
    /// flag is checked here, under the lock, so nothing slips in behind the
    /// shutdown sweep.
    fn enqueue_locked(&self, state: &mut State, name: &str) -> Result<(), RepoError> {
        if self.is_shutting_down() {
            return Err(RepoError::new(name, RepoErrorKind::ShuttingDown));
        }
        let ticket = state.next_ticket();
        let mirror = state.registry.get_mut(name)?;
        let refused = match mirror.status {
            MirrorStatus::Queued => Some(RepoErrorKind::AlreadyQueued),
            MirrorStatus::Running => Some(RepoErrorKind::AlreadyRunning),
            MirrorStatus::Deactivated => Some(RepoErrorKind::Deactivated),
            MirrorStatus::Idle if !mirror.active => Some(RepoErrorKind::Deactivated),
            MirrorStatus::Idle => None,
        };
        if let Some(kind) = refused {
            return Err(RepoError::new(name, kind));
        }
        mirror.cancel_wakeup();
        mirror.status = MirrorStatus::Queued;
        mirror.queue_ticket = Some(ticket);
        let entry = QueueEntry {
            weight: mirror.spec.weight,
            ticket,
            name: mirror.spec.name.clone(),
        };
        state.queue.push(entry);
        Ok(())
    }
}

/// Handle to the scheduling engine. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(mut settings: SchedulerSettings) -> Self {
        settings.check_sleep = settings.check_sleep.max(MIN_CHECK_SLEEP);
        let state = State {
            registry: Registry::new(),
            queue: AdmissionQueue::default(),
            budget: RunBudget::new(settings.max_running),
            next_ticket: 0,
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                wake: Notify::new(),
                finished: Notify::new(),
                settings,
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn from_config(global: &GlobalConfig) -> Self {
        Self::new(SchedulerSettings::from(global))
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.shared.settings
    }

    /// Start the dispatcher loop on the current tokio runtime. It runs until
    /// [`Scheduler::shutdown`] is called.
    pub fn spawn_dispatcher(&self) -> JoinHandle<()> {
        tokio::spawn(dispatch::run_dispatcher(Arc::clone(&self.shared)))
    }

    /// Register a validated mirror. It starts active and Idle; call
    /// [`Scheduler::enqueue`] to schedule its first run.
    pub fn add_repo(&self, spec: MirrorSpec) -> Result<MirrorSnapshot, RepoError> {
        let snapshot = self.shared.lock().registry.add(spec)?;
        tracing::info!(mirror = %snapshot.name(), "loaded successfully");
        Ok(snapshot)
    }

    pub fn get(&self, name: &str) -> Result<MirrorSnapshot, RepoError> {
        Ok(self.shared.lock().registry.get(name)?.snapshot())
    }

    /// Remove a mirror. Refused while it is Queued or Running.
    pub fn remove_repo(&self, name: &str) -> Result<(), RepoError> {
        self.shared.lock().registry.remove(name)?;
        tracing::info!(mirror = %name, "removed");
        Ok(())
    }

    /// Put an Idle, active mirror into the admission queue.
    pub fn enqueue(&self, name: &str) -> Result<(), RepoError> {
        self.shared.enqueue_locked(&mut self.shared.lock(), name)?;
        tracing::debug!(mirror = %name, "added to sync queue");
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Allow the mirror to be scheduled again. A Deactivated mirror becomes
    /// Idle; it is not enqueued automatically.
    pub fn activate(&self, name: &str) -> Result<(), RepoError> {
        let mut state = self.shared.lock();
        let mirror = state.registry.get_mut(name)?;
        mirror.active = true;
        if mirror.status == MirrorStatus::Deactivated {
            mirror.status = MirrorStatus::Idle;
        }
        tracing::info!(mirror = %name, "activated");
        Ok(())
    }

    /// Stop scheduling the mirror. Takes effect immediately unless it is
    /// Running, in which case the current run finishes and the mirror is not
    /// rescheduled. A queued entry is left in the queue and discarded by the
    /// dispatcher.
    pub fn deactivate(&self, name: &str) -> Result<(), RepoError> {
        let mut state = self.shared.lock();
        let mirror = state.registry.get_mut(name)?;
        mirror.active = false;
        mirror.cancel_wakeup();
        match mirror.status {
            MirrorStatus::Idle | MirrorStatus::Queued => {
                mirror.status = MirrorStatus::Deactivated;
                mirror.queue_ticket = None;
            }
            MirrorStatus::Running | MirrorStatus::Deactivated => {}
        }
        tracing::info!(mirror = %name, status = %mirror.status, "deactivated");
        Ok(())
    }

    pub fn status(&self, name: &str) -> Result<MirrorStatus, RepoError> {
        Ok(self.shared.lock().registry.get(name)?.status())
    }

    /// Send SIGTERM to the mirror's running process. No-op unless Running;
    /// status only changes once the process has exited.
    pub fn terminate(&self, name: &str) -> Result<(), RepoError> {
        self.signal(name, StopSignal::Terminate)
    }

    /// Send SIGKILL to the mirror's running process. No-op unless Running.
    pub fn kill(&self, name: &str) -> Result<(), RepoError> {
        self.signal(name, StopSignal::Kill)
    }

    fn signal(&self, name: &str, signal: StopSignal) -> Result<(), RepoError> {
        let state = self.shared.lock();
        let mirror = state.registry.get(name)?;
        if let Some(run) = &mirror.run {
            match run.stop_tx.try_send(signal) {
                Ok(()) => tracing::info!(mirror = %name, ?signal, "stop requested"),
                Err(e) => tracing::debug!(mirror = %name, ?signal, "stop request dropped: {}", e),
            }
        }
        Ok(())
    }

    /// Names of all registered mirrors, in name order.
    pub fn list_repos(&self) -> impl Iterator<Item = String> {
        let names: Vec<String> = self
            .shared
            .lock()
            .registry
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        names.into_iter()
    }

    pub fn snapshots(&self) -> Vec<MirrorSnapshot> {
        self.shared
            .lock()
            .registry
            .iter()
            .map(|m| m.snapshot())
            .collect()
    }

    /// Number of runs currently admitted.
    pub fn running_count(&self) -> usize {
        self.shared.lock().budget.running()
    }

    pub fn max_running(&self) -> usize {
        self.shared.lock().budget.max_running()
    }

    /// Stop admitting runs, cancel every pending cooldown and ask every
    /// running process to terminate. In-flight runs still complete normally.
    pub fn shutdown(&self) {
        self.shared.shutting_down.store(true, Ordering::Release);
        {
            let mut state = self.shared.lock();
            for mirror in state.registry.iter_mut() {
                mirror.cancel_wakeup();
                if let Some(run) = &mirror.run {
                    let _ = run.stop_tx.try_send(StopSignal::Terminate);
                }
            }
        }
        self.shared.wake.notify_one();
        tracing::info!("scheduler shutting down");
    }

    /// Wait until no run is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let finished = self.shared.finished.notified();
            if self.running_count() == 0 {
                return;
            }
            finished.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::Recurrence;
    use std::path::PathBuf;

    fn settings(max_running: usize) -> SchedulerSettings {
        SchedulerSettings {
            max_running,
            check_sleep: Duration::from_secs(30),
            sync_program: "true".to_string(),
        }
    }

    fn spec(name: &str, weight: i8) -> MirrorSpec {
        MirrorSpec {
            name: name.to_string(),
            source: format!("rsync://example.org/{name}/"),
            destination: PathBuf::from("./distro/"),
            sync_args: "-a".to_string(),
            weight,
            recurrence: Recurrence::Cooldown(Duration::from_secs(600)),
            pre_command: String::new(),
            post_command: String::new(),
            log_target: PathBuf::from(format!("./log/{name}.log")),
        }
    }

    #[test]
    fn second_enqueue_before_dispatch_is_refused() {
        let s = Scheduler::new(settings(1));
        s.add_repo(spec("mirrorA", 5)).unwrap();
        s.enqueue("mirrorA").unwrap();
        assert_eq!(s.status("mirrorA").unwrap(), MirrorStatus::Queued);

        let err = s.enqueue("mirrorA").unwrap_err();
        assert_eq!(err.kind, RepoErrorKind::AlreadyQueued);
        assert_eq!(err.to_string(), "mirrorA: already queued");
    }

    #[test]
    fn unknown_names_are_reported() {
        let s = Scheduler::new(settings(1));
        for result in [
            s.enqueue("ghost"),
            s.activate("ghost"),
            s.deactivate("ghost"),
            s.terminate("ghost"),
            s.kill("ghost"),
            s.remove_repo("ghost"),
        ] {
            assert_eq!(result.unwrap_err().kind, RepoErrorKind::NotFound);
        }
        assert_eq!(s.status("ghost").unwrap_err().kind, RepoErrorKind::NotFound);
    }

    #[test]
    fn deactivated_mirror_cannot_be_enqueued_until_activated() {
        let s = Scheduler::new(settings(1));
        s.add_repo(spec("a", 0)).unwrap();
        s.deactivate("a").unwrap();
        s.deactivate("a").unwrap();
        assert_eq!(s.status("a").unwrap(), MirrorStatus::Deactivated);
        assert_eq!(
            s.enqueue("a").unwrap_err().kind,
            RepoErrorKind::Deactivated
        );

        s.activate("a").unwrap();
        s.activate("a").unwrap();
        assert_eq!(s.status("a").unwrap(), MirrorStatus::Idle);
        s.enqueue("a").unwrap();
    }

    #[test]
    fn deactivating_a_queued_mirror_makes_its_entry_stale() {
        let s = Scheduler::new(settings(1));
        s.add_repo(spec("a", 0)).unwrap();
        s.enqueue("a").unwrap();
        s.deactivate("a").unwrap();
        assert_eq!(s.status("a").unwrap(), MirrorStatus::Deactivated);

        let state = s.shared.lock();
        assert_eq!(state.queue.len(), 1);
        assert!(state.registry.get("a").unwrap().queue_ticket.is_none());
    }

    #[test]
    fn requeue_cycles_keep_one_entry_per_mirror() {
        let s = Scheduler::new(settings(1));
        s.add_repo(spec("a", -3)).unwrap();
        for _ in 0..100 {
            s.enqueue("a").unwrap();
            s.deactivate("a").unwrap();
            s.activate("a").unwrap();
        }
        s.enqueue("a").unwrap();

        let state = s.shared.lock();
        assert_eq!(state.queue.len(), 1);
        let head = state.queue.peek().unwrap();
        assert_eq!(state.registry.get("a").unwrap().queue_ticket, Some(head.ticket));
    }

    #[test]
    fn zero_check_sleep_is_raised_to_the_floor() {
        let s = Scheduler::new(SchedulerSettings {
            check_sleep: Duration::ZERO,
            ..settings(1)
        });
        assert_eq!(s.settings().check_sleep, MIN_CHECK_SLEEP);
    }

    #[test]
    fn admission_racing_shutdown_is_refused() {
        let s = Scheduler::new(settings(1));
        s.add_repo(spec("a", 0)).unwrap();
        s.enqueue("a").unwrap();

        // Hold the lock so the dispatcher side blocks inside try_admit,
        // then flip the flag before letting it through.
        let guard = s.shared.lock();
        let shared = Arc::clone(&s.shared);
        let admit = std::thread::spawn(move || {
            matches!(shared.try_admit(), dispatch::Admission::ShuttingDown)
        });
        std::thread::sleep(Duration::from_millis(50));
        s.shared.shutting_down.store(true, Ordering::Release);
        drop(guard);

        assert!(admit.join().unwrap());
        assert_eq!(s.running_count(), 0);
        assert_eq!(s.status("a").unwrap(), MirrorStatus::Queued);
    }

    #[test]
    fn remove_refused_while_queued() {
        let s = Scheduler::new(settings(1));
        s.add_repo(spec("a", 0)).unwrap();
        s.enqueue("a").unwrap();
        assert_eq!(
            s.remove_repo("a").unwrap_err().kind,
            RepoErrorKind::InUse(MirrorStatus::Queued)
        );
        s.deactivate("a").unwrap();
        s.remove_repo("a").unwrap();
        assert_eq!(s.list_repos().count(), 0);
    }

    #[test]
    fn terminate_and_kill_are_noops_when_not_running() {
        let s = Scheduler::new(settings(1));
        s.add_repo(spec("idle", 0)).unwrap();
        s.add_repo(spec("queued", 0)).unwrap();
        s.add_repo(spec("off", 0)).unwrap();
        s.enqueue("queued").unwrap();
        s.deactivate("off").unwrap();

        for name in ["idle", "queued", "off"] {
            let before = s.status(name).unwrap();
            s.terminate(name).unwrap();
            s.kill(name).unwrap();
            assert_eq!(s.status(name).unwrap(), before);
        }
    }

    #[test]
    fn status_strings_match_control_surface() {
        assert_eq!(MirrorStatus::Deactivated.as_str(), "deactivated");
        assert_eq!(MirrorStatus::Queued.as_str(), "queued");
        assert_eq!(MirrorStatus::Running.as_str(), "syncing");
        assert_eq!(MirrorStatus::Idle.as_str(), "sleeping");
    }

    #[test]
    fn list_repos_is_sorted_snapshot() {
        let s = Scheduler::new(settings(2));
        s.add_repo(spec("b", 0)).unwrap();
        s.add_repo(spec("a", 0)).unwrap();
        let names: Vec<_> = s.list_repos().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(
            s.add_repo(spec("a", 3)).unwrap_err().kind,
            RepoErrorKind::Duplicate
        );
    }

    #[test]
    fn enqueue_refused_after_shutdown() {
        let s = Scheduler::new(settings(1));
        s.add_repo(spec("a", 0)).unwrap();
        s.shutdown();
        assert_eq!(
            s.enqueue("a").unwrap_err().kind,
            RepoErrorKind::ShuttingDown
        );
    }
}
