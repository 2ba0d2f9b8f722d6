//! Rescheduler: arms the cooldown re-enqueue after a run.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::error::DurationError;
use crate::mirror::{Mirror, Recurrence, Wakeup};

use super::Shared;

/// Parse `<integer><unit>` with unit one of s, m, h, d, w.
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    let s = s.trim();
    let Some(unit) = s.chars().last() else {
        return Err(DurationError::Empty);
    };
    let secs_per_unit: u64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        'w' => 604_800,
        _ => return Err(DurationError::UnknownUnit(unit.to_string())),
    };
    let count: u64 = s[..s.len() - unit.len_utf8()]
        .trim()
        .parse()
        .map_err(|_| DurationError::InvalidNumber(s.to_string()))?;
    count
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| DurationError::Overflow(s.to_string()))
}

impl Shared {
    /// Arm the next re-enqueue for a mirror that just went back to Idle.
    /// Called with the state lock held.
    pub(super) fn arm_reschedule(self: &Arc<Self>, mirror: &mut Mirror, wakeup_id: u64) {
        let name = mirror.spec.name.clone();
        let delay = match &mirror.spec.recurrence {
            Recurrence::Cooldown(delay) => *delay,
            Recurrence::FixedHours(hours) => {
                tracing::warn!(
                    mirror = %name,
                    ?hours,
                    "hourly_sync is not scheduled automatically; enqueue manually"
                );
                return;
            }
        };
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(mirror = %name, "no runtime to arm cooldown; not rescheduled");
            return;
        };

        let shared = Arc::downgrade(self);
        let task_name = name.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.wake_mirror(&task_name, wakeup_id);
            }
        });
        mirror.wakeup = Some(Wakeup {
            id: wakeup_id,
            handle: task.abort_handle(),
        });
        tracing::info!(mirror = %name, "will sleep for {}s", delay.as_secs());
    }

    /// Cooldown elapsed: re-enqueue if this wakeup is still the armed one.
    fn wake_mirror(&self, name: &str, wakeup_id: u64) {
        let queued = {
            let mut guard = self.lock();
            let state = &mut *guard;
            match state.registry.get_mut(name) {
                Ok(mirror) if mirror.wakeup.as_ref().map(|w| w.id) == Some(wakeup_id) => {
                    mirror.wakeup = None;
                }
                _ => {
                    tracing::debug!(mirror = %name, "stale cooldown wakeup ignored");
                    return;
                }
            }
            self.enqueue_locked(state, name)
        };
        match queued {
            Ok(()) => {
                tracing::debug!(mirror = %name, "cooldown elapsed, re-queued");
                self.wake.notify_one();
            }
            Err(e) => tracing::debug!("cooldown re-enqueue skipped: {}", e),
        }
    }
}
