//! Global run budget: how many syncs may run at once.
//!
//! Lives inside the scheduler's state lock, so reserve/release are plain
//! arithmetic serialized with queue and status changes.

/// Admission ceiling and current running count.
#[derive(Debug)]
pub(crate) struct RunBudget {
    max_running: usize,
    running: usize,
}

impl RunBudget {
    /// Create a budget with the given ceiling (from `async_processes`).
    pub(crate) fn new(max_running: usize) -> Self {
        Self {
            max_running: max_running.max(1),
            running: 0,
        }
    }

    pub(crate) fn running(&self) -> usize {
        self.running
    }

    pub(crate) fn max_running(&self) -> usize {
        self.max_running
    }

    /// Reserve one slot. Returns false when the ceiling is reached.
    pub(crate) fn try_reserve(&mut self) -> bool {
        if self.running >= self.max_running {
            return false;
        }
        self.running += 1;
        true
    }

    /// Return a slot reserved by `try_reserve`.
    pub(crate) fn release(&mut self) {
        self.running = self.running.saturating_sub(1);
    }
}
