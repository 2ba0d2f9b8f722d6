//! Mirror entity: validated definition plus scheduling state.

mod spec;
mod state;

pub use spec::{
    default_log_target, MirrorSpec, Recurrence, DEFAULT_DESTINATION, DEFAULT_LOG_DIR, MAX_WEIGHT,
    MIN_WEIGHT,
};
pub use state::{Mirror, MirrorSnapshot, MirrorStatus, RunOutcome, StopSignal};
pub(crate) use state::{RunHandle, Wakeup};
