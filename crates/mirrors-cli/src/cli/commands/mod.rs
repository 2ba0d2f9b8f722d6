//! CLI command handlers. Each command is in its own file.

mod check;
mod ctl;
mod run;

pub use check::run_check;
pub use ctl::run_ctl;
pub use run::{run_daemon, RunOptions};
