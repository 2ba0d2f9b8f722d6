pub mod config;
pub mod logging;

pub mod control;
pub mod error;
pub mod loader;
pub mod mirror;
pub mod registry;
pub mod scheduler;

pub use error::{GlobalConfigError, RepoConfigError, RepoError};
pub use scheduler::{Scheduler, SchedulerSettings};
