//! Error taxonomy.
//!
//! - [`GlobalConfigError`]: fatal, aborts startup.
//! - [`RepoConfigError`]: one mirror failed validation; the loader skips it.
//! - [`RepoError`]: an operation was refused for one mirror (unknown name,
//!   invalid state transition). Never affects other mirrors.

use thiserror::Error;

use crate::mirror::MirrorStatus;

/// Missing or invalid `[global]` configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GlobalConfigError {
    #[error("config requires a [global] section")]
    MissingSection,
    #[error("no {0} value defined in [global]")]
    MissingField(&'static str),
    #[error("{field} in [global] must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        min: u64,
        value: u64,
    },
}

/// Error parsing a human-readable duration such as `10m`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,
    #[error("invalid number in duration {0:?}")]
    InvalidNumber(String),
    #[error("unknown duration unit {0:?} (expected one of s, m, h, d, w)")]
    UnknownUnit(String),
    #[error("duration {0:?} is too large")]
    Overflow(String),
}

/// A mirror's configuration could not be validated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{name}: {kind}")]
pub struct RepoConfigError {
    pub name: String,
    pub kind: RepoConfigErrorKind,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepoConfigErrorKind {
    #[error("mirror name must not be empty")]
    EmptyName,
    #[error("no source defined")]
    MissingSource,
    #[error("no rsync_args defined")]
    MissingSyncArgs,
    #[error("weight {0} is outside [-10, 10]")]
    WeightOutOfRange(i64),
    #[error("both async_sleep and hourly_sync cannot be defined")]
    BothRecurrences,
    #[error("either async_sleep or hourly_sync must be defined")]
    NoRecurrence,
    #[error("invalid async_sleep: {0}")]
    InvalidCooldown(#[source] DurationError),
    #[error("hourly_sync must list at least one hour")]
    NoHours,
    #[error("hourly_sync hour {0} is outside 0..=23")]
    HourOutOfRange(i64),
}

impl RepoConfigError {
    pub fn new(name: impl Into<String>, kind: RepoConfigErrorKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// An operation on a registered mirror was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{name}: {kind}")]
pub struct RepoError {
    pub name: String,
    pub kind: RepoErrorKind,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RepoErrorKind {
    #[error("no such mirror")]
    NotFound,
    #[error("mirror already exists")]
    Duplicate,
    #[error("mirror is {0} and cannot be removed")]
    InUse(MirrorStatus),
    #[error("mirror is deactivated")]
    Deactivated,
    #[error("already queued")]
    AlreadyQueued,
    #[error("already running")]
    AlreadyRunning,
    #[error("scheduler is shutting down")]
    ShuttingDown,
}

impl RepoError {
    pub fn new(name: impl Into<String>, kind: RepoErrorKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub(crate) fn not_found(name: &str) -> Self {
        Self::new(name, RepoErrorKind::NotFound)
    }
}
