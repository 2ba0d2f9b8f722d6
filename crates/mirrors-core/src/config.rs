use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::GlobalConfigError;

/// Default backoff between admission retries when the ceiling is reached.
pub const DEFAULT_CHECK_SLEEP_SECS: u64 = 30;

/// Default sync tool invoked for every mirror.
pub const DEFAULT_SYNC_PROGRAM: &str = "rsync";

/// `[global]` section as written in the config file. Every field is optional
/// here so that missing values surface as [`GlobalConfigError`] instead of a
/// TOML parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawGlobalConfig {
    /// Maximum number of syncs running at once.
    #[serde(default, alias = "max_concurrent")]
    pub async_processes: Option<u64>,
    /// Seconds the dispatcher waits before re-checking a full run budget.
    #[serde(default)]
    pub check_sleep: Option<u64>,
    /// Daemon log file (per-mirror output goes to each mirror's own log).
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Program used to sync every mirror; `rsync` unless overridden.
    #[serde(default)]
    pub sync_program: Option<String>,
}

/// One `[mirrors.<name>]` table. Validated into a `MirrorSpec` by
/// `MirrorSpec::from_config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMirrorConfig {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub destination: Option<PathBuf>,
    #[serde(default, alias = "sync_args")]
    pub rsync_args: Option<String>,
    #[serde(default)]
    pub weight: Option<i64>,
    /// Cooldown between the end of one run and the next, e.g. `"6h"`.
    #[serde(default, alias = "cooldown")]
    pub async_sleep: Option<String>,
    /// Hours of the day the mirror should run on.
    #[serde(default, alias = "fixed_hours")]
    pub hourly_sync: Option<Vec<i64>>,
    #[serde(default)]
    pub pre_command: Option<String>,
    #[serde(default)]
    pub post_command: Option<String>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// Whole config file: `[global]` plus one table per mirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorsConfig {
    #[serde(default)]
    pub global: Option<RawGlobalConfig>,
    #[serde(default)]
    pub mirrors: BTreeMap<String, RawMirrorConfig>,
}

/// Validated global settings consumed by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Concurrency ceiling.
    pub max_running: usize,
    pub check_sleep: Duration,
    pub log_file: Option<PathBuf>,
    pub sync_program: String,
}

impl GlobalConfig {
    pub fn new(max_running: usize) -> Self {
        Self {
            max_running,
            check_sleep: Duration::from_secs(DEFAULT_CHECK_SLEEP_SECS),
            log_file: None,
            sync_program: DEFAULT_SYNC_PROGRAM.to_string(),
        }
    }
}

impl MirrorsConfig {
    pub fn from_toml(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    /// Validate the `[global]` section. Any error here is fatal.
    pub fn global(&self) -> Result<GlobalConfig, GlobalConfigError> {
        let raw = self
            .global
            .as_ref()
            .ok_or(GlobalConfigError::MissingSection)?;
        let max_running = raw
            .async_processes
            .ok_or(GlobalConfigError::MissingField("async_processes"))?;
        if max_running < 1 {
            return Err(GlobalConfigError::TooSmall {
                field: "async_processes",
                min: 1,
                value: max_running,
            });
        }
        let check_sleep = raw.check_sleep.unwrap_or(DEFAULT_CHECK_SLEEP_SECS);
        if check_sleep < 1 {
            return Err(GlobalConfigError::TooSmall {
                field: "check_sleep",
                min: 1,
                value: check_sleep,
            });
        }
        Ok(GlobalConfig {
            max_running: max_running as usize,
            check_sleep: Duration::from_secs(check_sleep),
            log_file: raw.log_file.clone(),
            sync_program: raw
                .sync_program
                .clone()
                .unwrap_or_else(|| DEFAULT_SYNC_PROGRAM.to_string()),
        })
    }
}

/// Default config location: `~/.config/mirrors/mirrors.toml`.
pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mirrors")?;
    Ok(xdg_dirs.get_config_home().join("mirrors.toml"))
}

/// Read and parse a config file. Validation of `[global]` and of each mirror
/// is left to the caller so it can decide what is fatal.
pub fn load_from_path(path: &Path) -> Result<MirrorsConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    MirrorsConfig::from_toml(&data).with_context(|| format!("parse config {}", path.display()))
}
