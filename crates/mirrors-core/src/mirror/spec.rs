//! Validated, immutable mirror definition.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::RawMirrorConfig;
use crate::error::{RepoConfigError, RepoConfigErrorKind};
use crate::scheduler::parse_duration;

/// Destination used when a mirror does not declare one.
pub const DEFAULT_DESTINATION: &str = "./distro/";

/// Directory holding per-mirror logs when `log_file` is not set.
pub const DEFAULT_LOG_DIR: &str = "./log";

pub const MIN_WEIGHT: i8 = -10;
pub const MAX_WEIGHT: i8 = 10;

/// When a mirror becomes ready again after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recurrence {
    /// Re-enqueue this long after the previous run finished.
    Cooldown(Duration),
    /// Hours of the day (0..=23). Accepted and validated, never fired.
    FixedHours(BTreeSet<u8>),
}

/// Everything the scheduler needs to run one mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSpec {
    pub name: String,
    pub source: String,
    pub destination: PathBuf,
    /// Argument string for the sync program, split on whitespace at run time.
    pub sync_args: String,
    /// Higher runs first among ready mirrors. Within [`MIN_WEIGHT`, `MAX_WEIGHT`].
    pub weight: i8,
    pub recurrence: Recurrence,
    /// Shell command run before the sync; empty means none.
    pub pre_command: String,
    /// Shell command run after the sync; empty means none.
    pub post_command: String,
    /// File receiving the combined output of every command of a run.
    pub log_target: PathBuf,
}

impl MirrorSpec {
    /// Validate one `[mirrors.<name>]` table, filling in defaults.
    pub fn from_config(name: &str, raw: &RawMirrorConfig) -> Result<Self, RepoConfigError> {
        let fail = |kind| RepoConfigError::new(name, kind);

        if name.trim().is_empty() {
            return Err(fail(RepoConfigErrorKind::EmptyName));
        }

        let source = raw
            .source
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| fail(RepoConfigErrorKind::MissingSource))?;

        let sync_args = raw
            .rsync_args
            .clone()
            .ok_or_else(|| fail(RepoConfigErrorKind::MissingSyncArgs))?;

        let weight = raw.weight.unwrap_or(0);
        if weight < i64::from(MIN_WEIGHT) || weight > i64::from(MAX_WEIGHT) {
            return Err(fail(RepoConfigErrorKind::WeightOutOfRange(weight)));
        }

        let recurrence = match (&raw.async_sleep, &raw.hourly_sync) {
            (Some(_), Some(_)) => return Err(fail(RepoConfigErrorKind::BothRecurrences)),
            (None, None) => return Err(fail(RepoConfigErrorKind::NoRecurrence)),
            (Some(cooldown), None) => Recurrence::Cooldown(
                parse_duration(cooldown)
                    .map_err(|e| fail(RepoConfigErrorKind::InvalidCooldown(e)))?,
            ),
            (None, Some(hours)) => {
                if hours.is_empty() {
                    return Err(fail(RepoConfigErrorKind::NoHours));
                }
                let mut set = BTreeSet::new();
                for &hour in hours {
                    let h = u8::try_from(hour)
                        .ok()
                        .filter(|h| *h < 24)
                        .ok_or_else(|| fail(RepoConfigErrorKind::HourOutOfRange(hour)))?;
                    set.insert(h);
                }
                Recurrence::FixedHours(set)
            }
        };

        Ok(Self {
            name: name.to_string(),
            source,
            destination: raw
                .destination
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DESTINATION)),
            sync_args,
            weight: weight as i8,
            recurrence,
            pre_command: raw.pre_command.clone().unwrap_or_default(),
            post_command: raw.post_command.clone().unwrap_or_default(),
            log_target: raw
                .log_file
                .clone()
                .unwrap_or_else(|| default_log_target(name)),
        })
    }
}

/// `./log/<name>.log`.
pub fn default_log_target(name: &str) -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIR).join(format!("{name}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> RawMirrorConfig {
        RawMirrorConfig {
            source: Some("rsync://example.org/pub/".to_string()),
            rsync_args: Some("-avH".to_string()),
            async_sleep: Some("10m".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_are_filled_in() {
        let spec = MirrorSpec::from_config("centos", &base()).unwrap();
        assert_eq!(spec.name, "centos");
        assert_eq!(spec.destination, PathBuf::from("./distro/"));
        assert_eq!(spec.weight, 0);
        assert_eq!(spec.recurrence, Recurrence::Cooldown(Duration::from_secs(600)));
        assert!(spec.pre_command.is_empty());
        assert!(spec.post_command.is_empty());
        assert_eq!(spec.log_target, PathBuf::from("./log/centos.log"));
    }

    #[test]
    fn missing_source_is_rejected() {
        let raw = RawMirrorConfig {
            source: None,
            ..base()
        };
        let err = MirrorSpec::from_config("a", &raw).unwrap_err();
        assert_eq!(err.kind, RepoConfigErrorKind::MissingSource);
        assert_eq!(err.name, "a");
    }

    #[test]
    fn missing_sync_args_is_rejected() {
        let raw = RawMirrorConfig {
            rsync_args: None,
            ..base()
        };
        let err = MirrorSpec::from_config("a", &raw).unwrap_err();
        assert_eq!(err.kind, RepoConfigErrorKind::MissingSyncArgs);
    }

    #[test]
    fn recurrence_must_be_exactly_one() {
        let both = RawMirrorConfig {
            hourly_sync: Some(vec![3]),
            ..base()
        };
        assert_eq!(
            MirrorSpec::from_config("a", &both).unwrap_err().kind,
            RepoConfigErrorKind::BothRecurrences
        );

        let neither = RawMirrorConfig {
            async_sleep: None,
            ..base()
        };
        assert_eq!(
            MirrorSpec::from_config("a", &neither).unwrap_err().kind,
            RepoConfigErrorKind::NoRecurrence
        );
    }

    #[test]
    fn weight_range_is_enforced() {
        for (weight, ok) in [(-10, true), (10, true), (-11, false), (11, false)] {
            let raw = RawMirrorConfig {
                weight: Some(weight),
                ..base()
            };
            assert_eq!(MirrorSpec::from_config("a", &raw).is_ok(), ok, "weight {weight}");
        }
    }

    #[test]
    fn fixed_hours_are_validated() {
        let raw = RawMirrorConfig {
            async_sleep: None,
            hourly_sync: Some(vec![23, 0, 6, 6]),
            ..base()
        };
        let spec = MirrorSpec::from_config("a", &raw).unwrap();
        assert_eq!(
            spec.recurrence,
            Recurrence::FixedHours([0u8, 6, 23].into_iter().collect())
        );

        let bad = RawMirrorConfig {
            async_sleep: None,
            hourly_sync: Some(vec![24]),
            ..base()
        };
        assert_eq!(
            MirrorSpec::from_config("a", &bad).unwrap_err().kind,
            RepoConfigErrorKind::HourOutOfRange(24)
        );
    }

    #[test]
    fn bad_cooldown_is_reported() {
        let raw = RawMirrorConfig {
            async_sleep: Some("10y".to_string()),
            ..base()
        };
        assert!(matches!(
            MirrorSpec::from_config("a", &raw).unwrap_err().kind,
            RepoConfigErrorKind::InvalidCooldown(_)
        ));
    }
}
