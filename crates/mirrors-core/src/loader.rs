//! Build the scheduler's mirror set from a parsed config file.
//!
//! Invalid mirrors are skipped with a warning so one bad section never
//! prevents the others from loading.

use thiserror::Error;

use crate::config::MirrorsConfig;
use crate::error::{RepoConfigError, RepoError};
use crate::mirror::MirrorSpec;
use crate::scheduler::Scheduler;

/// Why a mirror from the config did not make it into the scheduler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    #[error(transparent)]
    Config(#[from] RepoConfigError),
    #[error(transparent)]
    Registry(#[from] RepoError),
}

/// Result of [`load_mirrors`].
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<(String, LoadFailure)>,
}

/// Validate every mirror without touching a scheduler.
pub fn validate_mirrors(config: &MirrorsConfig) -> Vec<(String, Result<MirrorSpec, RepoConfigError>)> {
    config
        .mirrors
        .iter()
        .map(|(name, raw)| (name.clone(), MirrorSpec::from_config(name, raw)))
        .collect()
}

/// Add every valid mirror to `scheduler`, enqueueing each one when
/// `enqueue` is set.
pub fn load_mirrors(scheduler: &Scheduler, config: &MirrorsConfig, enqueue: bool) -> LoadReport {
    tracing::debug!("beginning loading mirrors");
    let mut report = LoadReport::default();
    for (name, spec) in validate_mirrors(config) {
        let added = spec
            .map_err(LoadFailure::from)
            .and_then(|spec| scheduler.add_repo(spec).map_err(LoadFailure::from))
            .and_then(|_| {
                if enqueue {
                    scheduler.enqueue(&name)?;
                }
                Ok(())
            });
        match added {
            Ok(()) => report.loaded.push(name),
            Err(e) => {
                tracing::warn!(mirror = %name, "failed to load: {}", e);
                report.skipped.push((name, e));
            }
        }
    }
    tracing::debug!(
        loaded = report.loaded.len(),
        skipped = report.skipped.len(),
        "finished loading mirrors"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepoConfigErrorKind;
    use crate::mirror::MirrorStatus;
    use crate::scheduler::SchedulerSettings;
    use std::time::Duration;

    const CONFIG: &str = r#"
        [global]
        async_processes = 1

        [mirrors.good]
        source = "rsync://example.org/good/"
        rsync_args = "-a"
        async_sleep = "1h"

        [mirrors.nosource]
        rsync_args = "-a"
        async_sleep = "1h"

        [mirrors.both]
        source = "rsync://example.org/both/"
        rsync_args = "-a"
        async_sleep = "1h"
        hourly_sync = [1]
    "#;

    fn scheduler() -> Scheduler {
        Scheduler::new(SchedulerSettings {
            max_running: 1,
            check_sleep: Duration::from_secs(30),
            sync_program: "true".to_string(),
        })
    }

    #[test]
    fn invalid_mirrors_are_skipped() {
        let cfg = MirrorsConfig::from_toml(CONFIG).unwrap();
        let s = scheduler();
        let report = load_mirrors(&s, &cfg, true);

        assert_eq!(report.loaded, vec!["good"]);
        assert_eq!(report.skipped.len(), 2);
        let reasons: Vec<_> = report
            .skipped
            .iter()
            .map(|(name, e)| match e {
                LoadFailure::Config(e) => (name.as_str(), e.kind.clone()),
                LoadFailure::Registry(e) => panic!("unexpected registry error {e}"),
            })
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("both", RepoConfigErrorKind::BothRecurrences),
                ("nosource", RepoConfigErrorKind::MissingSource),
            ]
        );
        assert_eq!(s.status("good").unwrap(), MirrorStatus::Queued);
    }

    #[test]
    fn loading_without_enqueue_leaves_mirrors_idle() {
        let cfg = MirrorsConfig::from_toml(CONFIG).unwrap();
        let s = scheduler();
        load_mirrors(&s, &cfg, false);
        assert_eq!(s.status("good").unwrap(), MirrorStatus::Idle);

        // Loading the same file again reports duplicates instead of replacing.
        let again = load_mirrors(&s, &cfg, false);
        assert!(again.loaded.is_empty());
        assert!(again
            .skipped
            .iter()
            .any(|(name, e)| name == "good" && matches!(e, LoadFailure::Registry(_))));
    }
}
