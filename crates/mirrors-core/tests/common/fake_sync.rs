//! Stand-in for rsync in integration tests.
//!
//! The scheduler runs `sh <script> <source> <destination>`: the script path is
//! the mirror's only sync argument and the mirror name is used as its source,
//! so every run appends the mirror name to a shared order file before doing
//! whatever the test asked for.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mirrors_core::mirror::{MirrorSpec, Recurrence};
use mirrors_core::scheduler::SchedulerSettings;
use tempfile::TempDir;

pub struct FakeSync {
    dir: TempDir,
    order_file: PathBuf,
}

impl FakeSync {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let order_file = dir.path().join("order.txt");
        Self { dir, order_file }
    }

    /// Write a script that records `$1` and then runs `body`.
    pub fn script(&self, file: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(file);
        let text = format!("echo \"$1\" >> {}\n{}\n", self.order_file.display(), body);
        fs::write(&path, text).unwrap();
        path
    }

    pub fn spec(&self, name: &str, weight: i8, script: &Path, cooldown: Duration) -> MirrorSpec {
        MirrorSpec {
            name: name.to_string(),
            source: name.to_string(),
            destination: self.dir.path().join("dest").join(format!("{name}/")),
            sync_args: script.display().to_string(),
            weight,
            recurrence: Recurrence::Cooldown(cooldown),
            pre_command: String::new(),
            post_command: String::new(),
            log_target: self.dir.path().join("log").join(format!("{name}.log")),
        }
    }

    /// Mirror names in the order their runs started.
    pub fn order(&self) -> Vec<String> {
        fs::read_to_string(&self.order_file)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

pub fn settings(max_running: usize) -> SchedulerSettings {
    SchedulerSettings {
        max_running,
        check_sleep: Duration::from_secs(30),
        sync_program: "sh".to_string(),
    }
}

/// Poll `cond` every 10ms until it holds or `timeout` elapses.
pub async fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
