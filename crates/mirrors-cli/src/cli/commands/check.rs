//! `mirrors check` – validate a config file without running anything.

use anyhow::{bail, Result};
use mirrors_core::mirror::{MirrorSpec, Recurrence};
use mirrors_core::{config, loader};
use std::path::Path;

pub fn run_check(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => config::config_path()?,
    };
    let cfg = config::load_from_path(&path)?;
    let global = match cfg.global() {
        Ok(global) => global,
        Err(e) => bail!("{}: {}", path.display(), e),
    };
    println!(
        "global: async_processes={} check_sleep={}s sync_program={}",
        global.max_running,
        global.check_sleep.as_secs(),
        global.sync_program
    );

    let results = loader::validate_mirrors(&cfg);
    let total = results.len();
    let mut invalid = 0;
    for (_, result) in &results {
        match result {
            Ok(spec) => println!("ok       {}", describe(spec)),
            Err(e) => {
                invalid += 1;
                println!("invalid  {}", e);
            }
        }
    }

    if invalid > 0 {
        bail!("{} of {} mirror(s) invalid", invalid, total);
    }
    println!("{} mirror(s) valid.", total);
    Ok(())
}

fn describe(spec: &MirrorSpec) -> String {
    let recurrence = match &spec.recurrence {
        Recurrence::Cooldown(delay) => format!("every {}s after a run", delay.as_secs()),
        Recurrence::FixedHours(hours) => {
            let hours: Vec<String> = hours.iter().map(|h| format!("{:02}:00", h)).collect();
            format!("at {} (manual enqueue only)", hours.join(","))
        }
    };
    format!(
        "{} weight={} {} -> {}, {}",
        spec.name,
        spec.weight,
        spec.source,
        spec.destination.display(),
        recurrence
    )
}
