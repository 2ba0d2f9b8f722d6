//! CLI for the mirrors sync scheduler.

mod commands;
mod console;
#[cfg(unix)]
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mirrors_core::logging::{self, Verbosity};
use std::path::PathBuf;

use commands::{run_check, run_ctl, run_daemon, RunOptions};

/// Top-level CLI for the mirrors sync scheduler.
#[derive(Debug, Parser)]
#[command(name = "mirrors")]
#[command(about = "mirrors: keep a set of rsync mirrors in sync", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Load the config and keep every mirror in sync until told to exit.
    Run {
        /// Config file (default: ~/.config/mirrors/mirrors.toml).
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Daemon log file (overrides `log_file` in [global]).
        #[arg(long, value_name = "FILE")]
        log: Option<PathBuf>,

        /// Log informational messages.
        #[arg(short, long, conflicts_with = "debug")]
        verbose: bool,

        /// Log everything, including each command that is run.
        #[arg(short = 'D', long)]
        debug: bool,

        /// Load mirrors without queueing their first sync.
        #[arg(long)]
        no_enqueue: bool,

        /// Do not read commands from stdin.
        #[arg(long)]
        no_console: bool,

        /// Control socket path (default: ~/.local/state/mirrors/control.sock).
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Validate a config file and report each mirror without running anything.
    Check {
        /// Config file (default: ~/.config/mirrors/mirrors.toml).
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Send one console command (e.g. `status`, `enqueue debian`) to a running daemon.
    Ctl {
        /// Control socket path (default: ~/.local/state/mirrors/control.sock).
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,

        /// Command and its argument.
        #[arg(required = true, trailing_var_arg = true, value_name = "COMMAND")]
        command: Vec<String>,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Run {
                config,
                log,
                verbose,
                debug,
                no_enqueue,
                no_console,
                socket,
            } => {
                let verbosity = if debug {
                    Verbosity::Debug
                } else if verbose {
                    Verbosity::Verbose
                } else {
                    Verbosity::Quiet
                };
                let opts = RunOptions {
                    config,
                    log,
                    verbosity,
                    enqueue: !no_enqueue,
                    console: !no_console,
                    socket,
                };
                run_daemon(&opts).await?;
            }
            CliCommand::Check { config } => {
                logging::init_logging_stderr(Verbosity::Quiet);
                run_check(config.as_deref())?;
            }
            CliCommand::Ctl { socket, command } => {
                logging::init_logging_stderr(Verbosity::Quiet);
                run_ctl(socket.as_deref(), &command.join(" ")).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
