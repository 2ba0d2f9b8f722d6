//! Control commands shared by the interactive console and the control socket.
//!
//! One command per line, e.g. `enqueue debian` or `status`. Each command maps
//! onto a [`Scheduler`] operation and produces a printable reply.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::scheduler::Scheduler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Status of one mirror, or of all when no name is given.
    Status(Option<String>),
    List,
    Enqueue(String),
    Activate(String),
    Deactivate(String),
    Remove(String),
    /// SIGTERM the running sync.
    Terminate(String),
    /// SIGKILL the running sync.
    Kill(String),
    Help,
    Exit,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}; type help to list commands")]
    Unknown(String),
    #[error("{0} requires a mirror name")]
    MissingName(&'static str),
    #[error("{0} takes at most one argument")]
    TooManyArguments(&'static str),
}

impl FromStr for ControlCommand {
    type Err = ControlParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(ControlParseError::Empty);
        };
        let arg = words.next().map(str::to_string);
        let verb: &'static str = match verb {
            "status" => "status",
            "list" => "list",
            "enqueue" | "start" => "enqueue",
            "activate" => "activate",
            "deactivate" => "deactivate",
            "remove" | "del" => "remove",
            "terminate" => "terminate",
            "kill" | "forcekill" => "kill",
            "help" | "?" => "help",
            "exit" | "quit" => "exit",
            other => return Err(ControlParseError::Unknown(other.to_string())),
        };
        if words.next().is_some() {
            return Err(ControlParseError::TooManyArguments(verb));
        }
        let named = |arg: Option<String>| arg.ok_or(ControlParseError::MissingName(verb));
        Ok(match verb {
            "status" => ControlCommand::Status(arg),
            "list" => ControlCommand::List,
            "enqueue" => ControlCommand::Enqueue(named(arg)?),
            "activate" => ControlCommand::Activate(named(arg)?),
            "deactivate" => ControlCommand::Deactivate(named(arg)?),
            "remove" => ControlCommand::Remove(named(arg)?),
            "terminate" => ControlCommand::Terminate(named(arg)?),
            "kill" => ControlCommand::Kill(named(arg)?),
            "help" => ControlCommand::Help,
            _ => ControlCommand::Exit,
        })
    }
}

pub const HELP: &str = "\
status [name]      show the status of one or all mirrors
list               list loaded mirrors
enqueue <name>     add a mirror to the sync queue (alias: start)
activate <name>    allow a mirror to be scheduled again
deactivate <name>  stop scheduling a mirror
remove <name>      remove an idle or deactivated mirror (alias: del)
terminate <name>   send SIGTERM to a running sync
kill <name>        send SIGKILL to a running sync (alias: forcekill)
exit               stop all syncs and quit (alias: quit)";

/// Execute `command` and render the reply. Operational errors become the
/// reply text; they never end the session.
pub fn execute(scheduler: &Scheduler, command: &ControlCommand) -> String {
    let result = match command {
        ControlCommand::Status(Some(name)) => scheduler
            .status(name)
            .map(|status| format!("{} is currently {}", name, status)),
        ControlCommand::Status(None) => Ok(status_table(scheduler)),
        ControlCommand::List => Ok(scheduler.list_repos().collect::<Vec<_>>().join("\n")),
        ControlCommand::Enqueue(name) => scheduler
            .enqueue(name)
            .map(|()| format!("{} added to sync queue", name)),
        ControlCommand::Activate(name) => scheduler
            .activate(name)
            .map(|()| format!("{} activated", name)),
        ControlCommand::Deactivate(name) => scheduler
            .deactivate(name)
            .map(|()| format!("{} deactivated", name)),
        ControlCommand::Remove(name) => scheduler
            .remove_repo(name)
            .map(|()| format!("{} removed", name)),
        ControlCommand::Terminate(name) => scheduler
            .terminate(name)
            .map(|()| format!("terminate sent to {}", name)),
        ControlCommand::Kill(name) => scheduler
            .kill(name)
            .map(|()| format!("kill sent to {}", name)),
        ControlCommand::Help => Ok(HELP.to_string()),
        ControlCommand::Exit => Ok("terminating mirrors process".to_string()),
    };
    result.unwrap_or_else(|e| format!("error: {}", e))
}

fn status_table(scheduler: &Scheduler) -> String {
    let snapshots = scheduler.snapshots();
    if snapshots.is_empty() {
        return "No mirrors loaded.".to_string();
    }
    let mut out = format!(
        "{:<20} {:<12} {:>6} {:>10}  {}",
        "NAME", "STATUS", "WEIGHT", "LAST (s)", "LAST OUTCOME"
    );
    for snap in snapshots {
        let length = snap
            .last_run_length
            .map(|d| d.as_secs().to_string())
            .unwrap_or_else(|| "-".to_string());
        let outcome = snap
            .last_outcome
            .as_ref()
            .map(|o| o.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = write!(
            out,
            "\n{:<20} {:<12} {:>6} {:>10}  {}",
            snap.name(),
            snap.status.as_str(),
            snap.spec.weight,
            length,
            outcome
        );
    }
    out
}

/// Default path for the control socket (XDG state dir, next to the log).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("mirrors")?.get_state_home();
    Ok(dir.join("control.sock"))
}
