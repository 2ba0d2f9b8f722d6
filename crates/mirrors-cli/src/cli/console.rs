//! Interactive console on stdin for `mirrors run`.
//!
//! Reads on a dedicated thread so a pending read never holds up runtime
//! shutdown. Scheduler operations are synchronous and safe to call from here.

use mirrors_core::control::{self, ControlCommand};
use mirrors_core::Scheduler;
use std::io::{self, BufRead, Write};
use std::thread;
use tokio::sync::mpsc;

pub fn spawn_console(
    scheduler: Scheduler,
    exit_tx: mpsc::Sender<()>,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || run_console(&scheduler, io::stdin().lock(), io::stdout(), &exit_tx))
}

/// Answer command lines from `input` until `exit` or end of input. End of
/// input (e.g. stdin redirected from /dev/null) leaves the daemon running.
fn run_console(
    scheduler: &Scheduler,
    input: impl BufRead,
    mut output: impl Write,
    exit_tx: &mpsc::Sender<()>,
) {
    for line in input.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let (reply, exit) = match line.parse::<ControlCommand>() {
            Ok(command) => (
                control::execute(scheduler, &command),
                command == ControlCommand::Exit,
            ),
            Err(e) => (format!("error: {}", e), false),
        };
        let _ = writeln!(output, "{}", reply);
        let _ = output.flush();
        if exit {
            let _ = exit_tx.blocking_send(());
            return;
        }
    }
    tracing::debug!("console input closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrors_core::SchedulerSettings;
    use std::time::Duration;

    #[test]
    fn replies_to_each_line_and_stops_at_exit() {
        let scheduler = Scheduler::new(SchedulerSettings {
            max_running: 1,
            check_sleep: Duration::from_secs(30),
            sync_program: "true".to_string(),
        });
        let (exit_tx, mut exit_rx) = mpsc::channel(1);
        let input = "list\n\nstart ghost\nbogus\nquit\nhelp\n";
        let mut output = Vec::new();

        run_console(&scheduler, input.as_bytes(), &mut output, &exit_tx);

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "");
        assert_eq!(lines[1], "error: ghost: no such mirror");
        assert!(lines[2].starts_with("error: unknown command"));
        assert_eq!(lines[3], "terminating mirrors process");
        assert_eq!(lines.len(), 4);
        assert_eq!(exit_rx.try_recv(), Ok(()));
    }
}
