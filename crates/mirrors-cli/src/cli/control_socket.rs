//! Control socket: server (during `mirrors run`) and client (for `mirrors ctl`).
//! Protocol: one console command per line; each reply is written back
//! followed by a newline. The client half-closes after its line and reads
//! until the server closes.

use anyhow::{Context, Result};
use mirrors_core::control::{self, ControlCommand};
use mirrors_core::Scheduler;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

/// Binds `path` (replacing a stale socket) and spawns a task that answers
/// each command line with the output of [`control::execute`]. `exit` also
/// notifies `exit_tx`.
pub fn spawn_control_listener(
    scheduler: Scheduler,
    path: impl AsRef<Path>,
    exit_tx: mpsc::Sender<()>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let _ = std::fs::remove_file(&path);
    let listener =
        UnixListener::bind(&path).with_context(|| format!("bind {}", path.display()))?;

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let scheduler = scheduler.clone();
                    let exit_tx = exit_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve(stream, &scheduler, &exit_tx).await {
                            tracing::debug!("control connection: {}", e);
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

async fn serve(
    stream: UnixStream,
    scheduler: &Scheduler,
    exit_tx: &mpsc::Sender<()>,
) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match line.parse::<ControlCommand>() {
            Ok(command) => {
                tracing::debug!(?command, "control command");
                let reply = control::execute(scheduler, &command);
                if command == ControlCommand::Exit {
                    let _ = exit_tx.try_send(());
                }
                reply
            }
            Err(e) => format!("error: {}", e),
        };
        write.write_all(reply.as_bytes()).await?;
        write.write_all(b"\n").await?;
    }
    Ok(())
}

/// Sends `line` to the control socket and returns the daemon's reply.
pub async fn send_line(socket_path: &Path, line: &str) -> Result<String> {
    let mut stream = UnixStream::connect(socket_path).await.with_context(|| {
        format!(
            "connect to {} (is `mirrors run` running?)",
            socket_path.display()
        )
    })?;
    stream.write_all(format!("{}\n", line.trim()).as_bytes()).await?;
    stream.shutdown().await?;
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await?;
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrors_core::SchedulerSettings;
    use std::time::Duration;

    #[tokio::test]
    async fn answers_commands_over_the_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let scheduler = Scheduler::new(SchedulerSettings {
            max_running: 1,
            check_sleep: Duration::from_secs(30),
            sync_program: "true".to_string(),
        });
        let (exit_tx, mut exit_rx) = mpsc::channel(1);
        let handle = spawn_control_listener(scheduler, &path, exit_tx).unwrap();

        assert_eq!(send_line(&path, "list").await.unwrap(), "\n");
        assert_eq!(
            send_line(&path, "status ghost").await.unwrap(),
            "error: ghost: no such mirror\n"
        );
        assert_eq!(
            send_line(&path, "frobnicate").await.unwrap(),
            "error: unknown command \"frobnicate\"; type help to list commands\n"
        );

        send_line(&path, "exit").await.unwrap();
        assert_eq!(exit_rx.recv().await, Some(()));
        handle.abort();
    }
}
