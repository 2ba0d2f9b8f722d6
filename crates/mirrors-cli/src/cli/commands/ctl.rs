//! `mirrors ctl <command...>` – send one console command to a running daemon.

use anyhow::Result;
use mirrors_core::control::ControlCommand;
use std::path::Path;

pub async fn run_ctl(socket: Option<&Path>, line: &str) -> Result<()> {
    // Reject typos locally instead of round-tripping them.
    line.parse::<ControlCommand>()?;

    #[cfg(unix)]
    {
        let path = match socket {
            Some(path) => path.to_path_buf(),
            None => mirrors_core::control::default_control_socket_path()?,
        };
        let reply = crate::cli::control_socket::send_line(&path, line).await?;
        print!("{}", reply);
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = socket;
        anyhow::bail!("the control socket is only available on unix")
    }
}
