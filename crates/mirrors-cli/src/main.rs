mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    // Logging is initialized by each command: `run` needs the config first.
    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("mirrors error: {:#}", err);
        std::process::exit(1);
    }
}
