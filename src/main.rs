//! topoquery CLI — topology-aware path queries over typed remote resources.

use clap::Parser;
use topoquery::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `TOPOQUERY_LOG=topoquery=debug`.
const LOG_ENV: &str = "TOPOQUERY_LOG";

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    if let Err(e) = topoquery::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
