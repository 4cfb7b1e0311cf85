use clap::Parser;
use colored::*;
use klvm::cli::{Cli, LogLevel};
use klvm::commands::execute_command;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    init_logging(cli.log_level);

    if let Err(e) = execute_command(cli.command).map_err(anyhow::Error::from) {
        eprintln!("{} {:#}", "Error:".bright_red().bold(), e);
        process::exit(1);
    }
}

/// Install the global subscriber; `RUST_LOG` overrides the flag
fn init_logging(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
