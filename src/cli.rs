use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// KLVM - Kernel Virtual Machine
/// A dataflow interpreter with a time-sliced actor runtime
#[derive(Parser)]
#[command(name = "klvm")]
#[command(version)]
#[command(about = "Kernel virtual machine - dataflow interpreter and actor runtime")]
#[command(long_about = "
KLVM interprets compiled kernel instruction trees:
- single-assignment dataflow variables with suspension and resumption
- cooperative time-sliced scheduling
- actors with serialized mailboxes and ask/tell messaging

Usage examples:
  klvm run program.json            # Run a compiled program
  klvm run program.json --time     # Also report elapsed time
  klvm config --config klvm.toml   # Show the effective configuration
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level filter (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: LogLevel,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available commands for the KLVM CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Run a compiled program (JSON `{ "locals": [...], "instr": {...} }`)
    Run {
        /// Path to the program file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Interpreter steps per time slice
        #[arg(long)]
        time_slice: Option<usize>,

        /// Configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Show execution timing
        #[arg(short, long)]
        time: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["klvm", "run", "prog.json", "--time-slice", "64", "--log-level", "debug"]);
        assert_eq!(cli.log_level, LogLevel::Debug);
        match cli.command {
            Commands::Run {
                file, time_slice, ..
            } => {
                assert_eq!(file, PathBuf::from("prog.json"));
                assert_eq!(time_slice, Some(64));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_config() {
        let cli = Cli::parse_from(["klvm", "--no-color", "config"]);
        assert!(cli.no_color);
        assert!(matches!(cli.command, Commands::Config { config: None }));
    }
}
