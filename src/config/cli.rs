//! CLI argument parsing using clap

use super::OutputFormat;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Local mode (default) - coordinator and workers in one process
    Local,
    /// Coordinator mode - drive workers running in service mode
    Coordinator,
    /// Service mode - run one worker (accepts one coordinator session)
    Service,
}

/// rowshard - row-partitioned matrix served by a coordinator and workers
#[derive(Parser, Debug)]
#[command(name = "rowshard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: local, coordinator, or service
    #[arg(long, value_enum, default_value = "local")]
    pub mode: ExecutionMode,

    /// TOML configuration file (CLI options take precedence)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Global row count (N)
    #[arg(short = 'n', long, env = "ROWSHARD_ROWS")]
    pub rows: Option<usize>,

    /// Column count (M)
    #[arg(short = 'm', long, env = "ROWSHARD_COLS")]
    pub cols: Option<usize>,

    /// Number of in-process workers (local mode only)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Port for service to listen on (service mode only)
    #[arg(long, default_value = "9999")]
    pub listen_port: u16,

    /// Comma-separated list of worker addresses for coordinator mode (e.g., "10.0.1.10:9999,10.0.1.11:9999")
    #[arg(long)]
    pub host_list: Option<String>,

    /// File containing list of worker addresses (one per line, for coordinator mode)
    #[arg(long)]
    pub clients_file: Option<PathBuf>,

    /// Port to connect to on workers given without one (coordinator mode only)
    #[arg(long)]
    pub worker_port: Option<u16>,

    /// Result output format
    #[arg(long, value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    /// File with one command per line (reads standard input when omitted)
    #[arg(value_name = "COMMANDS")]
    pub commands: Option<PathBuf>,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        // Service mode doesn't need validation (coordinator sends the assignment)
        if self.mode == ExecutionMode::Service {
            return Ok(());
        }

        if self.host_list.is_some() && self.clients_file.is_some() {
            anyhow::bail!("can only specify one of --host-list or --clients-file");
        }

        if self.mode == ExecutionMode::Local && (self.host_list.is_some() || self.clients_file.is_some()) {
            anyhow::bail!("--host-list and --clients-file require --mode coordinator");
        }

        if self.mode == ExecutionMode::Coordinator && self.workers.is_some() {
            anyhow::bail!("--workers applies to local mode; coordinator mode uses one worker per host");
        }

        Ok(())
    }
}
