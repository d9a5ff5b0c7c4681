//! Logging initialization
//!
//! Diagnostics go to stderr through `tracing`; command results are written
//! to stdout by the output layer.

use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Filter directive for a `-v` count
pub fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Initialize tracing; `RUST_LOG` overrides the verbosity flag
pub fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_line_number(verbose >= 3)
        .init();

    debug!("rowshard started with verbosity level: {}", verbose);
}
