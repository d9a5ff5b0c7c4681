//! TOML configuration file parsing
//!
//! ```toml
//! [matrix]
//! rows = 300
//! cols = 10
//!
//! [cluster]
//! workers = 3
//! hosts = ["10.0.1.10", "10.0.1.11:7000"]
//!
//! [output]
//! format = "json"
//! ```

use super::*;
use crate::config::cli::Cli;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents).context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Build the configuration from the CLI, layering it over `--config` when given
pub fn build_config(cli: &Cli) -> Result<Config> {
    match cli.config {
        Some(ref path) => merge_cli_with_config(cli, parse_toml_file(path)?),
        None => {
            let rows = cli
                .rows
                .context("Missing row count: pass --rows or set matrix.rows in --config")?;
            let cols = cli
                .cols
                .context("Missing column count: pass --cols or set matrix.cols in --config")?;

            let config = Config {
                matrix: MatrixConfig { rows, cols },
                cluster: ClusterConfig::default(),
                output: OutputConfig::default(),
            };
            merge_cli_with_config(cli, config)
        }
    }
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    if let Some(rows) = cli.rows {
        config.matrix.rows = rows;
    }
    if let Some(cols) = cli.cols {
        config.matrix.cols = cols;
    }
    if let Some(workers) = cli.workers {
        config.cluster.workers = workers;
    }
    if let Some(port) = cli.worker_port {
        config.cluster.worker_port = port;
    }
    if let Some(format) = cli.output_format {
        config.output.format = format;
    }

    if let Some(ref host_list) = cli.host_list {
        config.cluster.hosts = parse_host_list(host_list);
    } else if let Some(ref clients_file) = cli.clients_file {
        config.cluster.hosts = parse_clients_file(clients_file)?;
    }

    Ok(config)
}

/// Split a comma-separated host list
pub fn parse_host_list(host_list: &str) -> Vec<String> {
    host_list
        .split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read worker addresses, one per line; blank lines and `#` comments are skipped
pub fn parse_clients_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read clients file: {}", path.display()))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
