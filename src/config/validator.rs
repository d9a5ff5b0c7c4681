//! Configuration validation

use super::*;
use crate::config::cli::ExecutionMode;
use anyhow::Result;

/// Validate complete configuration for `mode`
pub fn validate_config(config: &Config, mode: ExecutionMode) -> Result<()> {
    validate_matrix(&config.matrix)?;

    match mode {
        ExecutionMode::Local => validate_local(&config.cluster),
        ExecutionMode::Coordinator => validate_hosts(&config.cluster),
        ExecutionMode::Service => Ok(()),
    }
}

/// Validate matrix dimensions
pub fn validate_matrix(matrix: &MatrixConfig) -> Result<()> {
    if matrix.rows == 0 {
        anyhow::bail!("rows must be a positive integer, got {}", matrix.rows);
    }
    if matrix.cols == 0 {
        anyhow::bail!("cols must be a positive integer, got {}", matrix.cols);
    }
    Ok(())
}

fn validate_local(cluster: &ClusterConfig) -> Result<()> {
    if cluster.workers == 0 {
        anyhow::bail!("workers must be at least 1");
    }
    Ok(())
}

fn validate_hosts(cluster: &ClusterConfig) -> Result<()> {
    if cluster.hosts.is_empty() {
        anyhow::bail!("Coordinator mode requires --host-list, --clients-file or cluster.hosts");
    }

    let mut seen = std::collections::HashSet::new();
    for host in &cluster.hosts {
        let addr = with_port(host, cluster.worker_port);
        if !seen.insert(addr.clone()) {
            anyhow::bail!("Worker address {} is listed more than once", addr);
        }
    }
    Ok(())
}
