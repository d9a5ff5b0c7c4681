//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.

pub mod cli;
pub mod toml;
pub mod validator;

use crate::partition::Layout;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// Complete session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub matrix: MatrixConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Global matrix dimensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// Global row count (N)
    pub rows: usize,
    /// Column count (M)
    pub cols: usize,
}

/// Worker placement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Worker count for local mode
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Worker addresses for coordinator mode; rank i is the i-th address
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Port used for hosts given without one
    #[serde(default = "default_worker_port")]
    pub worker_port: u16,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            hosts: Vec::new(),
            worker_port: default_worker_port(),
        }
    }
}

fn default_workers() -> usize {
    3
}

fn default_worker_port() -> u16 {
    9999
}

/// Output configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Result rendering format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `rank K >> value` lines
    #[default]
    Text,
    /// One JSON object per result
    Json,
}

impl Config {
    /// Partition layout for `workers` workers
    pub fn layout(&self, workers: usize) -> crate::Result<Layout> {
        Layout::new(self.matrix.rows, self.matrix.cols, workers).context("Invalid partition layout")
    }

    /// Worker addresses with the default port applied
    pub fn host_addresses(&self) -> Vec<String> {
        self.cluster
            .hosts
            .iter()
            .map(|host| with_port(host, self.cluster.worker_port))
            .collect()
    }
}

/// Append `port` to `addr` unless it already carries one
///
/// IPv6 addresses carry a port only in bracketed form (`[::1]:7000`); a bare
/// IPv6 address is bracketed before the port is appended.
pub fn with_port(addr: &str, port: u16) -> String {
    let addr = addr.trim();
    if addr.parse::<SocketAddr>().is_ok() {
        return addr.to_string();
    }
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return SocketAddr::new(ip, port).to_string();
    }
    if addr.starts_with('[') && addr.ends_with(']') {
        return format!("{}:{}", addr, port);
    }

    if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{}:{}", addr, port)
    }
}
