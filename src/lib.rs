//! rowshard - row-partitioned integer matrix behind a coordinator
//!
//! A logical `N x M` integer matrix is split by rows across a fixed set of
//! workers. A single coordinator accepts textual commands, routes them to the
//! workers that own the addressed rows, runs the per-worker sub-commands in
//! parallel and merges the partial results into one answer.
//!
//! # Architecture
//!
//! - **Partitioning**: pure mapping between global rows and (worker, local row)
//! - **Command parsing**: text → classified, routed request
//! - **Execution**: one worker's sub-command against its local band
//! - **Coordination**: scatter/gather over the coordinator/worker protocol
//!
//! # Example
//!
//! ```no_run
//! use rowshard::config::OutputFormat;
//! use rowshard::distributed::{spawn_local_workers, Coordinator};
//! use rowshard::partition::Layout;
//!
//! # async fn run() -> rowshard::Result<()> {
//! let layout = Layout::new(300, 10, 3)?;
//! let (streams, _workers) = spawn_local_workers(&layout);
//! let mut coordinator = Coordinator::handshake(layout, streams).await?;
//!
//! let commands: &[u8] = b"get aggr 150-250\nexit\n";
//! coordinator
//!     .run_session(commands, &mut std::io::stdout(), OutputFormat::Text)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod distributed;
pub mod executor;
pub mod logging;
pub mod output;
pub mod partition;

// Re-export commonly used types
pub use command::{CommandParser, Operation, Parsed, SpecialOperator};
pub use config::Config;
pub use distributed::Coordinator;
pub use executor::WorkerExecutor;
pub use output::Report;
pub use partition::Layout;

/// Result type used throughout rowshard
pub type Result<T> = anyhow::Result<T>;
