//! In-process workers
//!
//! Local mode runs every worker as a tokio task inside the coordinator's
//! process. Each worker gets its own in-memory duplex pipe and runs the same
//! session loop as a networked worker.

use crate::distributed::node_service::serve_connection;
use crate::partition::Layout;
use crate::Result;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;

/// Buffer size of each coordinator/worker pipe
const PIPE_CAPACITY: usize = 64 * 1024;

/// Spawn one worker task per rank of `layout`
///
/// Returns the coordinator ends of the pipes in rank order, plus the worker
/// task handles. Each handle resolves to the worker's rank once it has
/// acknowledged `exit`.
pub fn spawn_local_workers(layout: &Layout) -> (Vec<DuplexStream>, Vec<JoinHandle<Result<usize>>>) {
    (0..layout.workers())
        .map(|rank| {
            let (coordinator_end, worker_end) = tokio::io::duplex(PIPE_CAPACITY);
            let handle = tokio::spawn(async move {
                let node_id = format!("local-{}", rank);
                serve_connection(worker_end, &node_id).await
            });
            (coordinator_end, handle)
        })
        .unzip()
}
