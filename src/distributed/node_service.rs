//! Worker node service
//!
//! This module implements the worker side of a session. A worker:
//! - Waits for its partition assignment from the coordinator
//! - Allocates its band of the matrix
//! - Runs a blocking receive → execute → reply loop
//! - Stops after acknowledging `exit`
//!
//! The loop itself ([`serve_connection`]) works over any byte stream;
//! [`NodeService`] binds it to a TCP listener for service mode.

use crate::distributed::protocol::*;
use crate::executor::{WorkerExecutor, ERROR_SENTINEL};
use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Node service
///
/// Runs one worker process in service mode, accepting a single coordinator
/// session.
pub struct NodeService {
    /// Port to listen on
    listen_port: u16,

    /// Node identifier (hostname)
    node_id: String,
}

impl NodeService {
    /// Create a new node service
    pub fn new(listen_port: u16) -> Result<Self> {
        let node_id = get_node_id()?;

        Ok(Self {
            listen_port,
            node_id,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Run the node service
    ///
    /// Accepts one coordinator connection and serves it until `exit`.
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.listen_port);
        let listener = TcpListener::bind(&addr)
            .await
            .context("Failed to bind node service")?;

        info!(port = self.listen_port, node_id = %self.node_id, "node service listening");

        let (stream, addr) = listener
            .accept()
            .await
            .context("Failed to accept connection")?;
        stream.set_nodelay(true).context("Failed to set TCP_NODELAY")?;

        info!(%addr, "coordinator connected");

        let rank = serve_connection(stream, &self.node_id).await?;
        info!(rank, "worker terminated");

        Ok(())
    }
}

/// Serve one coordinator session on `stream`
///
/// Returns the rank this worker was assigned once `exit` has been acknowledged.
pub async fn serve_connection<S>(mut stream: S, node_id: &str) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let assign = match read_message(&mut stream).await? {
        Message::Assign(assign) => assign,
        other => anyhow::bail!("Expected ASSIGN message, got {:?}", other),
    };

    if assign.protocol_version != PROTOCOL_VERSION {
        let error = ErrorMessage {
            node_id: node_id.to_string(),
            error: format!(
                "Protocol version mismatch: coordinator={}, node={}",
                assign.protocol_version, PROTOCOL_VERSION
            ),
        };
        write_message(&mut stream, &Message::Error(error)).await?;
        anyhow::bail!("Protocol version mismatch");
    }

    let executor = WorkerExecutor::new(assign.rank, assign.local_rows, assign.cols);
    info!(
        rank = assign.rank,
        rows = assign.local_rows,
        cols = assign.cols,
        "partition allocated"
    );

    let ready = ReadyMessage {
        protocol_version: PROTOCOL_VERSION,
        node_id: node_id.to_string(),
        rank: assign.rank,
        local_rows: executor.partition().rows(),
    };
    write_message(&mut stream, &Message::Ready(ready)).await?;

    loop {
        let command = match read_message(&mut stream)
            .await
            .with_context(|| format!("Worker {} lost the coordinator", assign.rank))?
        {
            Message::Command(command) => command,
            other => anyhow::bail!("Expected COMMAND message, got {:?}", other),
        };

        debug!(rank = assign.rank, ?command, "received command");
        let execution = executor.execute(&command);

        let reply = Message::Reply(ReplyMessage {
            rank: assign.rank,
            values: execution.values,
        });
        let framed = match serialize_message(&reply) {
            Ok(framed) => framed,
            Err(e) => {
                warn!(rank = assign.rank, "reply cannot be sent: {:#}", e);
                serialize_message(&Message::Reply(ReplyMessage {
                    rank: assign.rank,
                    values: vec![ERROR_SENTINEL],
                }))?
            }
        };
        write_frame(&mut stream, &framed).await?;

        if execution.terminate {
            return Ok(assign.rank);
        }
    }
}

fn get_node_id() -> Result<String> {
    if let Ok(hostname) = hostname::get() {
        if let Ok(hostname_str) = hostname.into_string() {
            return Ok(hostname_str);
        }
    }

    Ok("unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::LocalRows;

    async fn assign(stream: &mut tokio::io::DuplexStream, rank: usize, rows: usize, cols: usize) {
        let msg = Message::Assign(AssignMessage {
            protocol_version: PROTOCOL_VERSION,
            rank,
            local_rows: rows,
            cols,
        });
        write_message(stream, &msg).await.unwrap();
    }

    async fn request(stream: &mut tokio::io::DuplexStream, command: CommandMessage) -> ReplyMessage {
        write_message(stream, &Message::Command(command)).await.unwrap();
        match read_message(stream).await.unwrap() {
            Message::Reply(reply) => reply,
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_session_until_exit() {
        let (mut coordinator, worker) = tokio::io::duplex(4096);
        let handle = tokio::spawn(async move { serve_connection(worker, "test-node").await });

        assign(&mut coordinator, 1, 5, 3).await;
        match read_message(&mut coordinator).await.unwrap() {
            Message::Ready(ready) => {
                assert_eq!(ready.rank, 1);
                assert_eq!(ready.local_rows, 5);
                assert_eq!(ready.node_id, "test-node");
            }
            other => panic!("Wrong message type: {:?}", other),
        }

        let reply = request(&mut coordinator, CommandMessage::new("get", "row", LocalRows::Single(2))).await;
        assert_eq!(reply, ReplyMessage { rank: 1, values: vec![1, 1, 1] });

        let reply = request(&mut coordinator, CommandMessage::new("get", "row", LocalRows::Single(5))).await;
        assert_eq!(reply.values, vec![-1]);

        let reply = request(&mut coordinator, CommandMessage::special("exit")).await;
        assert_eq!(reply.values, vec![-1]);

        assert_eq!(handle.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_oversized_reply_becomes_sentinel() {
        let (mut coordinator, worker) = tokio::io::duplex(4096);
        let handle = tokio::spawn(async move { serve_connection(worker, "test-node").await });

        // a rank of 2^33 fills the row with 9-byte integers, so one row of
        // MAX_MESSAGE_SIZE / 8 columns no longer fits in a frame
        let rank = 1 << 33;
        let cols = MAX_MESSAGE_SIZE / 8;
        assign(&mut coordinator, rank, 1, cols).await;
        let _ready = read_message(&mut coordinator).await.unwrap();

        let reply = request(&mut coordinator, CommandMessage::new("get", "row", LocalRows::Single(0))).await;
        assert_eq!(reply, ReplyMessage { rank, values: vec![-1] });

        // the stream is still framed correctly afterwards
        let reply = request(&mut coordinator, CommandMessage::new("get", "aggr", LocalRows::Single(0))).await;
        assert_eq!(reply.values, vec![(1i64 << 33) * cols as i64]);

        let reply = request(&mut coordinator, CommandMessage::special("exit")).await;
        assert_eq!(reply.values, vec![-1]);
        assert_eq!(handle.await.unwrap().unwrap(), rank);
    }

    #[tokio::test]
    async fn test_protocol_version_mismatch() {
        let (mut coordinator, worker) = tokio::io::duplex(4096);
        let handle = tokio::spawn(async move { serve_connection(worker, "test-node").await });

        let msg = Message::Assign(AssignMessage {
            protocol_version: PROTOCOL_VERSION + 1,
            rank: 0,
            local_rows: 1,
            cols: 1,
        });
        write_message(&mut coordinator, &msg).await.unwrap();

        match read_message(&mut coordinator).await.unwrap() {
            Message::Error(error) => assert!(error.error.contains("mismatch")),
            other => panic!("Wrong message type: {:?}", other),
        }
        assert!(handle.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_coordinator_disconnect_ends_session() {
        let (mut coordinator, worker) = tokio::io::duplex(4096);
        let handle = tokio::spawn(async move { serve_connection(worker, "test-node").await });

        assign(&mut coordinator, 0, 2, 2).await;
        let _ready = read_message(&mut coordinator).await.unwrap();
        drop(coordinator);

        assert!(handle.await.unwrap().is_err());
    }
}
