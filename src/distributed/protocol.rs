//! Coordinator/worker protocol
//!
//! This module defines the messages exchanged between the coordinator and the
//! workers. Messages are serialized with MessagePack (rmp-serde) and framed
//! with a length prefix. The framing functions work over any tokio byte
//! stream, so TCP connections and in-memory duplex pipes share one code path.
//!
//! # Protocol Version
//!
//! Current version: 1
//!
//! # Message Flow
//!
//! ```text
//! Coordinator                     Worker (rank R)
//!     |                              |
//!     |-------- ASSIGN(R) ---------->|   allocate local partition
//!     |<------- READY ---------------|
//!     |                              |
//!     |-------- COMMAND ------------>|   execute against partition
//!     |<------- REPLY(values) -------|
//!     |            ...               |
//!     |-------- COMMAND(exit) ------>|
//!     |<------- REPLY([-1]) ---------|   worker loop ends
//! ```
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```

use crate::command::{Operation, SpecialOperator};
use crate::partition::LocalRows;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Coordinator and workers must have matching protocol versions.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted frame body
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Protocol message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Partition assignment (Coordinator → Worker)
    ///
    /// First message of every session. Tells the worker its rank and the shape
    /// of the band it owns.
    Assign(AssignMessage),

    /// Ready message (Worker → Coordinator)
    ///
    /// Sent once the worker has allocated its partition.
    Ready(ReadyMessage),

    /// Sub-command in local row coordinates (Coordinator → Worker)
    Command(CommandMessage),

    /// Sub-command result (Worker → Coordinator)
    Reply(ReplyMessage),

    /// Error message (Worker → Coordinator)
    ///
    /// Sent when the worker cannot join the session.
    Error(ErrorMessage),
}

/// Partition assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignMessage {
    /// Protocol version (must match)
    pub protocol_version: u32,

    /// Rank assigned to the worker
    pub rank: usize,

    /// Rows held by the worker
    pub local_rows: usize,

    /// Columns per row
    pub cols: usize,
}

/// Ready message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyMessage {
    pub protocol_version: u32,

    /// Node identifier (hostname, or a synthetic name for in-process workers)
    pub node_id: String,

    pub rank: usize,

    /// Rows actually allocated
    pub local_rows: usize,
}

/// Per-worker sub-command
///
/// Operator names travel as text; the worker resolves them through its own
/// dispatch table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    pub operator: String,
    pub sub_operator: String,

    /// Local rows, `None` for special operators
    pub rows: Option<LocalRows>,
}

impl CommandMessage {
    pub fn new(operator: &str, sub_operator: &str, rows: LocalRows) -> Self {
        Self {
            operator: operator.to_string(),
            sub_operator: sub_operator.to_string(),
            rows: Some(rows),
        }
    }

    /// Special operator with no sub-operator or rows
    pub fn special(operator: &str) -> Self {
        Self {
            operator: operator.to_string(),
            sub_operator: String::new(),
            rows: None,
        }
    }

    /// Rebuild a routed operation for one worker
    pub fn for_operation(operation: Operation, rows: LocalRows) -> Self {
        Self::new(operation.operator(), operation.sub_operator(), rows)
    }

    pub fn for_special(special: SpecialOperator) -> Self {
        Self::special(special.name())
    }
}

/// Sub-command result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMessage {
    /// Replying worker
    pub rank: usize,

    /// Row values, a single aggregate, or the `[-1]` sentinel
    pub values: Vec<i64>,
}

/// Error message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub node_id: String,

    /// Error description
    pub error: String,
}

/// Serialize a message to bytes
///
/// Prepends a 4-byte length field for framing. Fails when the encoded message
/// exceeds [`MAX_MESSAGE_SIZE`], since the receiving side would refuse it.
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>> {
    let msg_bytes = rmp_serde::to_vec(msg).context("Failed to serialize message")?;

    if msg_bytes.len() > MAX_MESSAGE_SIZE {
        anyhow::bail!(
            "Message too large: {} bytes (max {} bytes)",
            msg_bytes.len(),
            MAX_MESSAGE_SIZE
        );
    }

    let msg_len = msg_bytes.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Read a complete message from a stream
pub async fn read_message<S>(stream: &mut S) -> Result<Message>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .context("Failed to read message length")?;

    let msg_len = u32::from_le_bytes(len_buf) as usize;
    if msg_len > MAX_MESSAGE_SIZE {
        anyhow::bail!("Message too large: {} bytes (max {} bytes)", msg_len, MAX_MESSAGE_SIZE);
    }

    let mut msg_buf = vec![0u8; msg_len];
    stream
        .read_exact(&mut msg_buf)
        .await
        .context("Failed to read message body")?;

    let msg = rmp_serde::from_slice(&msg_buf).context("Failed to deserialize message")?;

    Ok(msg)
}

/// Write a message to a stream and flush it
pub async fn write_message<S>(stream: &mut S, msg: &Message) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let framed = serialize_message(msg)?;
    write_frame(stream, &framed).await
}

/// Write an already framed message to a stream and flush it
pub async fn write_frame<S>(stream: &mut S, framed: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(framed)
        .await
        .context("Failed to write message")?;
    stream.flush().await.context("Failed to flush stream")?;

    Ok(())
}
