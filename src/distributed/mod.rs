//! Distributed execution
//!
//! rowshard uses a coordinator-worker architecture:
//!
//! - **Coordinator**: Parses commands, routes them to workers, merges replies
//! - **Worker**: Owns one band of the matrix, answers sub-commands
//!
//! Workers never talk to each other, only to the coordinator.
//!
//! # Modules
//!
//! - `protocol`: Message definitions and framing
//! - `node_service`: Worker session loop and TCP service
//! - `coordinator`: Handshake, scatter/gather dispatch and merging
//! - `local`: In-process workers over memory pipes

pub mod coordinator;
pub mod local;
pub mod node_service;
pub mod protocol;

pub use coordinator::{Coordinator, SessionState, WorkerLink};
pub use local::spawn_local_workers;
pub use node_service::{serve_connection, NodeService};
pub use protocol::{
    AssignMessage, CommandMessage, ErrorMessage, Message, ReadyMessage, ReplyMessage,
    PROTOCOL_VERSION,
};
