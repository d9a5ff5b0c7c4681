//! Coordinator
//!
//! This module implements the entry-point side of a session. The coordinator:
//! - Hands every worker its rank and partition shape
//! - Parses each command line and routes it to the owning workers
//! - Dispatches per-worker sub-commands concurrently and waits for all replies
//! - Merges replies into one [`Report`]
//! - Broadcasts special operators (`exit`) to every worker
//!
//! # Scatter/gather
//!
//! ```text
//! "get aggr 150-250"
//!        |
//!   CommandParser ──> [(rank 1, [50, 100)), (rank 2, [0, 51))]
//!        |
//!   ┌────┴─────┐
//!   v          v
//! rank 1     rank 2        concurrent request/reply pairs
//!   |          |
//!   └────┬─────┘
//!        v
//!   join all, then merge ──> aggregate [ranks 1, 2] >> 1520
//! ```
//!
//! Replies are buffered and merged in rank order regardless of arrival order.

use crate::command::{Classification, CommandParser, Operation, Parsed, Query, SpecialOperator};
use crate::config::OutputFormat;
use crate::distributed::protocol::*;
use crate::executor::{is_sentinel, is_sentinel_reply};
use crate::output::{self, RankReply, Report};
use crate::partition::Layout;
use anyhow::{Context, Result};
use futures::future::try_join_all;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Connection to one worker
#[derive(Debug)]
pub struct WorkerLink<S> {
    rank: usize,
    node_id: String,
    stream: S,
}

impl<S> WorkerLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Send one sub-command and wait for its reply
    async fn request(&mut self, command: &CommandMessage) -> Result<RankReply> {
        write_message(&mut self.stream, &Message::Command(command.clone()))
            .await
            .with_context(|| format!("Failed to send command to rank {}", self.rank))?;

        match read_message(&mut self.stream)
            .await
            .with_context(|| format!("Failed to read reply from rank {}", self.rank))?
        {
            Message::Reply(reply) => Ok(RankReply {
                rank: self.rank,
                values: reply.values,
            }),
            other => anyhow::bail!("Expected REPLY from rank {}, got {:?}", self.rank, other),
        }
    }
}

/// Session state of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting commands
    Listening,

    /// `exit` has been acknowledged by every worker
    Terminated,
}

/// Coordinator for one session
pub struct Coordinator<S> {
    parser: CommandParser,
    links: Vec<WorkerLink<S>>,
    state: SessionState,
}

impl Coordinator<TcpStream> {
    /// Connect to workers by address; rank `i` is the `i`-th address
    pub async fn connect(rows: usize, cols: usize, addresses: &[String]) -> Result<Self> {
        let layout = Layout::new(rows, cols, addresses.len()).context("Invalid partition layout")?;

        let mut streams = Vec::with_capacity(addresses.len());
        for addr in addresses {
            info!(%addr, "connecting to worker");
            let stream = TcpStream::connect(addr)
                .await
                .with_context(|| format!("Failed to connect to {}", addr))?;
            stream.set_nodelay(true).context("Failed to set TCP_NODELAY")?;
            streams.push(stream);
        }

        Self::handshake(layout, streams).await
    }
}

impl<S> Coordinator<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Assign ranks over already-open streams and wait until every worker is ready
    ///
    /// `streams[i]` becomes rank `i`.
    pub async fn handshake(layout: Layout, streams: Vec<S>) -> Result<Self> {
        if streams.len() != layout.workers() {
            anyhow::bail!(
                "Layout expects {} workers but {} streams were given",
                layout.workers(),
                streams.len()
            );
        }

        let mut links = Vec::with_capacity(streams.len());
        for (rank, mut stream) in streams.into_iter().enumerate() {
            let assign = AssignMessage {
                protocol_version: PROTOCOL_VERSION,
                rank,
                local_rows: layout.local_rows(rank),
                cols: layout.cols(),
            };
            write_message(&mut stream, &Message::Assign(assign))
                .await
                .with_context(|| format!("Failed to send ASSIGN to rank {}", rank))?;

            let ready = match read_message(&mut stream).await? {
                Message::Ready(ready) => ready,
                Message::Error(error) => {
                    anyhow::bail!("Worker {} ({}) failed: {}", rank, error.node_id, error.error)
                }
                other => anyhow::bail!("Expected READY from rank {}, got {:?}", rank, other),
            };

            if ready.rank != rank || ready.local_rows != layout.local_rows(rank) {
                anyhow::bail!(
                    "Worker {} ({}) reported rank {} with {} rows, expected rank {} with {} rows",
                    rank,
                    ready.node_id,
                    ready.rank,
                    ready.local_rows,
                    rank,
                    layout.local_rows(rank)
                );
            }

            info!(rank, node_id = %ready.node_id, rows = ready.local_rows, "worker ready");
            links.push(WorkerLink {
                rank,
                node_id: ready.node_id,
                stream,
            });
        }

        Ok(Self {
            parser: CommandParser::new(layout),
            links,
            state: SessionState::Listening,
        })
    }

    pub fn layout(&self) -> &Layout {
        self.parser.layout()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn links(&self) -> &[WorkerLink<S>] {
        &self.links
    }

    /// Run one command line end to end
    ///
    /// Parse and range errors come back as [`Report::Rejected`] and leave the
    /// session usable. Transport failures are returned as errors.
    pub async fn execute_line(&mut self, line: &str) -> Result<Report> {
        if self.state == SessionState::Terminated {
            anyhow::bail!("Session has terminated; no further commands are accepted");
        }

        let parsed = self.parser.parse(line);
        debug!(line, classification = ?Classification::of(&parsed), "parsed command");

        match parsed {
            Err(err) => Ok(Report::Rejected {
                message: err.to_string(),
            }),
            Ok(Parsed::Empty) => Ok(Report::Ignored),
            Ok(Parsed::Special(special)) => self.broadcast(special).await,
            Ok(Parsed::Query(query)) => self.scatter_gather(&query).await,
        }
    }

    /// Send a special operator to every worker and collect the acknowledgments
    async fn broadcast(&mut self, special: SpecialOperator) -> Result<Report> {
        let command = CommandMessage::for_special(special);
        let requests = self.links.iter_mut().map(|link| {
            let command = &command;
            async move { link.request(command).await }
        });
        let replies = try_join_all(requests).await?;

        if special == SpecialOperator::Exit {
            self.state = SessionState::Terminated;
            info!(workers = replies.len(), "all workers acknowledged exit");
        }

        Ok(Report::Acknowledged {
            operator: special.name().to_string(),
            replies,
        })
    }

    /// Dispatch every sub-command concurrently, wait for all, then merge
    async fn scatter_gather(&mut self, query: &Query) -> Result<Report> {
        let commands: Vec<(usize, CommandMessage)> = query
            .sub_commands
            .iter()
            .map(|sub| (sub.rank, CommandMessage::for_operation(query.operation, sub.rows)))
            .collect();

        for (rank, command) in &commands {
            debug!(rank, operator = %command.operator, sub_operator = %command.sub_operator, rows = ?command.rows, "dispatching");
        }

        let requests = self.links.iter_mut().filter_map(|link| {
            let command = commands
                .iter()
                .find(|(rank, _)| *rank == link.rank)
                .map(|(_, command)| command)?;
            Some(async move { link.request(command).await })
        });
        let replies = try_join_all(requests).await?;

        Ok(merge(query.operation, replies))
    }

    /// Read commands from `input` until `exit` or end of input
    ///
    /// End of input without `exit` still shuts the workers down.
    pub async fn run_session<R, W>(&mut self, input: R, out: &mut W, format: OutputFormat) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();

        while let Some(line) = lines.next_line().await.context("Failed to read command")? {
            let report = self.execute_line(&line).await?;
            output::write_report(out, &report, format)?;

            if self.state == SessionState::Terminated {
                return Ok(());
            }
        }

        info!("end of input, shutting down workers");
        let report = self.execute_line(SpecialOperator::Exit.name()).await?;
        output::write_report(out, &report, format)?;

        Ok(())
    }
}

/// Merge per-worker replies (rank order) into one report
pub fn merge(operation: Operation, mut replies: Vec<RankReply>) -> Report {
    if replies.len() == 1 {
        let RankReply { rank, values } = replies.remove(0);
        let failed = is_sentinel_reply(&values);

        return if operation.is_aggregate() {
            Report::Value {
                rank,
                value: values.first().copied().filter(|_| !failed),
            }
        } else {
            Report::Row {
                rank,
                values: (!failed).then_some(values),
            }
        };
    }

    if operation.is_aggregate() {
        let total = replies
            .iter()
            .filter_map(|reply| reply.values.first().copied())
            .filter(|value| !is_sentinel(*value))
            .sum();

        Report::Aggregate {
            ranks: replies.iter().map(|reply| reply.rank).collect(),
            total,
        }
    } else {
        Report::RangeRows { replies }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::local::spawn_local_workers;

    async fn local(rows: usize, cols: usize, workers: usize) -> (Coordinator<tokio::io::DuplexStream>, Vec<tokio::task::JoinHandle<Result<usize>>>) {
        let layout = Layout::new(rows, cols, workers).unwrap();
        let (streams, handles) = spawn_local_workers(&layout);
        let coordinator = Coordinator::handshake(layout, streams).await.unwrap();
        (coordinator, handles)
    }

    #[tokio::test]
    async fn test_handshake_assigns_ranks() {
        let (coordinator, _handles) = local(300, 10, 3).await;
        let ranks: Vec<usize> = coordinator.links().iter().map(|l| l.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
        assert_eq!(coordinator.links()[2].node_id(), "local-2");
        assert_eq!(coordinator.state(), SessionState::Listening);
    }

    #[tokio::test]
    async fn test_aggr_range_across_workers() {
        let (mut coordinator, _handles) = local(300, 10, 3).await;

        let report = coordinator.execute_line("get aggr 150-250").await.unwrap();
        // rank 1 contributes 50 rows of 1s, rank 2 contributes 51 rows of 2s
        assert_eq!(
            report,
            Report::Aggregate {
                ranks: vec![1, 2],
                total: 50 * 10 + 51 * 10 * 2,
            }
        );
    }

    #[tokio::test]
    async fn test_aggregation_is_additive() {
        let (mut coordinator, _handles) = local(100, 4, 7).await;

        let total = match coordinator.execute_line("get aggr all").await.unwrap() {
            Report::Aggregate { total, .. } => total,
            other => panic!("expected aggregate, got {:?}", other),
        };

        let mut sum = 0;
        for row in 0..100 {
            match coordinator.execute_line(&format!("get aggr {}", row)).await.unwrap() {
                Report::Value { value: Some(value), .. } => sum += value,
                other => panic!("expected value, got {:?}", other),
            }
        }
        assert_eq!(total, sum);
    }

    #[tokio::test]
    async fn test_single_row() {
        let (mut coordinator, _handles) = local(10, 3, 2).await;

        assert_eq!(
            coordinator.execute_line("get row 5").await.unwrap(),
            Report::Row { rank: 1, values: Some(vec![1, 1, 1]) }
        );
        assert_eq!(
            coordinator.execute_line("get aggr 4").await.unwrap(),
            Report::Value { rank: 0, value: Some(0) }
        );
    }

    #[tokio::test]
    async fn test_single_worker_range() {
        let (mut coordinator, _handles) = local(10, 2, 2).await;

        assert_eq!(
            coordinator.execute_line("get aggr 5-9").await.unwrap(),
            Report::Value { rank: 1, value: Some(10) }
        );
        assert_eq!(
            coordinator.execute_line("get row 8-9").await.unwrap(),
            Report::Row { rank: 1, values: Some(vec![1, 1, 1, 1]) }
        );
    }

    #[tokio::test]
    async fn test_row_range_across_workers() {
        let (mut coordinator, _handles) = local(6, 2, 3).await;

        let report = coordinator.execute_line("get row 1-4").await.unwrap();
        assert_eq!(
            report,
            Report::RangeRows {
                replies: vec![
                    RankReply { rank: 0, values: vec![0, 0] },
                    RankReply { rank: 1, values: vec![1, 1, 1, 1] },
                    RankReply { rank: 2, values: vec![2, 2] },
                ],
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_commands_are_not_dispatched() {
        let (mut coordinator, _handles) = local(10, 2, 2).await;

        assert_eq!(
            coordinator.execute_line("bogus row 3").await.unwrap(),
            Report::Rejected { message: "operator \"bogus\" is invalid".to_string() }
        );
        assert_eq!(
            coordinator.execute_line("get aggr 9-3").await.unwrap(),
            Report::Rejected { message: "row range start 9 is greater than end 3, valid rows are [0, 9]".to_string() }
        );
        assert_eq!(
            coordinator.execute_line("get row 10").await.unwrap(),
            Report::Rejected { message: "row 10 is out of range, valid rows are [0, 9]".to_string() }
        );
        assert_eq!(coordinator.execute_line("").await.unwrap(), Report::Ignored);

        // the session is still usable
        assert_eq!(
            coordinator.execute_line("get aggr 0").await.unwrap(),
            Report::Value { rank: 0, value: Some(0) }
        );
    }

    #[tokio::test]
    async fn test_exit_terminates_every_worker() {
        let (mut coordinator, handles) = local(10, 2, 3).await;

        let report = coordinator.execute_line("exit").await.unwrap();
        match report {
            Report::Acknowledged { operator, replies } => {
                assert_eq!(operator, "exit");
                assert_eq!(replies.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![0, 1, 2]);
                assert!(replies.iter().all(|r| r.values == vec![-1]));
            }
            other => panic!("expected acknowledgments, got {:?}", other),
        }
        assert_eq!(coordinator.state(), SessionState::Terminated);

        for (rank, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap().unwrap(), rank);
        }

        assert!(coordinator.execute_line("get row 1").await.is_err());
    }

    #[tokio::test]
    async fn test_run_session_stops_at_exit() {
        let (mut coordinator, handles) = local(300, 10, 3).await;

        let input: &[u8] = b"get aggr 150-250\nbogus row 3\n\nexit\nget row 1\n";
        let mut out = Vec::new();
        coordinator.run_session(input, &mut out, OutputFormat::Text).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "aggregate [ranks 1, 2] >> 1520\n\
             error: operator \"bogus\" is invalid\n\
             rank 0 >> exited\n\
             rank 1 >> exited\n\
             rank 2 >> exited\n"
        );
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
    }

    #[tokio::test]
    async fn test_run_session_exits_at_end_of_input() {
        let (mut coordinator, handles) = local(4, 1, 2).await;

        let input: &[u8] = b"get row 3";
        let mut out = Vec::new();
        coordinator.run_session(input, &mut out, OutputFormat::Json).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"kind":"row","rank":1,"values":[1]}"#);
        assert!(lines[1].contains(r#""kind":"acknowledged""#));
        assert_eq!(coordinator.state(), SessionState::Terminated);
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
    }

    #[tokio::test]
    async fn test_handshake_rejects_wrong_stream_count() {
        let layout = Layout::new(10, 2, 3).unwrap();
        let (streams, _handles) = spawn_local_workers(&Layout::new(10, 2, 2).unwrap());
        assert!(Coordinator::handshake(layout, streams).await.is_err());
    }

    #[test]
    fn test_merge_single_worker_sentinel() {
        let report = merge(Operation::GetRow, vec![RankReply { rank: 0, values: vec![-1] }]);
        assert_eq!(report, Report::Row { rank: 0, values: None });

        let report = merge(Operation::GetAggr, vec![RankReply { rank: 0, values: vec![-1] }]);
        assert_eq!(report, Report::Value { rank: 0, value: None });
    }

    #[test]
    fn test_merge_excludes_sentinels_from_sum() {
        let report = merge(
            Operation::GetAggr,
            vec![
                RankReply { rank: 0, values: vec![10] },
                RankReply { rank: 1, values: vec![-1] },
                RankReply { rank: 2, values: vec![-5] },
                RankReply { rank: 3, values: vec![32] },
            ],
        );
        assert_eq!(report, Report::Aggregate { ranks: vec![0, 1, 2, 3], total: 42 });
    }
}
