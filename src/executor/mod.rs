//! Worker-side command execution
//!
//! A [`WorkerExecutor`] owns one worker's band of the matrix and answers
//! sub-commands that the coordinator has already routed into local row
//! coordinates. It knows nothing about other workers.
//!
//! Every answer is a sequence of integers. A worker that cannot satisfy a
//! sub-command answers with the one-element sentinel sequence `[-1]` and logs
//! the reason locally; there is no separate error channel back to the
//! coordinator.
//!
//! # Example
//!
//! ```
//! use rowshard::executor::WorkerExecutor;
//! use rowshard::distributed::protocol::CommandMessage;
//! use rowshard::partition::LocalRows;
//!
//! let executor = WorkerExecutor::new(2, 4, 3);
//! let command = CommandMessage::new("get", "aggr", LocalRows::Single(1));
//!
//! let execution = executor.execute(&command);
//! assert_eq!(execution.values, vec![6]);
//! assert!(!execution.terminate);
//! ```

use crate::command::{Operation, SpecialOperator};
use crate::distributed::protocol::CommandMessage;
use crate::partition::LocalRows;
use tracing::{trace, warn};

/// Value a worker returns in place of a result when it cannot execute a command
pub const ERROR_SENTINEL: i64 = -1;

/// Whether `value` is an error sentinel
///
/// Anything at or below `-1` counts as an error report.
pub fn is_sentinel(value: i64) -> bool {
    value <= ERROR_SENTINEL
}

/// Whether a whole reply is a sentinel report
pub fn is_sentinel_reply(values: &[i64]) -> bool {
    matches!(values, [value] if is_sentinel(*value))
}

/// Dense `rows x cols` band of the global matrix, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    rows: usize,
    cols: usize,
    data: Vec<i64>,
}

impl Partition {
    /// Allocate a partition with every cell set to `value`
    pub fn filled(rows: usize, cols: usize, value: i64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Values of local `row`
    pub fn row(&self, row: usize) -> Option<&[i64]> {
        if row >= self.rows {
            return None;
        }
        let offset = row * self.cols;
        Some(&self.data[offset..offset + self.cols])
    }

    /// Values of local rows `[start, end)`, concatenated
    pub fn rows_in(&self, start: usize, end: usize) -> Option<&[i64]> {
        if start > end || end > self.rows {
            return None;
        }
        Some(&self.data[start * self.cols..end * self.cols])
    }
}

/// Result of executing one sub-command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Reply values sent back to the coordinator
    pub values: Vec<i64>,

    /// Whether the worker's receive loop must stop after replying
    pub terminate: bool,
}

impl Execution {
    fn reply(values: Vec<i64>) -> Self {
        Self {
            values,
            terminate: false,
        }
    }

    fn sentinel() -> Self {
        Self::reply(vec![ERROR_SENTINEL])
    }
}

/// Executes sub-commands against one worker's partition
#[derive(Debug, Clone)]
pub struct WorkerExecutor {
    rank: usize,
    partition: Partition,
}

impl WorkerExecutor {
    /// Create the executor for `rank`, holding `rows x cols` placeholder values
    ///
    /// Every cell is filled with the worker's own rank.
    pub fn new(rank: usize, rows: usize, cols: usize) -> Self {
        Self {
            rank,
            partition: Partition::filled(rows, cols, rank as i64),
        }
    }

    /// Create an executor over an existing partition
    pub fn with_partition(rank: usize, partition: Partition) -> Self {
        Self { rank, partition }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Execute one sub-command
    ///
    /// Never fails: unknown operators and out-of-band rows produce the sentinel.
    pub fn execute(&self, command: &CommandMessage) -> Execution {
        let operator = command.operator.to_lowercase();
        let sub_operator = command.sub_operator.to_lowercase();

        if let Some(special) = SpecialOperator::resolve(&operator) {
            return self.execute_special(special);
        }

        let Some(operation) = Operation::resolve(&operator, &sub_operator) else {
            warn!(
                rank = self.rank,
                "operator \"{} {}\" is invalid",
                command.operator,
                command.sub_operator
            );
            return Execution::sentinel();
        };

        let Some(rows) = command.rows else {
            warn!(rank = self.rank, "operator \"{} {}\" requires rows", operator, sub_operator);
            return Execution::sentinel();
        };

        trace!(rank = self.rank, ?operation, %rows, "executing");

        match (operation, rows) {
            (Operation::GetRow, LocalRows::Single(row)) => self.get_row(row),
            (Operation::GetAggr, LocalRows::Single(row)) => self.get_aggr(row),
            (Operation::GetRow, LocalRows::Range { start, end }) => self.get_row_range(start, end),
            (Operation::GetAggr, LocalRows::Range { start, end }) => {
                self.get_aggr_range(start, end)
            }
        }
    }

    fn execute_special(&self, special: SpecialOperator) -> Execution {
        match special {
            SpecialOperator::Exit => Execution {
                values: vec![ERROR_SENTINEL],
                terminate: true,
            },
        }
    }

    fn get_row(&self, row: usize) -> Execution {
        match self.partition.row(row) {
            Some(values) => Execution::reply(values.to_vec()),
            None => self.row_out_of_range(row),
        }
    }

    fn get_aggr(&self, row: usize) -> Execution {
        match self.partition.row(row) {
            Some(values) => Execution::reply(vec![values.iter().sum()]),
            None => self.row_out_of_range(row),
        }
    }

    fn get_row_range(&self, start: usize, end: usize) -> Execution {
        match self.partition.rows_in(start, end) {
            Some(values) => Execution::reply(values.to_vec()),
            None => self.range_out_of_range(start, end),
        }
    }

    fn get_aggr_range(&self, start: usize, end: usize) -> Execution {
        match self.partition.rows_in(start, end) {
            Some(values) => Execution::reply(vec![values.iter().sum()]),
            None => self.range_out_of_range(start, end),
        }
    }

    fn row_out_of_range(&self, row: usize) -> Execution {
        warn!(
            rank = self.rank,
            "error: row {} is out of range for this worker, valid local rows are [0, {})",
            row,
            self.partition.rows()
        );
        Execution::sentinel()
    }

    fn range_out_of_range(&self, start: usize, end: usize) -> Execution {
        warn!(
            rank = self.rank,
            "error: rows [{}, {}) are out of range for this worker, valid local rows are [0, {})",
            start,
            end,
            self.partition.rows()
        );
        Execution::sentinel()
    }
}
