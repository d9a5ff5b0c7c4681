//! Row partitioning
//!
//! Maps global row indices onto the worker that owns them and splits global
//! row ranges into per-worker sub-ranges in local coordinates.
//!
//! # Layout
//!
//! With `N` rows and `W` workers every worker holds `N1 = ceil(N / W)` rows,
//! except the last populated worker, which holds the remainder:
//!
//! ```text
//! N = 300, W = 3  =>  N1 = 100
//!
//!   worker 0: global rows   0..100
//!   worker 1: global rows 100..200
//!   worker 2: global rows 200..300
//! ```
//!
//! User-facing ranges are inclusive (`150-250`). Internally every sub-range is
//! half-open (`[start, end)`), so a range ending exactly on a band boundary
//! never pulls in the next worker.
//!
//! # Example
//!
//! ```
//! use rowshard::partition::{Layout, LocalRows};
//!
//! let layout = Layout::new(300, 10, 3).unwrap();
//! let subs = layout.split_range(150, 250).unwrap();
//!
//! assert_eq!(subs.len(), 2);
//! assert_eq!(subs[0].rank, 1);
//! assert_eq!(subs[0].rows, LocalRows::Range { start: 50, end: 100 });
//! assert_eq!(subs[1].rank, 2);
//! assert_eq!(subs[1].rows, LocalRows::Range { start: 0, end: 51 });
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// Invalid layout dimensions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("row count must be at least 1")]
    NoRows,

    #[error("column count must be at least 1")]
    NoColumns,

    #[error("worker count must be at least 1")]
    NoWorkers,
}

/// A row or row range that cannot be routed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("row {row} is out of range, valid rows are [0, {max}]")]
    RowOutOfRange { row: usize, max: usize },

    #[error("row range {start}-{end} is out of range, valid rows are [0, {max}]")]
    RangeOutOfRange { start: usize, end: usize, max: usize },

    #[error("row range start {start} is greater than end {end}, valid rows are [0, {max}]")]
    NegativeRange { start: usize, end: usize, max: usize },
}

/// Rows addressed on a single worker, in that worker's local coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalRows {
    /// One local row
    Single(usize),

    /// Half-open local row range `[start, end)`
    Range { start: usize, end: usize },
}

impl fmt::Display for LocalRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalRows::Single(row) => write!(f, "{}", row),
            LocalRows::Range { start, end } => write!(f, "[{}, {})", start, end),
        }
    }
}

/// One worker's share of a routed command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubCommand {
    /// Worker that owns the rows
    pub rank: usize,

    /// Rows on that worker
    pub rows: LocalRows,
}

/// Partition layout of the global matrix
///
/// Carries the routing constants (`N`, `M`, `W`, `N1`) explicitly; nothing in
/// the crate reads them from globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    rows: usize,
    cols: usize,
    workers: usize,
    rows_per_worker: usize,
}

impl Layout {
    /// Create a layout for `rows x cols` spread over `workers` workers
    pub fn new(rows: usize, cols: usize, workers: usize) -> Result<Self, LayoutError> {
        if rows == 0 {
            return Err(LayoutError::NoRows);
        }
        if cols == 0 {
            return Err(LayoutError::NoColumns);
        }
        if workers == 0 {
            return Err(LayoutError::NoWorkers);
        }

        Ok(Self {
            rows,
            cols,
            workers,
            rows_per_worker: rows.div_ceil(workers),
        })
    }

    /// Global row count (`N`)
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Column count (`M`)
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Worker count (`W`)
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Nominal rows per worker (`N1 = ceil(N / W)`)
    pub fn rows_per_worker(&self) -> usize {
        self.rows_per_worker
    }

    /// Highest valid global row
    pub fn max_row(&self) -> usize {
        self.rows - 1
    }

    /// Number of rows actually held by `rank`
    ///
    /// `N1` for every worker but the last populated one. When `W` does not
    /// divide `N` evenly enough, trailing workers may hold zero rows.
    pub fn local_rows(&self, rank: usize) -> usize {
        if rank >= self.workers {
            return 0;
        }
        self.rows
            .saturating_sub(rank * self.rows_per_worker)
            .min(self.rows_per_worker)
    }

    /// Global rows owned by `rank`, half-open
    pub fn band(&self, rank: usize) -> Range<usize> {
        let start = (rank * self.rows_per_worker).min(self.rows);
        start..start + self.local_rows(rank)
    }

    /// Worker owning global `row`
    ///
    /// `floor(row / N1)` clamped to the last worker.
    pub fn owner_of(&self, row: usize) -> usize {
        (row / self.rows_per_worker).min(self.workers - 1)
    }

    /// Local index of global `row` on `rank`, or `None` when `rank` does not hold it
    pub fn local_index(&self, row: usize, rank: usize) -> Option<usize> {
        let local = row.checked_sub(rank * self.rows_per_worker)?;
        (local < self.local_rows(rank)).then_some(local)
    }

    /// Global row for `local` on `rank`
    pub fn global_row(&self, rank: usize, local: usize) -> usize {
        rank * self.rows_per_worker + local
    }

    /// Check that `row` lies within `[0, N-1]`
    pub fn check_row(&self, row: usize) -> Result<(), RangeError> {
        if row >= self.rows {
            return Err(RangeError::RowOutOfRange {
                row,
                max: self.max_row(),
            });
        }
        Ok(())
    }

    /// Route a single global row to its owner
    pub fn route_row(&self, row: usize) -> Result<SubCommand, RangeError> {
        self.check_row(row)?;

        let rank = self.owner_of(row);
        let local = self
            .local_index(row, rank)
            .ok_or(RangeError::RowOutOfRange {
                row,
                max: self.max_row(),
            })?;

        Ok(SubCommand {
            rank,
            rows: LocalRows::Single(local),
        })
    }

    /// Split the inclusive global range `[start, end]` into per-worker sub-ranges
    ///
    /// Returns one entry per intersected worker in ascending rank order. The
    /// entries are contiguous, non-overlapping and together cover the range.
    pub fn split_range(&self, start: usize, end: usize) -> Result<Vec<SubCommand>, RangeError> {
        if start >= self.rows || end >= self.rows {
            return Err(RangeError::RangeOutOfRange {
                start,
                end,
                max: self.max_row(),
            });
        }
        if start > end {
            return Err(RangeError::NegativeRange {
                start,
                end,
                max: self.max_row(),
            });
        }

        let end_exclusive = end + 1;
        let first = self.owner_of(start);
        let last = self.owner_of(end);

        let subs = (first..=last)
            .filter_map(|rank| {
                let band = self.band(rank);
                let lo = start.max(band.start);
                let hi = end_exclusive.min(band.end);
                (lo < hi).then(|| SubCommand {
                    rank,
                    rows: LocalRows::Range {
                        start: lo - band.start,
                        end: hi - band.start,
                    },
                })
            })
            .collect();

        Ok(subs)
    }
}
