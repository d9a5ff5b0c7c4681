//! Command results and their rendering
//!
//! The coordinator turns every input line into a [`Report`]; the submodules
//! render reports as text or JSON lines.

pub mod json;
pub mod text;

use crate::config::OutputFormat;
use serde::Serialize;
use std::io::Write;

/// One worker's reply, tagged with its rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankReply {
    pub rank: usize,
    pub values: Vec<i64>,
}

/// User-visible outcome of one command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Report {
    /// Empty line, nothing to show
    Ignored,

    /// Command rejected before dispatch
    Rejected { message: String },

    /// Acknowledgments of a broadcast special operator, in rank order
    Acknowledged { operator: String, replies: Vec<RankReply> },

    /// Scalar from a single worker; `None` when the worker reported an error
    Value { rank: usize, value: Option<i64> },

    /// Row values from a single worker; `None` when the worker reported an error
    Row { rank: usize, values: Option<Vec<i64>> },

    /// Sum of the scalars of several workers, error sentinels excluded
    Aggregate { ranks: Vec<usize>, total: i64 },

    /// Row values from several workers, in rank order
    RangeRows { replies: Vec<RankReply> },
}

/// Write `report` to `out` in the requested format
pub fn write_report<W: Write>(out: &mut W, report: &Report, format: OutputFormat) -> crate::Result<()> {
    let lines = match format {
        OutputFormat::Text => text::render(report),
        OutputFormat::Json => json::render(report)?,
    };

    for line in lines {
        writeln!(out, "{}", line)?;
    }
    out.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_report_text() {
        let mut out = Vec::new();
        write_report(&mut out, &Report::Value { rank: 1, value: Some(42) }, OutputFormat::Text)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "rank 1 >> 42\n");
    }

    #[test]
    fn test_write_ignored_report() {
        let mut out = Vec::new();
        write_report(&mut out, &Report::Ignored, OutputFormat::Text).unwrap();
        write_report(&mut out, &Report::Ignored, OutputFormat::Json).unwrap();
        assert!(out.is_empty());
    }
}
