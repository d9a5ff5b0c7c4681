//! JSON output formatting
//!
//! One JSON object per report, tagged by `kind`:
//!
//! ```text
//! {"kind":"aggregate","ranks":[1,2],"total":1520}
//! ```

use super::Report;
use crate::Result;
use anyhow::Context;

/// Render a report as JSON lines (none for ignored input)
pub fn render(report: &Report) -> Result<Vec<String>> {
    if matches!(report, Report::Ignored) {
        return Ok(Vec::new());
    }

    let line = serde_json::to_string(report).context("Failed to serialize report")?;
    Ok(vec![line])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RankReply;

    #[test]
    fn test_render_aggregate() {
        let lines = render(&Report::Aggregate { ranks: vec![1, 2], total: 1520 }).unwrap();
        assert_eq!(lines, vec![r#"{"kind":"aggregate","ranks":[1,2],"total":1520}"#]);
    }

    #[test]
    fn test_render_error_value() {
        let lines = render(&Report::Value { rank: 0, value: None }).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed["kind"], "value");
        assert_eq!(parsed["rank"], 0);
        assert!(parsed["value"].is_null());
    }

    #[test]
    fn test_render_range_rows() {
        let lines = render(&Report::RangeRows {
            replies: vec![RankReply { rank: 3, values: vec![3, 3] }],
        })
        .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed["kind"], "range_rows");
        assert_eq!(parsed["replies"][0]["rank"], 3);
        assert_eq!(parsed["replies"][0]["values"], serde_json::json!([3, 3]));
    }

    #[test]
    fn test_render_ignored() {
        assert!(render(&Report::Ignored).unwrap().is_empty());
    }
}
