//! Human-readable text output
//!
//! ```text
//! rank 1 >> 500
//! rank 0 >> { 0, 0, 0 }
//! aggregate [ranks 1, 2] >> 1520
//! range result:
//! rank 0 >> { 0, 0 }
//! rank 1 >> { 1, 1 }
//! error: operator "bogus" is invalid
//! ```

use super::{RankReply, Report};
use crate::executor::is_sentinel_reply;

/// Render a report as output lines
///
/// Worker error sentinels render as nothing; the worker has already logged
/// the failure itself.
pub fn render(report: &Report) -> Vec<String> {
    match report {
        Report::Ignored => Vec::new(),
        Report::Rejected { message } => vec![format!("error: {}", message)],
        Report::Acknowledged { operator, replies } => replies
            .iter()
            .map(|reply| format!("rank {} >> {}", reply.rank, acknowledgment(operator)))
            .collect(),
        Report::Value { rank, value } => value
            .map(|value| format!("rank {} >> {}", rank, value))
            .into_iter()
            .collect(),
        Report::Row { rank, values } => values
            .as_ref()
            .map(|values| format!("rank {} >> {}", rank, format_values(values)))
            .into_iter()
            .collect(),
        Report::Aggregate { ranks, total } => vec![format!(
            "aggregate [ranks {}] >> {}",
            ranks
                .iter()
                .map(|rank| rank.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            total
        )],
        Report::RangeRows { replies } => {
            let mut lines = vec!["range result:".to_string()];
            lines.extend(
                replies
                    .iter()
                    .filter(|reply| !is_sentinel_reply(&reply.values))
                    .map(format_reply),
            );
            lines
        }
    }
}

/// Format a sequence as `{ v1, v2, ... }`
pub fn format_values(values: &[i64]) -> String {
    if values.is_empty() {
        return "{ }".to_string();
    }
    let joined = values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{ {} }}", joined)
}

fn format_reply(reply: &RankReply) -> String {
    format!("rank {} >> {}", reply.rank, format_values(&reply.values))
}

fn acknowledgment(operator: &str) -> String {
    match operator {
        "exit" => "exited".to_string(),
        other => format!("{} acknowledged", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_values() {
        assert_eq!(format_values(&[1, 2, 3]), "{ 1, 2, 3 }");
        assert_eq!(format_values(&[7]), "{ 7 }");
        assert_eq!(format_values(&[]), "{ }");
    }

    #[test]
    fn test_render_single_worker() {
        assert_eq!(
            render(&Report::Value { rank: 2, value: Some(1020) }),
            vec!["rank 2 >> 1020"]
        );
        assert_eq!(
            render(&Report::Row { rank: 0, values: Some(vec![0, 0]) }),
            vec!["rank 0 >> { 0, 0 }"]
        );
    }

    #[test]
    fn test_render_suppresses_sentinels() {
        assert!(render(&Report::Value { rank: 0, value: None }).is_empty());
        assert!(render(&Report::Row { rank: 0, values: None }).is_empty());

        let lines = render(&Report::RangeRows {
            replies: vec![
                RankReply { rank: 0, values: vec![-1] },
                RankReply { rank: 1, values: vec![1, 1] },
            ],
        });
        assert_eq!(lines, vec!["range result:", "rank 1 >> { 1, 1 }"]);
    }

    #[test]
    fn test_render_aggregate() {
        let lines = render(&Report::Aggregate { ranks: vec![1, 2], total: 1520 });
        assert_eq!(lines, vec!["aggregate [ranks 1, 2] >> 1520"]);
    }

    #[test]
    fn test_render_range_rows_in_rank_order() {
        let lines = render(&Report::RangeRows {
            replies: vec![
                RankReply { rank: 0, values: vec![0, 0] },
                RankReply { rank: 1, values: vec![1, 1] },
            ],
        });
        assert_eq!(lines, vec!["range result:", "rank 0 >> { 0, 0 }", "rank 1 >> { 1, 1 }"]);
    }

    #[test]
    fn test_render_acknowledgments_and_errors() {
        let lines = render(&Report::Acknowledged {
            operator: "exit".to_string(),
            replies: vec![
                RankReply { rank: 0, values: vec![-1] },
                RankReply { rank: 1, values: vec![-1] },
            ],
        });
        assert_eq!(lines, vec!["rank 0 >> exited", "rank 1 >> exited"]);

        let lines = render(&Report::Rejected {
            message: "operator \"bogus\" is invalid".to_string(),
        });
        assert_eq!(lines, vec!["error: operator \"bogus\" is invalid"]);
        assert!(render(&Report::Ignored).is_empty());
    }
}
