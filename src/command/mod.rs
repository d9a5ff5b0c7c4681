//! Command parsing
//!
//! Turns one line of user input into a classified request. The parser never
//! touches partition data; it only consults the [`Layout`] to validate rows
//! and to route them to workers.
//!
//! # Grammar
//!
//! ```text
//! <operator> <sub_operator> <row>
//! <operator> <sub_operator> <row_start>-<row_end>
//! <operator> <sub_operator> all
//! <special_operator>
//! ```
//!
//! Tokens are separated by a single space and matched case-insensitively.
//! Ranges are inclusive on both ends.
//!
//! # Classification
//!
//! Outcomes are checked in this order: empty operator, special operator,
//! invalid operator/sub-operator/row token, row out of range, reversed range,
//! success. See [`Classification`].

use crate::partition::{Layout, RangeError, SubCommand};
use thiserror::Error;

/// Row-addressed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `get row`: the values of one row (or of every row in a range)
    GetRow,

    /// `get aggr`: the sum of one row (or of every row in a range)
    GetAggr,
}

/// Operator with no row argument, broadcast to every worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialOperator {
    /// Terminate every worker and then the coordinator
    Exit,
}

/// Dispatch table for row-addressed operations
const OPERATIONS: &[(&str, &str, Operation)] = &[
    ("get", "row", Operation::GetRow),
    ("get", "aggr", Operation::GetAggr),
];

/// Dispatch table for special operators
const SPECIAL_OPERATORS: &[(&str, SpecialOperator)] = &[("exit", SpecialOperator::Exit)];

/// Row token meaning "every row"
const ALL_ROWS: &str = "all";

impl Operation {
    /// Look up an operation by its (lower-case) operator and sub-operator
    pub fn resolve(operator: &str, sub_operator: &str) -> Option<Self> {
        OPERATIONS
            .iter()
            .find(|(op, sub, _)| *op == operator && *sub == sub_operator)
            .map(|(_, _, operation)| *operation)
    }

    /// Whether `operator` names any row-addressed operation
    pub fn is_operator(operator: &str) -> bool {
        OPERATIONS.iter().any(|(op, _, _)| *op == operator)
    }

    pub fn operator(&self) -> &'static str {
        self.names().0
    }

    pub fn sub_operator(&self) -> &'static str {
        self.names().1
    }

    fn names(&self) -> (&'static str, &'static str) {
        OPERATIONS
            .iter()
            .find(|(_, _, operation)| operation == self)
            .map(|(op, sub, _)| (*op, *sub))
            .unwrap_or(("", ""))
    }

    /// Whether each worker answers with a single scalar rather than row values
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Operation::GetAggr)
    }
}

impl SpecialOperator {
    /// Look up a special operator by its (lower-case) name
    pub fn resolve(operator: &str) -> Option<Self> {
        SPECIAL_OPERATORS
            .iter()
            .find(|(name, _)| *name == operator)
            .map(|(_, special)| *special)
    }

    pub fn name(&self) -> &'static str {
        SPECIAL_OPERATORS
            .iter()
            .find(|(_, special)| special == self)
            .map(|(name, _)| *name)
            .unwrap_or("")
    }
}

/// Global rows addressed by a command, as typed by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSpan {
    Single(usize),

    /// Inclusive global range
    Range { start: usize, end: usize },
}

/// A validated, routed row-addressed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub operation: Operation,
    pub span: RowSpan,

    /// Per-worker sub-commands in ascending rank order
    pub sub_commands: Vec<SubCommand>,
}

impl Query {
    /// Whether more than one worker is involved
    pub fn spans_workers(&self) -> bool {
        self.sub_commands.len() > 1
    }
}

/// Successfully parsed line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// Empty operator token; the line is ignored
    Empty,

    /// Special operator to broadcast to every worker
    Special(SpecialOperator),

    /// Routed row-addressed command
    Query(Query),
}

/// Command rejected by the parser
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("operator \"{operator}\" is invalid")]
    InvalidOperator { operator: String },

    #[error("sub operator \"{sub_operator}\" is invalid for operator \"{operator}\"")]
    InvalidSubOperator { operator: String, sub_operator: String },

    #[error("operator \"{operator} {sub_operator}\" requires a row index")]
    MissingRow { operator: String, sub_operator: String },

    #[error("failed to parse row index \"{token}\"")]
    InvalidRow { token: String },

    #[error(transparent)]
    Range(#[from] RangeError),
}

/// Mutually exclusive parse outcomes, in evaluation priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    EmptyOperator,
    SpecialOperator,
    InvalidOperator,
    RowOutOfRange,
    NegativeRange,
    Success,
}

impl Classification {
    /// Classify a parse result
    pub fn of(result: &Result<Parsed, CommandError>) -> Self {
        match result {
            Ok(Parsed::Empty) => Classification::EmptyOperator,
            Ok(Parsed::Special(_)) => Classification::SpecialOperator,
            Ok(Parsed::Query(_)) => Classification::Success,
            Err(CommandError::Range(RangeError::NegativeRange { .. })) => {
                Classification::NegativeRange
            }
            Err(CommandError::Range(_)) => Classification::RowOutOfRange,
            Err(_) => Classification::InvalidOperator,
        }
    }
}

/// Parser bound to one partition layout
#[derive(Debug, Clone)]
pub struct CommandParser {
    layout: Layout,
}

impl CommandParser {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Parse and route one command line
    pub fn parse(&self, line: &str) -> Result<Parsed, CommandError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut tokens = line.split(' ');

        let operator = tokens.next().unwrap_or("").to_lowercase();
        if operator.is_empty() {
            return Ok(Parsed::Empty);
        }

        if let Some(special) = SpecialOperator::resolve(&operator) {
            return Ok(Parsed::Special(special));
        }

        if !Operation::is_operator(&operator) {
            return Err(CommandError::InvalidOperator { operator });
        }

        let sub_operator = tokens.next().unwrap_or("").to_lowercase();
        let operation = Operation::resolve(&operator, &sub_operator).ok_or_else(|| {
            CommandError::InvalidSubOperator {
                operator: operator.clone(),
                sub_operator: sub_operator.clone(),
            }
        })?;

        let row_token = match tokens.next() {
            Some(token) if !token.is_empty() => token,
            _ => {
                return Err(CommandError::MissingRow {
                    operator,
                    sub_operator,
                })
            }
        };

        let span = self.parse_span(row_token)?;
        let sub_commands = match span {
            RowSpan::Single(row) => vec![self.layout.route_row(row)?],
            RowSpan::Range { start, end } => self.layout.split_range(start, end)?,
        };

        Ok(Parsed::Query(Query {
            operation,
            span,
            sub_commands,
        }))
    }

    fn parse_span(&self, token: &str) -> Result<RowSpan, CommandError> {
        if token.eq_ignore_ascii_case(ALL_ROWS) {
            return Ok(RowSpan::Range {
                start: 0,
                end: self.layout.max_row(),
            });
        }

        match token.split_once('-') {
            Some((start, end)) => Ok(RowSpan::Range {
                start: parse_row(start)?,
                end: parse_row(end)?,
            }),
            None => Ok(RowSpan::Single(parse_row(token)?)),
        }
    }
}

fn parse_row(token: &str) -> Result<usize, CommandError> {
    // usize parsing accepts a leading '+', which is not part of the grammar
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CommandError::InvalidRow {
            token: token.to_string(),
        });
    }
    token.parse().map_err(|_| CommandError::InvalidRow {
        token: token.to_string(),
    })
}
