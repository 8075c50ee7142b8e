// SPDX-License-Identifier: PMPL-1.0-or-later
//! Query error types.

use thiserror::Error;

/// Errors raised while compiling WHERE or ORDER BY text.
///
/// Evaluation itself never fails: a missing field or argument simply makes
/// the comparison false.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("parse error at byte {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("unexpected end of input: {0}")]
    UnexpectedEnd(String),

    #[error("expected {expected} positional arguments, got {got}")]
    ArgumentCount { expected: usize, got: usize },

    #[error("invalid order by clause '{0}'")]
    InvalidOrderBy(String),

    #[error("unknown field type: {0}")]
    UnknownType(String),
}

impl QueryError {
    pub(crate) fn parse(offset: usize, message: impl Into<String>) -> Self {
        QueryError::Parse {
            offset,
            message: message.into(),
        }
    }
}
