//! Error taxonomy for the SQL statement classifier.

use std::time::Duration;

use thiserror::Error;

/// Why a SQL text could not be classified.
///
/// A parse failure never reaches the instrumented statement: the classifier
/// resolves it to an empty [`ParsedQuery`](crate::tas::ParsedQuery), counts
/// it and logs it. The error type exists so the parser internals stay
/// honest about what went wrong.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// The parse did not finish within the configured timeout and its
    /// result was abandoned.
    #[error("sql parsing timed out after {0:?}")]
    Timeout(Duration),

    /// The parser worker pool is gone, typically during shutdown.
    #[error("sql parser workers are unavailable")]
    WorkersUnavailable,

    /// The grammar rejected the statement.
    #[error(transparent)]
    Syntax(#[from] sqlparser::parser::ParserError),
}
