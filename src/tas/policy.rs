//! Pre-parse policies deciding what gets classified at all.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::tas::parsed_query::ParsedQuery;

/// Outcome of asking a policy about a SQL text, before any parsing happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// No opinion, ask the next policy or parse.
    Continue,
    /// Do not classify and do not count this statement at all.
    Skip,
    /// Use this classification instead of parsing.
    Substitute(ParsedQuery),
}

/// A pluggable gate in front of the parser. Policies run in registration
/// order; the first non-[`PolicyDecision::Continue`] answer wins.
pub trait QueryParsingPolicy: Send + Sync {
    fn evaluate(&self, sql: &str) -> PolicyDecision;
}

static NON_TABLE_STATEMENTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^(set\s+\w+\s+to\s+.*|explain\s.*|show\s+databases\b.*)$")
        .unwrap()
});

/// Skips session chatter that touches no tables and routinely trips SQL
/// grammars: `SET ... TO ...`, `EXPLAIN ...` and `SHOW DATABASES`.
#[derive(Debug, Default)]
pub struct DefaultQueryParsingPolicy;

impl QueryParsingPolicy for DefaultQueryParsingPolicy {
    fn evaluate(&self, sql: &str) -> PolicyDecision {
        if NON_TABLE_STATEMENTS.is_match(sql.trim()) {
            PolicyDecision::Skip
        } else {
            PolicyDecision::Continue
        }
    }
}
