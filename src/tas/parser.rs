//! The SQL statement classifier: normalization, grammar, worker pool.

use std::borrow::Cow;
use std::ops::ControlFlow;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, RecvTimeoutError, Sender};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::ast::{visit_relations, ObjectName, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::ParseError;
use crate::tas::parsed_query::ParsedQuery;

// The grammar rejects a zero-argument DATABASE() in expression position;
// swapping the function name keeps the statement parseable without changing
// which tables it touches.
static DATABASE_FUNCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bDATABASE\s*\(\s*\)").unwrap());

// Multi-column conflict targets are not accepted either; the column list is
// irrelevant for table attribution, so collapse it to its first column.
static MULTI_COLUMN_ON_CONFLICT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bON\s+CONFLICT\s*\(\s*([^,()]+?)\s*(?:,\s*[^,()]+?\s*)+\)").unwrap()
});

/// Rewrites constructs the grammar cannot digest into equivalent-for-our-
/// purposes forms. Returns the input untouched when nothing matches.
fn normalize(sql: &str) -> Cow<'_, str> {
    let pass = DATABASE_FUNCTION.replace_all(sql, "UNSUPPORTED()");
    if let Cow::Owned(rewritten) = MULTI_COLUMN_ON_CONFLICT.replace_all(&pass, "ON CONFLICT ($1)") {
        return Cow::Owned(rewritten);
    }
    pass
}

fn operation_name(statement: &Statement) -> &'static str {
    match statement {
        Statement::Query { .. } => "select",
        Statement::Insert { .. } => "insert",
        Statement::Update { .. } => "update",
        Statement::Delete { .. } => "delete",
        Statement::Merge { .. } => "merge",
        Statement::Truncate { .. } => "truncate",
        Statement::CreateTable { .. }
        | Statement::CreateView { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. } => "create",
        Statement::AlterTable { .. } | Statement::AlterIndex { .. } => "alter",
        Statement::Drop { .. } => "drop",
        _ => "other",
    }
}

fn table_name(relation: &ObjectName) -> String {
    relation
        .0
        .iter()
        .map(|ident| ident.value.to_lowercase())
        .collect::<Vec<_>>()
        .join(".")
}

fn parse_and_analyze(sql: &str) -> Result<ParsedQuery, ParseError> {
    let statements = Parser::parse_sql(&GenericDialect {}, sql)?;

    let mut parsed = ParsedQuery::new();
    for statement in &statements {
        let operation = operation_name(statement);
        let _: ControlFlow<()> = visit_relations(statement, |relation| {
            parsed.add_table(operation, table_name(relation));
            ControlFlow::Continue(())
        });
    }
    Ok(parsed)
}

struct ParseJob {
    sql: String,
    reply: Sender<Result<ParsedQuery, ParseError>>,
}

/// Classifies SQL texts on a small worker pool.
///
/// Running parses on workers lets the caller abandon a parse that exceeds
/// its timeout; the worker itself is not interrupted and discards the
/// result once it finishes, since the reply channel is gone by then.
pub struct SqlParser {
    jobs: Sender<ParseJob>,
}

impl SqlParser {
    pub fn new(worker_threads: usize) -> Self {
        let (jobs, queue) = unbounded::<ParseJob>();
        for _ in 0..worker_threads.max(1) {
            let queue = queue.clone();
            std::thread::spawn(move || {
                while let Ok(job) = queue.recv() {
                    let result = parse_and_analyze(&job.sql);
                    // The caller may have timed out and walked away.
                    let _ = job.reply.send(result);
                }
            });
        }
        Self { jobs }
    }

    /// Normalize and classify `sql`, waiting at most `timeout`.
    pub fn parse(&self, sql: &str, timeout: Duration) -> Result<ParsedQuery, ParseError> {
        let (reply, result) = bounded(1);
        let job = ParseJob {
            sql: normalize(sql).into_owned(),
            reply,
        };
        if self.jobs.send(job).is_err() {
            return Err(ParseError::WorkersUnavailable);
        }
        match result.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(ParseError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(ParseError::WorkersUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn tables_of<'a>(parsed: &'a ParsedQuery, operation: &str) -> Vec<&'a str> {
        parsed
            .operations()
            .find(|(op, _)| *op == operation)
            .map(|(_, op)| op.tables().iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_select_with_joins_lists_tables_in_first_seen_order() {
        let parser = SqlParser::new(1);
        let parsed = parser
            .parse(
                "select a.id from table_b b join table_a a on a.id = b.a_id \
                 left join table_c c on c.id = a.c_id",
                TIMEOUT,
            )
            .unwrap();

        assert_eq!(tables_of(&parsed, "select"), vec!["table_b", "table_a", "table_c"]);
        assert_eq!(parsed.table_access_count(), 3);
    }

    #[test]
    fn test_operations_are_classified_by_statement_kind() {
        let parser = SqlParser::new(1);

        let parsed = parser
            .parse("update table_a set version = version + 1", TIMEOUT)
            .unwrap();
        assert_eq!(tables_of(&parsed, "update"), vec!["table_a"]);

        let parsed = parser
            .parse("insert into table_b (id) values (1)", TIMEOUT)
            .unwrap();
        assert_eq!(tables_of(&parsed, "insert"), vec!["table_b"]);

        let parsed = parser.parse("delete from table_c where id = 1", TIMEOUT).unwrap();
        assert_eq!(tables_of(&parsed, "delete"), vec!["table_c"]);
    }

    #[test]
    fn test_subqueries_count_toward_the_outer_operation() {
        let parser = SqlParser::new(1);
        let parsed = parser
            .parse(
                "update table_a set b_id = (select id from table_b where x = 1)",
                TIMEOUT,
            )
            .unwrap();

        let mut all: Vec<&str> = parsed
            .operations()
            .flat_map(|(_, op)| op.tables().iter().map(String::as_str))
            .collect();
        all.sort_unstable();
        assert_eq!(all, vec!["table_a", "table_b"]);
    }

    #[test]
    fn test_qualified_names_are_joined_and_lowercased() {
        let parser = SqlParser::new(1);
        let parsed = parser
            .parse("select * from Accounting.Ledger", TIMEOUT)
            .unwrap();
        assert_eq!(tables_of(&parsed, "select"), vec!["accounting.ledger"]);
    }

    #[test]
    fn test_database_function_is_rewritten_before_parsing() {
        assert_eq!(
            normalize("select id, database() from table_a"),
            "select id, UNSUPPORTED() from table_a"
        );

        let parser = SqlParser::new(1);
        let parsed = parser
            .parse("select id, database() from table_a", TIMEOUT)
            .unwrap();
        assert_eq!(tables_of(&parsed, "select"), vec!["table_a"]);
    }

    #[test]
    fn test_multi_column_conflict_target_collapses() {
        assert_eq!(
            normalize("insert into t (a, b) values (1, 2) on conflict (a, b) do nothing"),
            "insert into t (a, b) values (1, 2) ON CONFLICT (a) do nothing"
        );
        // A single-column target stays untouched.
        assert_eq!(
            normalize("insert into t (a) values (1) on conflict (a) do nothing"),
            "insert into t (a) values (1) on conflict (a) do nothing"
        );
    }

    #[test]
    fn test_invalid_sql_is_a_syntax_error() {
        let parser = SqlParser::new(1);
        let result = parser.parse("definitely not sql", TIMEOUT);
        assert!(matches!(result, Err(ParseError::Syntax(_))));
    }

    #[test]
    fn test_parse_times_out_while_the_worker_is_busy() {
        let parser = SqlParser::new(1);

        // Pin the only worker: a zero-capacity reply channel blocks it in
        // the reply send until we drain it.
        let (reply, gate) = bounded(0);
        parser
            .jobs
            .send(ParseJob {
                sql: "select 1".to_string(),
                reply,
            })
            .unwrap();

        let result = parser.parse("select * from table_a", Duration::from_millis(20));
        assert!(matches!(result, Err(ParseError::Timeout(_))));

        // Release the worker; it discards the abandoned result and recovers.
        gate.recv().unwrap().unwrap();
        let parsed = parser.parse("select * from table_a", TIMEOUT).unwrap();
        assert_eq!(tables_of(&parsed, "select"), vec!["table_a"]);
    }

    #[test]
    fn test_statement_without_tables_is_empty() {
        let parser = SqlParser::new(1);
        let parsed = parser.parse("commit", TIMEOUT).unwrap();
        assert!(parsed.is_empty());
    }
}
