//! Driver event handler feeding the per-context accumulators.

use std::sync::Arc;

use crate::context::Context;
use crate::das::stats::DatabaseAccessStats;
use crate::das::unknown::UnknownCalls;
use crate::das::{StatsMap, DAS_CONTEXT_KEY};
use crate::events::{
    ConnectionCloseEvent, ConnectionCloseFailureEvent, ConnectionListener, ConnectionOpenEvent,
    DataSourceListener, RowsFetchedEvent, StatementExecuteEvent, StatementExecuteFailureEvent,
    TransactionBeginEvent, TransactionCommitEvent, TransactionCommitFailureEvent,
    TransactionRollbackEvent, TransactionRollbackFailureEvent,
};

/// Listens to one data source's driver events and applies them to the
/// accumulator of the currently active context, falling back to the
/// process-wide unknown bucket when no context is tracked.
pub struct DatabaseAccessListener {
    database_name: String,
    unknown: Arc<UnknownCalls>,
    strict_mode: bool,
    log_sql: bool,
    log_sql_backtrace: bool,
}

impl DatabaseAccessListener {
    pub fn new(database_name: impl Into<String>, unknown: Arc<UnknownCalls>) -> Self {
        Self {
            database_name: database_name.into(),
            unknown,
            strict_mode: false,
            log_sql: false,
            log_sql_backtrace: false,
        }
    }

    /// When enabled, logs an error for statements executed outside of any
    /// entry point. Mostly meant to be enabled from test suites to improve
    /// application quality.
    pub fn with_strict_mode(mut self, enabled: bool) -> Self {
        self.strict_mode = enabled;
        self
    }

    /// Log every executed statement's SQL at INFO.
    pub fn with_sql_logging(mut self, enabled: bool) -> Self {
        self.log_sql = enabled;
        self
    }

    /// Include a backtrace with each logged statement, to find the call
    /// site issuing a problematic query. Expensive, debugging only.
    pub fn with_sql_backtrace_logging(mut self, enabled: bool) -> Self {
        self.log_sql_backtrace = enabled;
        self
    }

    fn current_stats(&self) -> Arc<DatabaseAccessStats> {
        let context_map =
            Context::current().and_then(|context| context.get::<StatsMap>(DAS_CONTEXT_KEY));
        match context_map {
            Some(map) => {
                if let Some(existing) = map.get(&self.database_name) {
                    return existing.value().clone();
                }
                map.entry(self.database_name.clone())
                    .or_insert_with(|| Arc::new(DatabaseAccessStats::new(&self.database_name)))
                    .value()
                    .clone()
            }
            None => self.unknown.stats_for(&self.database_name),
        }
    }
}

impl DataSourceListener for DatabaseAccessListener {
    fn on_connection_open(&self, _event: &ConnectionOpenEvent) -> Box<dyn ConnectionListener> {
        self.current_stats().register_connection_opened();

        Box::new(DatabaseAccessConnectionListener {
            database_name: self.database_name.clone(),
            unknown: self.unknown.clone(),
            strict_mode: self.strict_mode,
            log_sql: self.log_sql,
            log_sql_backtrace: self.log_sql_backtrace,
            statements_in_transaction: 0,
        })
    }
}

struct DatabaseAccessConnectionListener {
    database_name: String,
    unknown: Arc<UnknownCalls>,
    strict_mode: bool,
    log_sql: bool,
    log_sql_backtrace: bool,
    statements_in_transaction: u64,
}

impl DatabaseAccessConnectionListener {
    fn current_stats(&self) -> Arc<DatabaseAccessStats> {
        let context_map =
            Context::current().and_then(|context| context.get::<StatsMap>(DAS_CONTEXT_KEY));
        match context_map {
            Some(map) => {
                if let Some(existing) = map.get(&self.database_name) {
                    return existing.value().clone();
                }
                map.entry(self.database_name.clone())
                    .or_insert_with(|| Arc::new(DatabaseAccessStats::new(&self.database_name)))
                    .value()
                    .clone()
            }
            None => self.unknown.stats_for(&self.database_name),
        }
    }

    /// A transaction is empty when it ends with no statement executed since
    /// its begin; those still cost a round trip each, which is why they get
    /// their own counter.
    fn register_transaction_end(&mut self) {
        if self.statements_in_transaction == 0 {
            self.current_stats().register_empty_transaction();
        }
        self.statements_in_transaction = 0;
    }
}

impl ConnectionListener for DatabaseAccessConnectionListener {
    fn on_statement_execute(&mut self, event: &StatementExecuteEvent<'_>) {
        if self.strict_mode && Context::current().is_none() {
            tracing::error!(sql = event.sql, "statement executed outside of an entry point");
        }
        if self.log_sql {
            let kind = if event.in_transaction { "TQ" } else { "NTQ" };
            if self.log_sql_backtrace {
                let backtrace = std::backtrace::Backtrace::force_capture();
                tracing::info!(sql = event.sql, %backtrace, kind);
            } else {
                tracing::info!(sql = event.sql, kind);
            }
        }
        if event.in_transaction {
            self.statements_in_transaction += 1;
        }
        self.current_stats().register_query(
            event.in_transaction,
            event.execution_time_ns,
            event.affected_rows,
        );
    }

    fn on_statement_execute_failure(&mut self, event: &StatementExecuteFailureEvent<'_>) {
        if event.in_transaction {
            self.statements_in_transaction += 1;
        }
        self.current_stats()
            .register_database_action(event.execution_time_ns);
    }

    fn on_transaction_begin(&mut self, _event: &TransactionBeginEvent<'_>) {
        self.statements_in_transaction = 0;
    }

    fn on_transaction_commit(&mut self, event: &TransactionCommitEvent) {
        self.current_stats().register_commit(event.execution_time_ns);
        self.register_transaction_end();
    }

    fn on_transaction_commit_failure(&mut self, event: &TransactionCommitFailureEvent) {
        self.current_stats()
            .register_database_action(event.execution_time_ns);
        self.register_transaction_end();
    }

    fn on_transaction_rollback(&mut self, event: &TransactionRollbackEvent) {
        self.current_stats().register_rollback(event.execution_time_ns);
        self.register_transaction_end();
    }

    fn on_transaction_rollback_failure(&mut self, event: &TransactionRollbackFailureEvent) {
        self.current_stats()
            .register_database_action(event.execution_time_ns);
        self.register_transaction_end();
    }

    fn on_rows_fetched(&mut self, event: &RowsFetchedEvent) {
        self.current_stats().register_rows_fetched(event.rows);
    }

    fn on_connection_close(&mut self, event: &ConnectionCloseEvent) {
        self.current_stats()
            .register_connection_closed(event.execution_time_ns);
    }

    fn on_connection_close_failure(&mut self, event: &ConnectionCloseFailureEvent) {
        self.current_stats()
            .register_database_action(event.execution_time_ns);
    }
}
