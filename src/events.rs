//! Database driver event source.
//!
//! An external driver wrapper observes the lifecycle of every logical
//! connection and fires these events on whatever thread runs the unit of
//! work. This crate only consumes them; it never calls back into the driver
//! and never alters the outcome of the underlying statements.

/// Fired when a logical connection is handed out.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionOpenEvent {
    pub execution_time_ns: u64,
}

/// Fired when a logical connection is returned or closed.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionCloseEvent {
    pub execution_time_ns: u64,
}

/// Fired when closing a connection failed.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionCloseFailureEvent {
    pub execution_time_ns: u64,
}

/// Fired after a statement executed successfully.
#[derive(Debug, Clone, Copy)]
pub struct StatementExecuteEvent<'a> {
    pub sql: &'a str,
    pub in_transaction: bool,
    pub execution_time_ns: u64,
    pub affected_rows: u64,
}

/// Fired after a statement execution failed.
#[derive(Debug, Clone, Copy)]
pub struct StatementExecuteFailureEvent<'a> {
    pub sql: &'a str,
    pub in_transaction: bool,
    pub execution_time_ns: u64,
}

/// Fired when a transaction begins.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionBeginEvent<'a> {
    pub name: Option<&'a str>,
    pub read_only: bool,
    pub isolation_level: Option<&'a str>,
}

/// Fired after a successful commit.
#[derive(Debug, Clone, Copy)]
pub struct TransactionCommitEvent {
    pub execution_time_ns: u64,
}

/// Fired after a failed commit.
#[derive(Debug, Clone, Copy)]
pub struct TransactionCommitFailureEvent {
    pub execution_time_ns: u64,
}

/// Fired after a successful rollback.
#[derive(Debug, Clone, Copy)]
pub struct TransactionRollbackEvent {
    pub execution_time_ns: u64,
}

/// Fired after a failed rollback.
#[derive(Debug, Clone, Copy)]
pub struct TransactionRollbackFailureEvent {
    pub execution_time_ns: u64,
}

/// Fired when a result set hands rows to the application.
#[derive(Debug, Clone, Copy)]
pub struct RowsFetchedEvent {
    pub rows: u64,
}

/// Per-data-source listener: yields one [`ConnectionListener`] per logical
/// connection the driver opens.
pub trait DataSourceListener: Send + Sync {
    fn on_connection_open(&self, event: &ConnectionOpenEvent) -> Box<dyn ConnectionListener>;
}

/// Ordered per-connection callbacks. All bodies default to no-ops so
/// listeners only implement what they consume.
pub trait ConnectionListener: Send {
    fn on_statement_execute(&mut self, event: &StatementExecuteEvent<'_>) {
        let _ = event;
    }

    fn on_statement_execute_failure(&mut self, event: &StatementExecuteFailureEvent<'_>) {
        let _ = event;
    }

    fn on_transaction_begin(&mut self, event: &TransactionBeginEvent<'_>) {
        let _ = event;
    }

    fn on_transaction_commit(&mut self, event: &TransactionCommitEvent) {
        let _ = event;
    }

    fn on_transaction_commit_failure(&mut self, event: &TransactionCommitFailureEvent) {
        let _ = event;
    }

    fn on_transaction_rollback(&mut self, event: &TransactionRollbackEvent) {
        let _ = event;
    }

    fn on_transaction_rollback_failure(&mut self, event: &TransactionRollbackFailureEvent) {
        let _ = event;
    }

    fn on_rows_fetched(&mut self, event: &RowsFetchedEvent) {
        let _ = event;
    }

    fn on_connection_close(&mut self, event: &ConnectionCloseEvent) {
        let _ = event;
    }

    fn on_connection_close_failure(&mut self, event: &ConnectionCloseFailureEvent) {
        let _ = event;
    }
}
