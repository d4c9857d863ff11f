//! Per-(context, database) counter accumulator.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Database activity counters scoped to one (context, database) pair.
///
/// Every counter is an independently atomic primitive: concurrent threads
/// sharing one context increment without a coarse lock, and no update is
/// ever lost. No cross-counter consistency is guaranteed; the exit-time
/// reader observes each counter individually.
///
/// All counters only grow within the accumulator's lifetime except the
/// current connection count, which rises and falls; the max connection
/// count is its running high-water mark, so `max >= current >= 0` holds
/// within a context.
#[derive(Debug, Default)]
pub struct DatabaseAccessStats {
    database_name: String,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    non_transactional_queries: AtomicU64,
    transactional_queries: AtomicU64,
    time_taken_in_database_ns: AtomicU64,
    empty_transactions: AtomicU64,
    affected_rows: AtomicU64,
    fetched_rows: AtomicU64,
    current_connections: AtomicI64,
    max_connections: AtomicI64,
}

impl DatabaseAccessStats {
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            ..Self::default()
        }
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn register_commit(&self, time_taken_ns: u64) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.time_taken_in_database_ns
            .fetch_add(time_taken_ns, Ordering::Relaxed);
    }

    pub fn register_rollback(&self, time_taken_ns: u64) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        self.time_taken_in_database_ns
            .fetch_add(time_taken_ns, Ordering::Relaxed);
    }

    /// Accounts time for events with no counter of their own, e.g. failed
    /// commits or failed connection closes.
    pub fn register_database_action(&self, time_taken_ns: u64) {
        self.time_taken_in_database_ns
            .fetch_add(time_taken_ns, Ordering::Relaxed);
    }

    pub fn register_query(&self, in_transaction: bool, time_taken_ns: u64, affected_rows: u64) {
        if in_transaction {
            self.transactional_queries.fetch_add(1, Ordering::Relaxed);
        } else {
            self.non_transactional_queries.fetch_add(1, Ordering::Relaxed);
        }
        self.time_taken_in_database_ns
            .fetch_add(time_taken_ns, Ordering::Relaxed);
        self.affected_rows.fetch_add(affected_rows, Ordering::Relaxed);
    }

    pub fn register_rows_fetched(&self, rows: u64) {
        self.fetched_rows.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn register_empty_transaction(&self) {
        self.empty_transactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn register_connection_opened(&self) {
        let current = self.current_connections.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_connections.fetch_max(current, Ordering::Relaxed);
    }

    pub fn register_connection_closed(&self, time_taken_ns: u64) {
        self.current_connections.fetch_sub(1, Ordering::Relaxed);
        self.time_taken_in_database_ns
            .fetch_add(time_taken_ns, Ordering::Relaxed);
    }

    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    pub fn get_and_reset_commits(&self) -> u64 {
        self.commits.swap(0, Ordering::Relaxed)
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    pub fn get_and_reset_rollbacks(&self) -> u64 {
        self.rollbacks.swap(0, Ordering::Relaxed)
    }

    pub fn non_transactional_queries(&self) -> u64 {
        self.non_transactional_queries.load(Ordering::Relaxed)
    }

    pub fn get_and_reset_non_transactional_queries(&self) -> u64 {
        self.non_transactional_queries.swap(0, Ordering::Relaxed)
    }

    pub fn transactional_queries(&self) -> u64 {
        self.transactional_queries.load(Ordering::Relaxed)
    }

    pub fn get_and_reset_transactional_queries(&self) -> u64 {
        self.transactional_queries.swap(0, Ordering::Relaxed)
    }

    pub fn time_taken_in_database_ns(&self) -> u64 {
        self.time_taken_in_database_ns.load(Ordering::Relaxed)
    }

    pub fn get_and_reset_time_taken_in_database_ns(&self) -> u64 {
        self.time_taken_in_database_ns.swap(0, Ordering::Relaxed)
    }

    pub fn empty_transactions(&self) -> u64 {
        self.empty_transactions.load(Ordering::Relaxed)
    }

    pub fn get_and_reset_empty_transactions(&self) -> u64 {
        self.empty_transactions.swap(0, Ordering::Relaxed)
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected_rows.load(Ordering::Relaxed)
    }

    pub fn get_and_reset_affected_rows(&self) -> u64 {
        self.affected_rows.swap(0, Ordering::Relaxed)
    }

    pub fn fetched_rows(&self) -> u64 {
        self.fetched_rows.load(Ordering::Relaxed)
    }

    pub fn get_and_reset_fetched_rows(&self) -> u64 {
        self.fetched_rows.swap(0, Ordering::Relaxed)
    }

    pub fn current_connections(&self) -> i64 {
        self.current_connections.load(Ordering::Relaxed)
    }

    pub fn max_connections(&self) -> i64 {
        self.max_connections.load(Ordering::Relaxed)
    }
}
