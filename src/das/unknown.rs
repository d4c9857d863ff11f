//! Fallback accounting for database activity outside any tracked context.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use dashmap::DashMap;
use metrics::{counter, Counter};

use crate::das::stats::DatabaseAccessStats;
use crate::meters::{db_labels, names, MeterCache};

/// Process-wide accumulators for database events observed while no context
/// was active. Entries are created lazily per database name and never
/// deleted, only drained: a drain atomically reads-and-resets every counter
/// while concurrent writers may keep appending.
#[derive(Default)]
pub struct UnknownCalls {
    stats: DashMap<String, Arc<DatabaseAccessStats>>,
    meters: MeterCache<UnknownCallMeters>,
}

struct UnknownCallMeters {
    commits: Counter,
    rollbacks: Counter,
    non_transactional_queries: Counter,
    transactional_queries: Counter,
    time_taken_ns: Counter,
    empty_transactions: Counter,
    affected_rows: Counter,
    fetched_rows: Counter,
}

impl UnknownCalls {
    pub fn new() -> Self {
        Self {
            stats: DashMap::new(),
            meters: MeterCache::new(),
        }
    }

    /// The unknown-bucket accumulator for a database, created on first use.
    pub fn stats_for(&self, database_name: &str) -> Arc<DatabaseAccessStats> {
        if let Some(existing) = self.stats.get(database_name) {
            return existing.value().clone();
        }
        self.stats
            .entry(database_name.to_string())
            .or_insert_with(|| Arc::new(DatabaseAccessStats::new(database_name)))
            .value()
            .clone()
    }

    /// Atomically read-and-reset every accumulator and convert the deltas
    /// into counters tagged by database only; no entry-point identity is
    /// available for this activity.
    pub fn drain(&self) {
        for entry in self.stats.iter() {
            let stats = entry.value();

            let commits = stats.get_and_reset_commits();
            let rollbacks = stats.get_and_reset_rollbacks();
            let non_transactional_queries = stats.get_and_reset_non_transactional_queries();
            let transactional_queries = stats.get_and_reset_transactional_queries();
            let time_taken_ns = stats.get_and_reset_time_taken_in_database_ns();
            let empty_transactions = stats.get_and_reset_empty_transactions();
            let affected_rows = stats.get_and_reset_affected_rows();
            let fetched_rows = stats.get_and_reset_fetched_rows();

            let meters = self.meters.get_or_create(vec![entry.key().clone()], || {
                let labels = db_labels(stats.database_name());
                UnknownCallMeters {
                    commits: counter!(names::UNKNOWN_COMMITS, labels.clone()),
                    rollbacks: counter!(names::UNKNOWN_ROLLBACKS, labels.clone()),
                    non_transactional_queries: counter!(names::UNKNOWN_NT_QUERIES, labels.clone()),
                    transactional_queries: counter!(names::UNKNOWN_T_QUERIES, labels.clone()),
                    time_taken_ns: counter!(names::UNKNOWN_TIME_TAKEN_NS, labels.clone()),
                    empty_transactions: counter!(names::UNKNOWN_EMPTY_TRANSACTIONS, labels.clone()),
                    affected_rows: counter!(names::UNKNOWN_AFFECTED_ROWS, labels.clone()),
                    fetched_rows: counter!(names::UNKNOWN_FETCHED_ROWS, labels),
                }
            });

            meters.commits.increment(commits);
            meters.rollbacks.increment(rollbacks);
            meters
                .non_transactional_queries
                .increment(non_transactional_queries);
            meters.transactional_queries.increment(transactional_queries);
            meters.time_taken_ns.increment(time_taken_ns);
            meters.empty_transactions.increment(empty_transactions);
            meters.affected_rows.increment(affected_rows);
            meters.fetched_rows.increment(fetched_rows);
        }
    }
}

/// Background job draining the unknown bucket at a fixed interval, so
/// activity with no entry point in sight — before any context existed, or
/// with tracking disabled — becomes visible within one interval.
///
/// Owns its thread with an explicit start/stop lifecycle; dropping the
/// collector stops it.
pub struct UnknownCallsCollector {
    unknown: Arc<UnknownCalls>,
    interval: Duration,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl UnknownCallsCollector {
    pub fn new(unknown: Arc<UnknownCalls>, interval: Duration) -> Self {
        Self {
            unknown,
            interval,
            stop: None,
            handle: None,
        }
    }

    /// Start the collection thread. Calling it twice is a no-op.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        tracing::info!("starting to collect database metrics for unknown calls");

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let unknown = self.unknown.clone();
        let interval = self.interval;
        let handle = std::thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => unknown.drain(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        self.stop = Some(stop_tx);
        self.handle = Some(handle);
    }

    /// Stop the collection thread and wait for it to finish its interval.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        tracing::info!("stopping collection of database metrics for unknown calls");

        // Dropping the sender wakes the thread even if the signal send races.
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
        }
        if handle.join().is_err() {
            tracing::error!("unknown-calls collector thread panicked");
        }
    }

    /// One drain cycle, on the caller's thread.
    pub fn collect_once(&self) {
        self.unknown.drain();
    }
}

impl Drop for UnknownCallsCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_for_returns_same_accumulator() {
        let unknown = UnknownCalls::new();
        let a = unknown.stats_for("mydb");
        let b = unknown.stats_for("mydb");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.database_name(), "mydb");
    }

    #[test]
    fn test_drain_resets_accumulators() {
        let unknown = UnknownCalls::new();
        unknown.stats_for("mydb").register_query(false, 100, 2);
        unknown.stats_for("otherdb").register_commit(50);

        unknown.drain();

        assert_eq!(unknown.stats_for("mydb").non_transactional_queries(), 0);
        assert_eq!(unknown.stats_for("mydb").affected_rows(), 0);
        assert_eq!(unknown.stats_for("otherdb").commits(), 0);
    }

    #[test]
    fn test_collector_lifecycle_is_clean() {
        let unknown = Arc::new(UnknownCalls::new());
        let mut collector =
            UnknownCallsCollector::new(unknown.clone(), Duration::from_millis(5));

        collector.start();
        collector.start();
        unknown.stats_for("mydb").register_query(false, 1, 0);
        std::thread::sleep(Duration::from_millis(25));
        collector.stop();
        collector.stop();

        // The periodic drain consumed the activity.
        assert_eq!(unknown.stats_for("mydb").non_transactional_queries(), 0);
    }
}
