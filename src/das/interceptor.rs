//! Entry-point wrapper that scopes accumulators and emits them at exit.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use metrics::{histogram, Histogram};

use crate::config::EntryPointsConfig;
use crate::context::{Context, ContextInterceptor};
use crate::das::unknown::UnknownCalls;
use crate::das::{StatsMap, DAS_CONTEXT_KEY};
use crate::meters::{db_entry_point_labels, names, EntryPointId, MeterCache};

/// Attaches a fresh accumulator map to every entry-point context and, when
/// the unit of work finishes, converts the totals into distribution meters
/// tagged with the entry point's identity.
///
/// Emission happens in a drop guard, so the statistics of a panicking unit
/// of work are still recorded before the panic propagates.
pub struct DatabaseAccessInterceptor {
    enabled: bool,
    meters: Arc<MeterCache<CallMeters>>,
    unknown: Option<Arc<UnknownCalls>>,
}

struct CallMeters {
    commits: Histogram,
    rollbacks: Histogram,
    non_transactional_queries: Histogram,
    transactional_queries: Histogram,
    max_concurrent_connections: Histogram,
    remaining_open_connections: Histogram,
    empty_transactions: Histogram,
    affected_rows: Histogram,
    fetched_rows: Histogram,
    time_taken_ns: Histogram,
}

impl DatabaseAccessInterceptor {
    pub fn new(config: &EntryPointsConfig) -> Self {
        Self {
            enabled: config.das_enabled,
            meters: Arc::new(MeterCache::new()),
            unknown: None,
        }
    }

    /// Also drain the unknown bucket whenever an entry point exits, so its
    /// activity becomes visible ahead of the collector's next interval.
    pub fn with_unknown_calls(mut self, unknown: Arc<UnknownCalls>) -> Self {
        self.unknown = Some(unknown);
        self
    }
}

impl ContextInterceptor for DatabaseAccessInterceptor {
    fn applies(&self, context: &Context) -> bool {
        self.enabled && context.is_entry_point()
    }

    fn intercept(&self, context: &Context, next: &mut dyn FnMut()) {
        context.put(DAS_CONTEXT_KEY, StatsMap::new());
        let _guard = EmissionGuard {
            context,
            meters: &self.meters,
            unknown: self.unknown.as_deref(),
        };
        next();
    }
}

struct EmissionGuard<'a> {
    context: &'a Context,
    meters: &'a MeterCache<CallMeters>,
    unknown: Option<&'a UnknownCalls>,
}

impl Drop for EmissionGuard<'_> {
    fn drop(&mut self) {
        let emitted = catch_unwind(AssertUnwindSafe(|| {
            if let Some(unknown) = self.unknown {
                unknown.drain();
            }
            register_call(self.context, self.meters);
        }));
        if emitted.is_err() {
            tracing::error!(
                context = ?self.context,
                "failed to convert database access statistics into metrics"
            );
        }
    }
}

fn register_call(context: &Context, meters: &MeterCache<CallMeters>) {
    let Some(map) = context.get::<StatsMap>(DAS_CONTEXT_KEY) else {
        return;
    };
    let ep = EntryPointId::of(context);

    for entry in map.iter() {
        let stats = entry.value();
        let key = vec![
            entry.key().clone(),
            ep.group.clone(),
            ep.name.clone(),
            ep.owner.clone(),
        ];
        let bundle = meters.get_or_create(key, || {
            let labels = db_entry_point_labels(stats.database_name(), &ep);
            CallMeters {
                commits: histogram!(names::REGISTERED_COMMITS, labels.clone()),
                rollbacks: histogram!(names::REGISTERED_ROLLBACKS, labels.clone()),
                non_transactional_queries: histogram!(names::REGISTERED_NT_QUERIES, labels.clone()),
                transactional_queries: histogram!(names::REGISTERED_T_QUERIES, labels.clone()),
                max_concurrent_connections: histogram!(
                    names::REGISTERED_MAX_CONCURRENT_CONNECTIONS,
                    labels.clone()
                ),
                remaining_open_connections: histogram!(
                    names::REGISTERED_REMAINING_OPEN_CONNECTIONS,
                    labels.clone()
                ),
                empty_transactions: histogram!(
                    names::REGISTERED_EMPTY_TRANSACTIONS,
                    labels.clone()
                ),
                affected_rows: histogram!(names::REGISTERED_AFFECTED_ROWS, labels.clone()),
                fetched_rows: histogram!(names::REGISTERED_FETCHED_ROWS, labels.clone()),
                time_taken_ns: histogram!(names::REGISTERED_TIME_TAKEN, labels),
            }
        });

        bundle.commits.record(stats.commits() as f64);
        bundle.rollbacks.record(stats.rollbacks() as f64);
        bundle
            .non_transactional_queries
            .record(stats.non_transactional_queries() as f64);
        bundle
            .transactional_queries
            .record(stats.transactional_queries() as f64);
        bundle
            .max_concurrent_connections
            .record(stats.max_connections() as f64);
        bundle
            .remaining_open_connections
            .record(stats.current_connections() as f64);
        bundle
            .empty_transactions
            .record(stats.empty_transactions() as f64);
        bundle.affected_rows.record(stats.affected_rows() as f64);
        bundle.fetched_rows.record(stats.fetched_rows() as f64);
        bundle
            .time_taken_ns
            .record(stats.time_taken_in_database_ns() as f64);

        tracing::debug!(
            db = stats.database_name(),
            ep_group = %ep.group,
            ep_name = %ep.name,
            commits = stats.commits(),
            rollbacks = stats.rollbacks(),
            nt_queries = stats.non_transactional_queries(),
            t_queries = stats.transactional_queries(),
            time_taken_ns = stats.time_taken_in_database_ns(),
            "registered database call"
        );
    }
}
