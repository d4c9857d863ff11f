//! Metric names, tag names and the meter handle cache.
//!
//! Every meter is created by (name, tag set) against the `metrics` facade
//! and reused for the same pair. The high-cardinality meters here carry raw
//! samples; histogram/percentile configuration is the recorder's decision,
//! no default buckets are requested.

use std::sync::Arc;

use dashmap::DashMap;
use metrics::Label;

use crate::context::{Context, GENERIC};

/// Stable metric names emitted by this crate.
pub mod names {
    pub const REGISTERED_COMMITS: &str = "EntryPoints_Das_Registered_Commits";
    pub const REGISTERED_ROLLBACKS: &str = "EntryPoints_Das_Registered_Rollbacks";
    pub const REGISTERED_NT_QUERIES: &str = "EntryPoints_Das_Registered_NTQueries";
    pub const REGISTERED_T_QUERIES: &str = "EntryPoints_Das_Registered_TQueries";
    pub const REGISTERED_MAX_CONCURRENT_CONNECTIONS: &str =
        "EntryPoints_Das_Registered_MaxConcurrentConnections";
    pub const REGISTERED_REMAINING_OPEN_CONNECTIONS: &str =
        "EntryPoints_Das_Registered_RemainingOpenConnections";
    pub const REGISTERED_EMPTY_TRANSACTIONS: &str = "EntryPoints_Das_Registered_EmptyTransactions";
    pub const REGISTERED_AFFECTED_ROWS: &str = "EntryPoints_Das_Registered_AffectedRows";
    pub const REGISTERED_FETCHED_ROWS: &str = "EntryPoints_Das_Registered_FetchedRows";
    pub const REGISTERED_TIME_TAKEN: &str = "EntryPoints_Das_Registered_TimeTaken";

    pub const UNKNOWN_COMMITS: &str = "EntryPoints_Das_Unknown_Commits";
    pub const UNKNOWN_ROLLBACKS: &str = "EntryPoints_Das_Unknown_Rollbacks";
    pub const UNKNOWN_NT_QUERIES: &str = "EntryPoints_Das_Unknown_NTQueries";
    pub const UNKNOWN_T_QUERIES: &str = "EntryPoints_Das_Unknown_TQueries";
    pub const UNKNOWN_TIME_TAKEN_NS: &str = "EntryPoints_Das_Unknown_TimeTakenNs";
    pub const UNKNOWN_EMPTY_TRANSACTIONS: &str = "EntryPoints_Das_Unknown_EmptyTransactions";
    pub const UNKNOWN_AFFECTED_ROWS: &str = "EntryPoints_Das_Unknown_AffectedRows";
    pub const UNKNOWN_FETCHED_ROWS: &str = "EntryPoints_Das_Unknown_FetchedRows";

    pub const TABLE_ACCESS: &str = "EntryPoints_Tas_TableAccess";
    pub const FIRST_TABLE_ACCESS: &str = "EntryPoints_Tas_FirstTableAccess";
    pub const FAILED_PARSES: &str = "EntryPoints_Tas_FailedParses";
    pub const UNCOUNTED_QUERIES: &str = "EntryPoints_Tas_UncountedQueries";
    pub const PARSE_CACHE_SIZE: &str = "EntryPoints_Tas_SqlParseResultsCache_size";
    pub const PARSE_CACHE_HIT_COUNT: &str = "EntryPoints_Tas_SqlParseResultsCache_hitCount";
    pub const PARSE_CACHE_HIT_RATIO: &str = "EntryPoints_Tas_SqlParseResultsCache_hitRatio";
}

/// Tag names shared by the metric families.
pub mod tags {
    pub const DATABASE: &str = "db";
    pub const EP_GROUP: &str = "epGroup";
    pub const EP_NAME: &str = "epName";
    pub const EP_OWNER: &str = "epOwner";
    pub const OPERATION: &str = "operation";
    pub const TABLE: &str = "table";
    pub const IN_TRANSACTION: &str = "inTransaction";
    pub const SUCCESS: &str = "success";
}

/// The (group, name, owner) triple identifying a unit of work, consumed as a
/// tag dimension and never mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryPointId {
    pub group: String,
    pub name: String,
    pub owner: String,
}

impl EntryPointId {
    /// Identity of the currently attached context, or the generic one.
    pub fn current() -> Self {
        match Context::current() {
            Some(context) => Self::of(&context),
            None => Self::generic(),
        }
    }

    pub fn of(context: &Context) -> Self {
        Self {
            group: context.group().to_string(),
            name: context.name().to_string(),
            owner: context.owner().to_string(),
        }
    }

    pub fn generic() -> Self {
        Self {
            group: GENERIC.to_string(),
            name: GENERIC.to_string(),
            owner: GENERIC.to_string(),
        }
    }
}

/// Labels for meters tagged by database only.
pub(crate) fn db_labels(database_name: &str) -> Vec<Label> {
    vec![Label::new(tags::DATABASE, database_name.to_string())]
}

/// Labels for meters tagged by database and entry-point identity.
pub(crate) fn db_entry_point_labels(database_name: &str, ep: &EntryPointId) -> Vec<Label> {
    vec![
        Label::new(tags::DATABASE, database_name.to_string()),
        Label::new(tags::EP_GROUP, ep.group.clone()),
        Label::new(tags::EP_NAME, ep.name.clone()),
        Label::new(tags::EP_OWNER, ep.owner.clone()),
    ]
}

/// Creates each meter bundle once per tag-value key and hands out the cached
/// handles afterwards, keeping registry lookups off the hot path.
pub(crate) struct MeterCache<M> {
    meters: DashMap<Vec<String>, Arc<M>>,
}

impl<M> Default for MeterCache<M> {
    fn default() -> Self {
        Self {
            meters: DashMap::new(),
        }
    }
}

impl<M: Send + Sync + 'static> MeterCache<M> {
    pub(crate) fn new() -> Self {
        Self {
            meters: DashMap::new(),
        }
    }

    pub(crate) fn get_or_create(&self, key: Vec<String>, build: impl FnOnce() -> M) -> Arc<M> {
        if let Some(existing) = self.meters.get(&key) {
            return existing.value().clone();
        }
        self.meters
            .entry(key)
            .or_insert_with(|| Arc::new(build()))
            .value()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_meter_cache_builds_once_per_key() {
        let cache: MeterCache<String> = MeterCache::new();
        let builds = AtomicUsize::new(0);

        let a1 = cache.get_or_create(vec!["db1".into()], || {
            builds.fetch_add(1, Ordering::Relaxed);
            "meters".to_string()
        });
        let a2 = cache.get_or_create(vec!["db1".into()], || {
            builds.fetch_add(1, Ordering::Relaxed);
            "meters".to_string()
        });
        cache.get_or_create(vec!["db2".into()], || {
            builds.fetch_add(1, Ordering::Relaxed);
            "meters".to_string()
        });

        assert!(Arc::ptr_eq(&a1, &a2));
        assert_eq!(builds.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_entry_point_identity_defaults_to_generic() {
        let id = EntryPointId::current();
        assert_eq!(id.group, GENERIC);
        assert_eq!(id.name, GENERIC);
        assert_eq!(id.owner, GENERIC);
    }

    #[test]
    fn test_entry_point_identity_of_attached_context() {
        let context = Context::new_entry_point("Test", "myEntryPoint").with_owner("payments");
        let _scope = context.attach();

        let id = EntryPointId::current();
        assert_eq!(id.group, "Test");
        assert_eq!(id.name, "myEntryPoint");
        assert_eq!(id.owner, "payments");
    }
}
