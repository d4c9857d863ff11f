//! Database access statistics: who ran how much against which database.
//!
//! The [`interceptor::DatabaseAccessInterceptor`] seeds every entry-point
//! context with an accumulator map, the [`listener::DatabaseAccessListener`]
//! fills it from driver events, and the interceptor's exit guard converts the
//! totals into metrics tagged with the entry point's identity. Activity seen
//! while no context is attached goes to the [`unknown::UnknownCalls`] bucket,
//! drained periodically by the [`unknown::UnknownCallsCollector`].

pub mod interceptor;
pub mod listener;
pub mod stats;
pub mod unknown;

use std::sync::Arc;

use dashmap::DashMap;

/// Context key under which the interceptor stores the accumulator map.
pub(crate) const DAS_CONTEXT_KEY: &str = "das.stats";

/// One accumulator per database touched within a context.
pub(crate) type StatsMap = DashMap<String, Arc<DatabaseAccessStats>>;

pub use interceptor::DatabaseAccessInterceptor;
pub use listener::DatabaseAccessListener;
pub use stats::DatabaseAccessStats;
pub use unknown::{UnknownCalls, UnknownCallsCollector};
