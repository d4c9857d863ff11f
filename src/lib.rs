//! # entrypoint-metrics
//!
//! Entry-point attribution for database activity: answers "which unit of
//! work causes how much database load, against which tables" with metrics
//! whose cardinality is bounded by your entry points and your schema, never
//! by statement literals.
//!
//! Two statistics families share one context facility:
//!
//! - **Database access statistics (DAS)**: per-context counters (queries,
//!   commits, rollbacks, rows, connections, time in database), converted to
//!   distribution meters tagged with the entry point's identity when the
//!   unit of work exits. Activity outside any context lands in an unknown
//!   bucket drained periodically by a background collector.
//! - **Table access statistics (TAS)**: every executed statement is
//!   classified into operations and tables through an override registry,
//!   parsing policies and a weight-bounded parse-result cache, then counted
//!   per (entry point, operation, table).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use entrypoint_metrics::prelude::*;
//!
//! let config = EntryPointsConfig::default();
//!
//! // Wire the listeners into your driver wrapper, one set per data source.
//! let unknown = Arc::new(UnknownCalls::new());
//! let das = DatabaseAccessListener::new("mydb", unknown.clone());
//! let tas = TableAccessListener::new("mydb", &config);
//!
//! let mut collector = UnknownCallsCollector::new(unknown, config.unknown_calls_interval);
//! collector.start();
//!
//! // Wrap each unit of work in a context.
//! let chain = InterceptorChain::new()
//!     .add(Arc::new(DatabaseAccessInterceptor::new(&config)));
//! let context = Context::new_entry_point("Web", "POST /v1/payments").with_owner("payments");
//! chain.execute(&context, || {
//!     // handle the request; database activity is attributed to it
//! });
//! ```
//!
//! ## Metrics
//!
//! Emitted through the [`metrics`] facade; install any recorder.
//!
//! | Metric | Tags |
//! |--------|------|
//! | `EntryPoints_Das_Registered_*` | `db`, `epGroup`, `epName`, `epOwner` |
//! | `EntryPoints_Das_Unknown_*` | `db` |
//! | `EntryPoints_Tas_TableAccess` | `db`, `epGroup`, `epName`, `epOwner`, `operation`, `table`, `inTransaction`, `success` |
//! | `EntryPoints_Tas_FirstTableAccess` | `db`, `epGroup`, `epName`, `epOwner`, `operation`, `table` |
//! | `EntryPoints_Tas_FailedParses` | `db` |
//! | `EntryPoints_Tas_UncountedQueries` | `db`, `epGroup`, `epName`, `epOwner` |
//! | `EntryPoints_Tas_SqlParseResultsCache_*` | none |

pub mod config;
pub mod context;
pub mod das;
pub mod error;
pub mod events;
pub mod meters;
pub mod tas;

pub use config::{EntryPointsConfig, SqlParserConfig};
pub use context::{Context, ContextInterceptor, ContextScope, InterceptorChain, GENERIC};
pub use error::ParseError;
pub use meters::EntryPointId;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{EntryPointsConfig, SqlParserConfig};
    pub use crate::context::{Context, ContextInterceptor, InterceptorChain};
    pub use crate::das::{
        DatabaseAccessInterceptor, DatabaseAccessListener, UnknownCalls, UnknownCallsCollector,
    };
    pub use crate::events::{ConnectionListener, DataSourceListener};
    pub use crate::tas::{
        ParsedQuery, ParsedQueryRegistry, PolicyDecision, QueryParsingPolicy, TableAccessListener,
    };
}
