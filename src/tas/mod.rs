//! Table access statistics: which entry points touch which tables, how.
//!
//! Statement texts flow through exact-match overrides
//! ([`ParsedQueryRegistry`]), then parsing policies
//! ([`QueryParsingPolicy`]), then a weight-bounded cache in front of the
//! SQL parser. Table and operation names are the only free tag dimensions,
//! so cardinality stays bounded by the schema, not by statement literals.

pub mod listener;
pub mod parsed_query;
pub mod parser;
pub mod policy;
pub mod registry;

pub(crate) mod cache;

use crate::context::Context;

pub use listener::TableAccessListener;
pub use parsed_query::{ParsedQuery, SqlOperation};
pub use parser::SqlParser;
pub use policy::{DefaultQueryParsingPolicy, PolicyDecision, QueryParsingPolicy};
pub use registry::ParsedQueryRegistry;

const QUERY_PARSING_DISABLED_KEY: &str = "tas.query_parsing_disabled";

/// Turn statement classification off for this context and its sub-contexts.
///
/// Useful around bulk operations running millions of identical statements,
/// where classification adds nothing but work. Statements executed while
/// disabled are counted as uncounted queries.
pub fn disable_query_parsing(context: &Context) {
    context.put(QUERY_PARSING_DISABLED_KEY, true);
}

/// Re-enable classification for this context, shadowing a parent's disable.
pub fn enable_query_parsing(context: &Context) {
    context.put(QUERY_PARSING_DISABLED_KEY, false);
}

pub fn is_query_parsing_enabled(context: &Context) -> bool {
    context
        .get::<bool>(QUERY_PARSING_DISABLED_KEY)
        .map_or(true, |disabled| !*disabled)
}
