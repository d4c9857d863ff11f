//! Hand-written classifications for statements the parser cannot handle.

use std::sync::Arc;

use dashmap::DashMap;

use crate::tas::parsed_query::ParsedQuery;

/// Exact-match overrides consulted before the cache and the parser.
///
/// Meant for vendor-specific SQL the grammar rejects, where the service
/// owner still knows exactly which tables it touches.
#[derive(Default)]
pub struct ParsedQueryRegistry {
    overrides: DashMap<String, Arc<ParsedQuery>>,
}

impl ParsedQueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the classification to use for this exact SQL text.
    /// A repeated registration replaces the previous one.
    pub fn register(&self, sql: impl Into<String>, parsed: ParsedQuery) {
        self.overrides.insert(sql.into(), Arc::new(parsed));
    }

    pub fn lookup(&self, sql: &str) -> Option<Arc<ParsedQuery>> {
        self.overrides.get(sql).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_exact_match() {
        let registry = ParsedQueryRegistry::new();
        let mut parsed = ParsedQuery::new();
        parsed.add_table("select", "table_a");
        registry.register("select weird_vendor_syntax", parsed.clone());

        assert_eq!(
            registry.lookup("select weird_vendor_syntax").as_deref(),
            Some(&parsed)
        );
        assert!(registry.lookup("select weird_vendor_syntax ").is_none());
    }

    #[test]
    fn test_re_registration_replaces() {
        let registry = ParsedQueryRegistry::new();
        let mut first = ParsedQuery::new();
        first.add_table("select", "table_a");
        let mut second = ParsedQuery::new();
        second.add_table("select", "table_b");

        registry.register("q", first);
        registry.register("q", second.clone());
        assert_eq!(registry.lookup("q").as_deref(), Some(&second));
    }
}
