//! Classification result of one SQL text.

use std::collections::BTreeMap;

/// The tables touched by one kind of operation within a statement batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlOperation {
    tables: Vec<String>,
}

impl SqlOperation {
    /// Tables in first-seen order, each at most once.
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    fn add_table(&mut self, table: String) {
        if !self.tables.contains(&table) {
            self.tables.push(table);
        }
    }
}

/// What a SQL text does: which operations it performs against which tables.
///
/// Operations are keyed by their lowercase name ("select", "update", ...).
/// An empty result is valid and means the text produced nothing countable,
/// either because parsing failed or because it touches no tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    operations: BTreeMap<String, SqlOperation>,
}

impl ParsedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `operation` touches `table`. Duplicate pairs collapse.
    pub fn add_table(&mut self, operation: impl Into<String>, table: impl Into<String>) {
        self.operations
            .entry(operation.into())
            .or_default()
            .add_table(table.into());
    }

    /// Record an operation even when no table could be attributed to it.
    pub fn add_operation(&mut self, operation: impl Into<String>) {
        self.operations.entry(operation.into()).or_default();
    }

    pub fn operations(&self) -> impl Iterator<Item = (&str, &SqlOperation)> {
        self.operations.iter().map(|(op, tables)| (op.as_str(), tables))
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of (operation, table) pairs this query will count as.
    pub fn table_access_count(&self) -> usize {
        self.operations.values().map(|op| op.tables.len()).sum()
    }

    /// Rough heap footprint used as a cache weight component.
    pub(crate) fn approximate_size(&self) -> usize {
        self.operations
            .iter()
            .map(|(op, tables)| {
                op.len() + tables.tables.iter().map(String::len).sum::<usize>()
            })
            .sum()
    }
}
