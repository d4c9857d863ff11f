//! Table access statistics wired to the driver event stream.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram, Counter, Histogram, Label};
use once_cell::sync::Lazy;

use crate::config::{EntryPointsConfig, SqlParserConfig};
use crate::context::Context;
use crate::events::{
    ConnectionListener, ConnectionOpenEvent, DataSourceListener, StatementExecuteEvent,
    StatementExecuteFailureEvent,
};
use crate::meters::{names, tags, EntryPointId, MeterCache};
use crate::tas::cache::ParseResultCache;
use crate::tas::parsed_query::ParsedQuery;
use crate::tas::parser::SqlParser;
use crate::tas::policy::{DefaultQueryParsingPolicy, PolicyDecision, QueryParsingPolicy};
use crate::tas::registry::ParsedQueryRegistry;

static EMPTY_PARSED: Lazy<Arc<ParsedQuery>> = Lazy::new(|| Arc::new(ParsedQuery::new()));

/// Classifies every executed statement of one data source and counts which
/// entry points touch which tables.
///
/// Classification runs through the chain: exact-match registry overrides,
/// then parsing policies, then the parse-result cache in front of the
/// parser. A statement yielding no (operation, table) pairs is counted as
/// an uncounted query so classifier blind spots stay visible.
pub struct TableAccessListener {
    shared: Arc<TasShared>,
}

struct TasShared {
    database_name: String,
    enabled: bool,
    parser_config: SqlParserConfig,
    parser: SqlParser,
    cache: ParseResultCache,
    registry: Arc<ParsedQueryRegistry>,
    policies: Vec<Box<dyn QueryParsingPolicy>>,
    access_counters: MeterCache<Counter>,
    first_access_timers: MeterCache<Histogram>,
    uncounted_counters: MeterCache<Counter>,
    failed_parses: Counter,
}

impl TableAccessListener {
    pub fn new(database_name: impl Into<String>, config: &EntryPointsConfig) -> Self {
        Self::with_extensions(
            database_name,
            config,
            Arc::new(ParsedQueryRegistry::new()),
            Vec::new(),
        )
    }

    /// Like [`TableAccessListener::new`], with service-specific overrides
    /// and extra policies that run in front of the default one.
    pub fn with_extensions(
        database_name: impl Into<String>,
        config: &EntryPointsConfig,
        registry: Arc<ParsedQueryRegistry>,
        mut policies: Vec<Box<dyn QueryParsingPolicy>>,
    ) -> Self {
        let database_name = database_name.into();
        policies.push(Box::new(DefaultQueryParsingPolicy));

        Self {
            shared: Arc::new(TasShared {
                enabled: config.tas_enabled,
                parser_config: config.sql_parser.clone(),
                parser: SqlParser::new(config.sql_parser.worker_threads),
                cache: ParseResultCache::new(config.sql_parser.cache_size_mib),
                registry,
                policies,
                failed_parses: counter!(
                    names::FAILED_PARSES,
                    vec![Label::new(tags::DATABASE, database_name.clone())]
                ),
                access_counters: MeterCache::new(),
                first_access_timers: MeterCache::new(),
                uncounted_counters: MeterCache::new(),
                database_name,
            }),
        }
    }
}

impl DataSourceListener for TableAccessListener {
    fn on_connection_open(&self, _event: &ConnectionOpenEvent) -> Box<dyn ConnectionListener> {
        Box::new(TableAccessConnectionListener {
            shared: self.shared.clone(),
        })
    }
}

struct TableAccessConnectionListener {
    shared: Arc<TasShared>,
}

impl ConnectionListener for TableAccessConnectionListener {
    fn on_statement_execute(&mut self, event: &StatementExecuteEvent<'_>) {
        self.shared
            .process(event.sql, event.in_transaction, event.execution_time_ns, true);
    }

    fn on_statement_execute_failure(&mut self, event: &StatementExecuteFailureEvent<'_>) {
        self.shared
            .process(event.sql, event.in_transaction, event.execution_time_ns, false);
    }
}

impl TasShared {
    fn process(&self, sql: &str, in_transaction: bool, execution_time_ns: u64, success: bool) {
        if !self.enabled {
            return;
        }
        let parsing_enabled = Context::current()
            .map_or(true, |context| super::is_query_parsing_enabled(&context));

        let outcome = if parsing_enabled {
            self.classify(sql)
        } else {
            Some(EMPTY_PARSED.clone())
        };
        // Refreshed on every statement, skipped ones included, so the cache
        // gauges stay current under skip-heavy traffic.
        self.cache.record_metrics();

        let Some(parsed) = outcome else {
            return;
        };
        if parsed.table_access_count() == 0 {
            self.count_uncounted_query();
        } else {
            self.record_table_accesses(&parsed, in_transaction, execution_time_ns, success);
        }
    }

    /// Resolve a SQL text to its classification, or `None` when a policy
    /// decided the statement should not be counted at all.
    fn classify(&self, sql: &str) -> Option<Arc<ParsedQuery>> {
        if let Some(overridden) = self.registry.lookup(sql) {
            return Some(overridden);
        }
        for policy in &self.policies {
            match policy.evaluate(sql) {
                PolicyDecision::Continue => {}
                PolicyDecision::Skip => return None,
                PolicyDecision::Substitute(parsed) => return Some(Arc::new(parsed)),
            }
        }

        let outcome = self.cache.get_with(sql, || {
            let started = Instant::now();
            let result = self.parser.parse(sql, self.parser_config.timeout);
            let elapsed = started.elapsed();
            if elapsed > self.parser_config.parse_duration_warn_threshold {
                tracing::warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    sql,
                    "sql parsing took long"
                );
            }
            if let Err(error) = &result {
                self.failed_parses.increment(1);
                if self.parser_config.warn_about_failed_parses {
                    tracing::warn!(%error, sql, "failed to parse sql");
                } else {
                    tracing::debug!(%error, sql, "failed to parse sql");
                }
            }
            result
        });

        match outcome {
            Ok(parsed) => Some(parsed),
            // The failure is already counted and logged; an empty
            // classification routes the statement to the uncounted counter.
            Err(_) => Some(EMPTY_PARSED.clone()),
        }
    }

    fn record_table_accesses(
        &self,
        parsed: &ParsedQuery,
        in_transaction: bool,
        execution_time_ns: u64,
        success: bool,
    ) {
        let ep = EntryPointId::current();
        let in_transaction = if in_transaction { "true" } else { "false" };
        let success = if success { "true" } else { "false" };

        for (operation, tables) in parsed.operations() {
            for (index, table) in tables.tables().iter().enumerate() {
                let key = vec![
                    ep.group.clone(),
                    ep.name.clone(),
                    ep.owner.clone(),
                    operation.to_string(),
                    table.clone(),
                    in_transaction.to_string(),
                    success.to_string(),
                ];
                let counter = self.access_counters.get_or_create(key, || {
                    counter!(
                        names::TABLE_ACCESS,
                        vec![
                            Label::new(tags::DATABASE, self.database_name.clone()),
                            Label::new(tags::EP_GROUP, ep.group.clone()),
                            Label::new(tags::EP_NAME, ep.name.clone()),
                            Label::new(tags::EP_OWNER, ep.owner.clone()),
                            Label::new(tags::OPERATION, operation.to_string()),
                            Label::new(tags::TABLE, table.clone()),
                            Label::new(tags::IN_TRANSACTION, in_transaction),
                            Label::new(tags::SUCCESS, success),
                        ]
                    )
                });
                counter.increment(1);

                // The first table of an operation is its primary target; the
                // statement's execution time is attributed to it.
                if index == 0 {
                    let key = vec![
                        ep.group.clone(),
                        ep.name.clone(),
                        ep.owner.clone(),
                        operation.to_string(),
                        table.clone(),
                        in_transaction.to_string(),
                        success.to_string(),
                    ];
                    let timer = self.first_access_timers.get_or_create(key, || {
                        histogram!(
                            names::FIRST_TABLE_ACCESS,
                            vec![
                                Label::new(tags::DATABASE, self.database_name.clone()),
                                Label::new(tags::EP_GROUP, ep.group.clone()),
                                Label::new(tags::EP_NAME, ep.name.clone()),
                                Label::new(tags::EP_OWNER, ep.owner.clone()),
                                Label::new(tags::OPERATION, operation.to_string()),
                                Label::new(tags::TABLE, table.clone()),
                                Label::new(tags::IN_TRANSACTION, in_transaction),
                                Label::new(tags::SUCCESS, success),
                            ]
                        )
                    });
                    timer.record(execution_time_ns as f64);
                }
            }
        }
    }

    fn count_uncounted_query(&self) {
        let ep = EntryPointId::current();
        let key = vec![ep.group.clone(), ep.name.clone(), ep.owner.clone()];
        let counter = self.uncounted_counters.get_or_create(key, || {
            counter!(
                names::UNCOUNTED_QUERIES,
                vec![
                    Label::new(tags::DATABASE, self.database_name.clone()),
                    Label::new(tags::EP_GROUP, ep.group.clone()),
                    Label::new(tags::EP_NAME, ep.name.clone()),
                    Label::new(tags::EP_OWNER, ep.owner.clone()),
                ]
            )
        });
        counter.increment(1);
    }
}
