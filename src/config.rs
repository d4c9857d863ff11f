//! Configuration for the statistics families.

use std::time::Duration;

/// Configuration options for entry-point database statistics.
///
/// # Example
///
/// ```rust
/// use entrypoint_metrics::EntryPointsConfig;
/// use std::time::Duration;
///
/// let config = EntryPointsConfig::default()
///     .with_sql_parser_timeout(Duration::from_secs(2))
///     .with_sql_parser_cache_size_mib(10);
/// ```
#[derive(Debug, Clone)]
pub struct EntryPointsConfig {
    /// Whether database access statistics (per-context counters) are collected.
    /// Default: `true`
    pub das_enabled: bool,

    /// Whether table access statistics (SQL classification) are collected.
    /// Default: `true`
    pub tas_enabled: bool,

    /// SQL parser tuning for table access statistics.
    pub sql_parser: SqlParserConfig,

    /// How often the background collector drains statistics accumulated
    /// outside of any entry point.
    /// Default: 1s
    pub unknown_calls_interval: Duration,
}

/// Tuning knobs for the SQL statement classifier.
#[derive(Debug, Clone)]
pub struct SqlParserConfig {
    /// Total weight bound of the parse-result cache, in MiB.
    /// Entries are weighed by the byte length of their SQL text.
    /// Default: 50
    pub cache_size_mib: u64,

    /// Hard limit for a single parse. A parse exceeding it is abandoned and
    /// counted as a failed parse. Bounds the damage of pathological inputs
    /// that trigger catastrophic backtracking in the grammar.
    /// Default: 5s
    pub timeout: Duration,

    /// If parsing takes longer than this, the service owner would want to
    /// know about it, even when the parse eventually succeeds.
    /// Default: 1s
    pub parse_duration_warn_threshold: Duration,

    /// Log failed parses at WARN instead of DEBUG.
    /// Default: `true`
    pub warn_about_failed_parses: bool,

    /// Number of parser worker threads. Parses run on these workers so the
    /// calling thread can abandon them on timeout.
    /// Default: 2
    pub worker_threads: usize,
}

impl Default for EntryPointsConfig {
    fn default() -> Self {
        Self {
            das_enabled: true,
            tas_enabled: true,
            sql_parser: SqlParserConfig::default(),
            unknown_calls_interval: Duration::from_secs(1),
        }
    }
}

impl Default for SqlParserConfig {
    fn default() -> Self {
        Self {
            cache_size_mib: 50,
            timeout: Duration::from_secs(5),
            parse_duration_warn_threshold: Duration::from_secs(1),
            warn_about_failed_parses: true,
            worker_threads: 2,
        }
    }
}

impl EntryPointsConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable database access statistics.
    pub fn with_das_enabled(mut self, enabled: bool) -> Self {
        self.das_enabled = enabled;
        self
    }

    /// Enable or disable table access statistics.
    pub fn with_tas_enabled(mut self, enabled: bool) -> Self {
        self.tas_enabled = enabled;
        self
    }

    /// Set the parse-result cache weight bound, in MiB.
    pub fn with_sql_parser_cache_size_mib(mut self, mib: u64) -> Self {
        self.sql_parser.cache_size_mib = mib;
        self
    }

    /// Set the hard timeout for a single SQL parse.
    pub fn with_sql_parser_timeout(mut self, timeout: Duration) -> Self {
        self.sql_parser.timeout = timeout;
        self
    }

    /// Set the threshold above which a successful parse is logged as slow.
    pub fn with_parse_duration_warn_threshold(mut self, threshold: Duration) -> Self {
        self.sql_parser.parse_duration_warn_threshold = threshold;
        self
    }

    /// Log failed parses at WARN instead of DEBUG.
    pub fn with_warn_about_failed_parses(mut self, enabled: bool) -> Self {
        self.sql_parser.warn_about_failed_parses = enabled;
        self
    }

    /// Set the number of SQL parser worker threads.
    pub fn with_sql_parser_worker_threads(mut self, threads: usize) -> Self {
        self.sql_parser.worker_threads = threads;
        self
    }

    /// Set the drain interval of the unknown-calls collector.
    pub fn with_unknown_calls_interval(mut self, interval: Duration) -> Self {
        self.unknown_calls_interval = interval;
        self
    }
}
