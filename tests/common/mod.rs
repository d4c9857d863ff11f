#![allow(dead_code)]

//! A minimal in-memory stand-in for a driver wrapper: it executes nothing,
//! it only fires the listener events a real wrapper would.

use entrypoint_metrics::events::{
    ConnectionCloseEvent, ConnectionListener, ConnectionOpenEvent, DataSourceListener,
    RowsFetchedEvent, StatementExecuteEvent, StatementExecuteFailureEvent, TransactionBeginEvent,
    TransactionCommitEvent, TransactionRollbackEvent,
};
use metrics::Label;
use metrics_util::debugging::DebugValue;
use metrics_util::{CompositeKey, MetricKind};

/// Route library logs to the test output when RUST_LOG asks for them.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct TestDataSource {
    listeners: Vec<Box<dyn DataSourceListener>>,
}

impl TestDataSource {
    pub fn new(listeners: Vec<Box<dyn DataSourceListener>>) -> Self {
        Self { listeners }
    }

    pub fn connection(&self) -> TestConnection {
        let event = ConnectionOpenEvent {
            execution_time_ns: 1_000,
        };
        TestConnection {
            listeners: self
                .listeners
                .iter()
                .map(|listener| listener.on_connection_open(&event))
                .collect(),
            in_transaction: false,
            open: true,
        }
    }
}

pub struct TestConnection {
    listeners: Vec<Box<dyn ConnectionListener>>,
    in_transaction: bool,
    open: bool,
}

impl TestConnection {
    pub fn execute(&mut self, sql: &str, execution_time_ns: u64, affected_rows: u64) {
        let event = StatementExecuteEvent {
            sql,
            in_transaction: self.in_transaction,
            execution_time_ns,
            affected_rows,
        };
        for listener in &mut self.listeners {
            listener.on_statement_execute(&event);
        }
    }

    pub fn execute_failing(&mut self, sql: &str, execution_time_ns: u64) {
        let event = StatementExecuteFailureEvent {
            sql,
            in_transaction: self.in_transaction,
            execution_time_ns,
        };
        for listener in &mut self.listeners {
            listener.on_statement_execute_failure(&event);
        }
    }

    pub fn fetch(&mut self, rows: u64) {
        let event = RowsFetchedEvent { rows };
        for listener in &mut self.listeners {
            listener.on_rows_fetched(&event);
        }
    }

    pub fn begin(&mut self) {
        self.in_transaction = true;
        let event = TransactionBeginEvent::default();
        for listener in &mut self.listeners {
            listener.on_transaction_begin(&event);
        }
    }

    pub fn commit(&mut self, execution_time_ns: u64) {
        let event = TransactionCommitEvent { execution_time_ns };
        for listener in &mut self.listeners {
            listener.on_transaction_commit(&event);
        }
        self.in_transaction = false;
    }

    pub fn rollback(&mut self, execution_time_ns: u64) {
        let event = TransactionRollbackEvent { execution_time_ns };
        for listener in &mut self.listeners {
            listener.on_transaction_rollback(&event);
        }
        self.in_transaction = false;
    }

    pub fn close(&mut self, execution_time_ns: u64) {
        if !self.open {
            return;
        }
        self.open = false;
        let event = ConnectionCloseEvent { execution_time_ns };
        for listener in &mut self.listeners {
            listener.on_connection_close(&event);
        }
    }
}

impl Drop for TestConnection {
    fn drop(&mut self) {
        self.close(0);
    }
}

pub type Snapshot = Vec<(
    CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

fn matches(key: &CompositeKey, kind: MetricKind, name: &str, required: &[Label]) -> bool {
    if key.kind() != kind || key.key().name() != name {
        return false;
    }
    let labels: Vec<Label> = key.key().labels().cloned().collect();
    required.iter().all(|label| labels.contains(label))
}

/// The value of the first counter matching `name` and every given label.
pub fn counter_value(snapshot: &Snapshot, name: &str, required: &[Label]) -> Option<u64> {
    snapshot.iter().find_map(|(key, _, _, value)| {
        if !matches(key, MetricKind::Counter, name, required) {
            return None;
        }
        match value {
            DebugValue::Counter(v) => Some(*v),
            _ => None,
        }
    })
}

pub fn gauge_value(snapshot: &Snapshot, name: &str, required: &[Label]) -> Option<f64> {
    snapshot.iter().find_map(|(key, _, _, value)| {
        if !matches(key, MetricKind::Gauge, name, required) {
            return None;
        }
        match value {
            DebugValue::Gauge(v) => Some(v.into_inner()),
            _ => None,
        }
    })
}

/// All samples recorded into the first histogram matching `name` and every
/// given label.
pub fn histogram_samples(snapshot: &Snapshot, name: &str, required: &[Label]) -> Vec<f64> {
    snapshot
        .iter()
        .find_map(|(key, _, _, value)| {
            if !matches(key, MetricKind::Histogram, name, required) {
                return None;
            }
            match value {
                DebugValue::Histogram(samples) => {
                    Some(samples.iter().map(|v| v.into_inner()).collect())
                }
                _ => None,
            }
        })
        .unwrap_or_default()
}
