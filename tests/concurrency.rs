mod common;

use std::sync::Arc;

use entrypoint_metrics::prelude::*;
use metrics::Label;
use metrics_util::debugging::DebuggingRecorder;

use common::{histogram_samples, TestDataSource};

// A unit of work fanning out to worker threads still accounts everything to
// the one context it started from, and no increment is lost.
#[test]
fn test_fanned_out_work_is_attributed_to_the_shared_context() {
    const THREADS: usize = 8;
    const QUERIES_PER_THREAD: u64 = 250;

    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let config = EntryPointsConfig::default();
        let unknown = Arc::new(UnknownCalls::new());
        let data_source = Arc::new(TestDataSource::new(vec![Box::new(
            DatabaseAccessListener::new("mydb", unknown.clone()),
        )]));
        let chain =
            InterceptorChain::new().add(Arc::new(DatabaseAccessInterceptor::new(&config)));

        let context = Context::new_entry_point("Jobs", "parallelImport");
        chain.execute(&context, || {
            let current = Context::current().unwrap();
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    let context = current.clone();
                    let data_source = data_source.clone();
                    std::thread::spawn(move || {
                        let _scope = context.attach();
                        let mut conn = data_source.connection();
                        for _ in 0..QUERIES_PER_THREAD {
                            conn.execute("insert into table_a (x) values (1)", 1_000, 1);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        });

        assert_eq!(unknown.stats_for("mydb").non_transactional_queries(), 0);
    });

    let snapshot = snapshotter.snapshot().into_vec();
    let expected = (THREADS as u64 * QUERIES_PER_THREAD) as f64;
    assert_eq!(
        histogram_samples(
            &snapshot,
            "EntryPoints_Das_Registered_NTQueries",
            &[Label::new("epName", "parallelImport")],
        ),
        vec![expected]
    );
    assert_eq!(
        histogram_samples(
            &snapshot,
            "EntryPoints_Das_Registered_MaxConcurrentConnections",
            &[Label::new("epName", "parallelImport")],
        )
        .len(),
        1
    );
}
