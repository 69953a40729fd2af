use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use lambdabox_core::{Job, RuntimeName};
use lambdabox_infra::queue::{InMemoryJobQueue, JobQueue};
use lambdabox_infra::results::{InMemoryResultStore, ResultPublisher};
use lambdabox_infra::workers::{InvocationWorker, WorkerOptions};
use lambdabox_sandbox::{Executor, InterpretedExecutor, InterpretedProfile};

const HANDLER: &str = "fn handler(e) { #{ score: e.score * 2 } }";

/// Queue → parse → execute → publish for a batch of jobs on one worker.
fn bench_sequential_worker(c: &mut Criterion) {
    let runtime: RuntimeName = "rhai".parse().unwrap();
    let mut group = c.benchmark_group("worker/sequential");

    for batch in [10_i64, 100] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            let queue = Arc::new(InMemoryJobQueue::new());
            let store = Arc::new(InMemoryResultStore::new());
            let executor: Arc<dyn Executor> = Arc::new(InterpretedExecutor::new(InterpretedProfile::default()));
            let worker = InvocationWorker::new(
                "bench",
                runtime.clone(),
                executor,
                queue.clone(),
                ResultPublisher::new(store),
            )
            .with_options(WorkerOptions {
                poll_timeout: Duration::from_millis(1),
                ..WorkerOptions::default()
            });

            b.iter(|| {
                for id in 0..batch {
                    queue.push_job(&runtime, &Job::new(id, HANDLER, json!({"score": id}))).unwrap();
                }
                for _ in 0..batch {
                    worker.tick();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sequential_worker);
criterion_main!(benches);
