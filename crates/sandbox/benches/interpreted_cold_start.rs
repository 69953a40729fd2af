use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use lambdabox_sandbox::{Executor, InterpretedExecutor, InterpretedProfile};

const DOUBLE_SCORE: &str = r#"
fn handler(event) {
    print("doubling");
    #{ score: event.score * 2 }
}
"#;

const LOOP_SUM: &str = r#"
fn handler(event) {
    let total = 0;
    for i in 0..event.n { total += i; }
    #{ total: total }
}
"#;

/// Every call builds a fresh engine, so this is the per-invocation floor.
fn bench_cold_start(c: &mut Criterion) {
    let exec = InterpretedExecutor::new(InterpretedProfile::default());
    let input = json!({"score": 5});

    c.bench_function("interpreted/double_score", |b| {
        b.iter(|| exec.execute(black_box(DOUBLE_SCORE), black_box(&input)));
    });
}

fn bench_loop_sizes(c: &mut Criterion) {
    let exec = InterpretedExecutor::new(InterpretedProfile::default());
    let mut group = c.benchmark_group("interpreted/loop_sum");

    for n in [100_u64, 10_000, 100_000] {
        let input = json!({"n": n});
        group.bench_with_input(BenchmarkId::from_parameter(n), &input, |b, input| {
            b.iter(|| exec.execute(LOOP_SUM, black_box(input)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cold_start, bench_loop_sizes);
criterion_main!(benches);
