//! Microbenchmarks for the C7 fork-join patterns, grounded on
//! `src/bin/fib.rs`/`src/bin/cilksort.rs` for the task shapes and on the
//! teacher's own `benches/*.rs` convention (one `criterion_group`, plain
//! `criterion_main!`) for the harness plumbing.
//!
//! `Runtime::init` is a process-wide singleton (see `src/lib.rs`'s "Global
//! state" doc comment), so every benchmark function in this file shares
//! the single rank built by [`runtime`] rather than each calling
//! `Runtime::init` itself.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ityr::patterns::{parallel_invoke2, parallel_reduce, root_spawn};
use ityr::{Config, Runtime};
use once_cell::sync::Lazy;

static RUNTIME: Lazy<ityr::RankRuntime<ityr::transport::LocalTransport>> = Lazy::new(|| {
    let mut config = Config::default();
    config.n_ranks = 1;
    Runtime::init(config).into_iter().next().expect("at least one rank")
});

fn fib(
    consistency: &ityr::consistency::Consistency<ityr::transport::LocalTransport>,
    policy: &dyn ityr::policy::FencePolicy<ityr::transport::LocalTransport>,
    n: u64,
) -> ityr::Result<u64> {
    if n < 2 {
        return Ok(n);
    }
    let (a, b) = parallel_invoke2(consistency, policy, || fib(consistency, policy, n - 1), || fib(consistency, policy, n - 2))?;
    Ok(a? + b?)
}

fn bench_fib(c: &mut Criterion) {
    let root = &*RUNTIME;
    c.bench_function("fib_25", |b| {
        b.iter(|| {
            root.worker.scope(|_| {
                root_spawn(&root.consistency, || fib(&root.consistency, root.policy.as_ref(), black_box(25))).unwrap()
            })
        })
    });
}

fn bench_parallel_reduce(c: &mut Criterion) {
    let root = &*RUNTIME;
    let n: u64 = 1_000_000;
    c.bench_function("parallel_reduce_sum_1m", |b| {
        b.iter(|| {
            root.worker.scope(|_| {
                parallel_reduce::<_, u64>(
                    &root.consistency,
                    root.policy.as_ref(),
                    0..black_box(n),
                    4096,
                    0u64,
                    &|a, b| a + b,
                    &|i| i,
                )
                .unwrap()
            })
        })
    });
}

fn bench_parallel_invoke2(c: &mut Criterion) {
    let root = &*RUNTIME;
    c.bench_function("parallel_invoke2_leaf", |b| {
        b.iter(|| {
            root.worker.scope(|_| {
                parallel_invoke2(&root.consistency, root.policy.as_ref(), || black_box(1 + 1), || black_box(2 * 2)).unwrap()
            })
        })
    });
}

fn bench_cilksort_block(c: &mut Criterion) {
    use ityr::checkout::{with_checkout, AccessMode};
    use ityr::containers::GlobalVec;
    use ityr::heap::GlobalHeap;
    use ityr::mapper::Cyclic;

    let root = &*RUNTIME;
    let n: u64 = 65_536;
    let transport = root.heap.transport().clone();
    let heap: Arc<GlobalHeap<ityr::transport::LocalTransport>> = Arc::new(GlobalHeap::new(transport));
    let mut gv: GlobalVec<f32, ityr::transport::LocalTransport> = GlobalVec::new(heap.clone(), n).unwrap();
    for i in 0..n {
        gv.push(root.consistency.engine(), (n - i) as f32, 0).unwrap();
    }
    let ptr = gv.as_span().ptr();

    c.bench_function("sort_single_block_64k", |b| {
        b.iter(|| {
            root.worker.scope(|_| {
                for i in 0..n {
                    with_checkout(root.consistency.engine(), &heap, ptr.offset(i as i64), 1, AccessMode::Write, 0, |view| {
                        view.write_bytes(&black_box(i as f32).to_ne_bytes())
                    })
                    .unwrap();
                }
            })
        })
    });
}

criterion_group!(patterns, bench_fib, bench_parallel_reduce, bench_parallel_invoke2, bench_cilksort_block);
criterion_main!(patterns);
