//! Scenario 6 and property P1 (spec.md §8, §5): worker 0 writes `1..=N` to
//! a collectively-allocated `G_span`, releases; worker 1 acquires and reads
//! the same values — "read-your-(released-)writes" across two simulated
//! ranks of `LocalTransport`.

use std::sync::Arc;

use ityr::checkout::{with_checkout, AccessMode};
use ityr::containers::GlobalSpan;
use ityr::heap::GlobalHeap;
use ityr::mapper::Cyclic;
use ityr::ptr::GlobalPtr;
use ityr::{Config, Runtime};

const N: u64 = 2000;

#[test]
fn release_then_acquire_observes_writer_values() {
    let mut config = Config::default();
    config.n_ranks = 2;
    let mut ranks = Runtime::init(config).into_iter();
    let rank0 = ranks.next().unwrap();
    let rank1 = ranks.next().unwrap();

    // Collective allocation: both ranks must call `alloc` together since
    // it barriers internally (spec.md §4.1).
    let h0 = std::thread::spawn(move || {
        let ptr: GlobalPtr<u64> = rank0.heap.alloc(N, Arc::new(Cyclic)).unwrap();
        let span = GlobalSpan::new(ptr, N);

        rank0.worker.scope(|_| {
            for i in 0..N {
                with_checkout(
                    rank0.consistency.engine(),
                    &rank0.heap,
                    ptr.offset(i as i64),
                    1,
                    AccessMode::Write,
                    0,
                    |view| view.write_bytes(&(i + 1).to_ne_bytes()),
                )
                .unwrap();
            }
        });
        rank0.consistency.release().unwrap();
        rank0.heap.transport().barrier();
        (rank0, span)
    });

    let h1 = std::thread::spawn(move || {
        let ptr: GlobalPtr<u64> = rank1.heap.alloc(N, Arc::new(Cyclic)).unwrap();
        let span = GlobalSpan::new(ptr, N);
        rank1.heap.transport().barrier();
        rank1.consistency.acquire();
        let sum = span
            .reduce(rank1.consistency.engine(), &rank1.heap, 0, 0u64, &|acc, v: u64| acc + v)
            .unwrap();
        (rank1, sum)
    });

    let (rank0, _span0) = h0.join().unwrap();
    let (rank1, sum) = h1.join().unwrap();

    assert_eq!(sum, N * (N + 1) / 2);

    rank0.fini();
    rank1.fini();
}
