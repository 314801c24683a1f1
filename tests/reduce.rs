//! Scenario 3 and property P4 (spec.md §8): `parallel_reduce(0..1_000_000,
//! 0, +, id) == 499_999_500_000`, and the same result regardless of cutoff
//! (P4: "for any legal cutoff").

use ityr::patterns::parallel_reduce;
use ityr::{Config, Runtime};

#[test]
fn parallel_reduce_sums_range_for_any_cutoff() {
    let ranks = Runtime::init(Config::default());
    let root = &ranks[0];

    let expected: u64 = (0..1_000_000u64).sum();
    assert_eq!(expected, 499_999_500_000);

    for cutoff in [1u64, 7, 64, 10_000, 1_000_000] {
        let sum = root.worker.scope(|_| {
            parallel_reduce::<_, u64>(
                &root.consistency,
                root.policy.as_ref(),
                0..1_000_000,
                cutoff,
                0u64,
                &|a, b| a + b,
                &|i| i,
            )
            .unwrap()
        });
        assert_eq!(sum, expected, "mismatch at cutoff={cutoff}");
    }

    root.fini();
}
