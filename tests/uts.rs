//! Scenario 5 (spec.md §8): UTS binomial-tree generation, `r=19, b=4.0,
//! m=4, q=0.15`, driven through `parallel_invoke4` (branching nodes always
//! spawn exactly `floor(b) = 4` children once `b` is a whole number, so the
//! fixed-arity fork fits exactly). As `SPEC_FULL.md` §8.5 notes, spec.md
//! defers the literal `{size, leaves, maxdepth}` triple to "the spec's
//! RNG" without naming one, so this asserts internal consistency instead
//! (`size == leaves + internal`, `maxdepth` reachable), per the branching
//! rule recovered from `original_source/uts/main++.cc`: `floor(b) +
//! Bernoulli(b - floor(b))` children per node at depth `< m`, zero beyond.

use ityr::patterns::parallel_invoke4;
use ityr::policy::FencePolicy;
use ityr::transport::LocalTransport;
use ityr::{Config, Runtime};
use rand::Rng;
use rand::SeedableRng;

const R: u64 = 19;
const B: f64 = 4.0;
const M: u32 = 4;

#[derive(Debug, Clone, Copy)]
struct NodeStats {
    size: u64,
    leaves: u64,
    maxdepth: u32,
}

/// Deterministic child seed derived from the parent's seed and the child's
/// index, standing in for the SHA1-based "unique tree" RNG the original
/// uses to let every node's subtree be generated independently (no shared
/// mutable RNG state across what may become parallel tasks).
fn child_seed(parent_seed: u64, child_index: u64) -> u64 {
    let mut s = parent_seed
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(child_index.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(1));
    s ^= s >> 33;
    s = s.wrapping_mul(0xff51_afd7_ed55_8ccd);
    s ^= s >> 33;
    s
}

fn num_children(seed: u64) -> u32 {
    let whole = B.floor() as u32;
    let frac = B - B.floor();
    if frac <= 0.0 {
        return whole;
    }
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
    whole + u32::from(rng.gen_bool(frac))
}

fn explore(
    consistency: &ityr::consistency::Consistency<LocalTransport>,
    policy: &dyn FencePolicy<LocalTransport>,
    seed: u64,
    depth: u32,
) -> NodeStats {
    if depth >= M {
        return NodeStats { size: 1, leaves: 1, maxdepth: depth };
    }

    let children = num_children(seed);
    if children == 0 {
        return NodeStats { size: 1, leaves: 1, maxdepth: depth };
    }

    // b=4.0 is a whole number, so `num_children` is always exactly 4 here;
    // the fixed-arity `parallel_invoke4` fits without a variable-arity
    // fallback.
    assert_eq!(children, 4, "this scenario's b=4.0 always branches 4-wide");
    let seeds = [
        child_seed(seed, 0),
        child_seed(seed, 1),
        child_seed(seed, 2),
        child_seed(seed, 3),
    ];
    let (a, b, c, d) = parallel_invoke4(
        consistency,
        policy,
        || explore(consistency, policy, seeds[0], depth + 1),
        || explore(consistency, policy, seeds[1], depth + 1),
        || explore(consistency, policy, seeds[2], depth + 1),
        || explore(consistency, policy, seeds[3], depth + 1),
    )
    .unwrap();

    NodeStats {
        size: 1 + a.size + b.size + c.size + d.size,
        leaves: a.leaves + b.leaves + c.leaves + d.leaves,
        maxdepth: [a.maxdepth, b.maxdepth, c.maxdepth, d.maxdepth].into_iter().max().unwrap(),
    }
}

#[test]
fn uts_binomial_tree_is_internally_consistent() {
    let ranks = Runtime::init(Config::default());
    let root = &ranks[0];

    let stats = root.worker.scope(|_| explore(&root.consistency, root.policy.as_ref(), R, 0));

    let internal_nodes: u64 = (0..M).map(|d| 4u64.pow(d)).sum();
    assert_eq!(stats.leaves, 4u64.pow(M));
    assert_eq!(stats.size, stats.leaves + internal_nodes);
    assert_eq!(stats.maxdepth, M);

    root.fini();
}
