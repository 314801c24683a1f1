//! Fork-join patterns (C7, spec.md §4.6): the primitives every benchmark
//! in `src/bin` and `tests/` is built from.
//!
//! Every pattern here forks through [`scheduler::join`] and fences through
//! whatever [`FencePolicy`] the runtime was configured with — patterns
//! never call [`Consistency::release`]/[`Consistency::acquire`] directly
//! except [`root_spawn`], which spec.md §4.6 names as the one pattern
//! allowed to bracket with the naive release/acquire pair. None of these
//! functions take a worker handle: [`scheduler::join`] resolves the
//! calling thread's own worker itself, since a forked closure may end up
//! resumed by a different thread than the one that forked it.

use crate::checkout::{with_checkout2, AccessMode, LocalView};
use crate::consistency::Consistency;
use crate::error::Result;
use crate::heap::GlobalHeap;
use crate::policy::FencePolicy;
use crate::ptr::GlobalPtr;
use crate::scheduler;
use crate::transport::Transport;

/// Fork two closures, fencing around the fork/join per `policy`. This is
/// the shared plumbing `parallel_invoke`, `parallel_for`, `parallel_reduce`
/// and `parallel_transform` all reduce to. Must be called from inside a
/// [`crate::scheduler::WorkerHandle::scope`].
fn fork<'b, T, A, B, RA, RB>(consistency: &Consistency<T>, policy: &dyn FencePolicy<T>, a: A, b: B) -> Result<(RA, RB)>
where
    T: Transport,
    A: FnOnce() -> RA,
    B: FnOnce() -> RB + Send + 'b,
    RB: Send + 'b,
{
    let handler = policy.spawn_aux(consistency)?;
    let spawn_ev = consistency.logger().map(|l| l.scope(crate::logger::EventKind::TaskSpawn));
    let (ra, rb, migrated) = scheduler::join(a, b);
    drop(spawn_ev);
    let _join_ev = consistency.logger().map(|l| l.scope(crate::logger::EventKind::TaskJoin));
    policy.join_aux(consistency, handler, migrated)?;
    Ok((ra, rb))
}

/// Degenerate one-task form: no sibling to fork against, so this just
/// calls `a` directly. Spec.md §4.6's "up to 8 sibling tasks" starts
/// here; `root_spawn`'s single callable (see the R3 property test in
/// `tests/properties.rs`) is this arity run at the top level.
pub fn parallel_invoke1<T, FA, RA>(_consistency: &Consistency<T>, _policy: &dyn FencePolicy<T>, a: FA) -> Result<RA>
where
    T: Transport,
    FA: FnOnce() -> RA,
{
    Ok(a())
}

/// Fork up to 8 sibling tasks (arity fixed at compile time, spec.md §4.6):
/// `parallel_invoke2`..`parallel_invoke8` below, each forking its first
/// closure against the others run in sequence on the other side of that
/// one fork. This mirrors the original's macro-generated
/// `ITYR_FORLOOP_*` overloads in shape (one function per arity) without a
/// generic tuple-flattening layer, which would be more machinery than the
/// fixed 1..=8 arities spec.md names are worth.
pub fn parallel_invoke2<T, FA, FB, RA, RB>(
    consistency: &Consistency<T>,
    policy: &dyn FencePolicy<T>,
    a: FA,
    b: FB,
) -> Result<(RA, RB)>
where
    T: Transport,
    FA: FnOnce() -> RA,
    FB: FnOnce() -> RB + Send,
    RB: Send,
{
    fork(consistency, policy, a, b)
}

pub fn parallel_invoke3<T, FA, FB, FC, RA, RB, RC>(
    consistency: &Consistency<T>,
    policy: &dyn FencePolicy<T>,
    a: FA,
    b: FB,
    c: FC,
) -> Result<(RA, RB, RC)>
where
    T: Transport,
    FA: FnOnce() -> RA,
    FB: FnOnce() -> RB + Send,
    FC: FnOnce() -> RC + Send,
    RB: Send,
    RC: Send,
{
    let (ra, (rb, rc)) = fork(consistency, policy, a, move || (b(), c()))?;
    Ok((ra, rb, rc))
}

pub fn parallel_invoke4<T, FA, FB, FC, FD, RA, RB, RC, RD>(
    consistency: &Consistency<T>,
    policy: &dyn FencePolicy<T>,
    a: FA,
    b: FB,
    c: FC,
    d: FD,
) -> Result<(RA, RB, RC, RD)>
where
    T: Transport,
    FA: FnOnce() -> RA,
    FB: FnOnce() -> RB + Send,
    FC: FnOnce() -> RC + Send,
    FD: FnOnce() -> RD + Send,
    RB: Send,
    RC: Send,
    RD: Send,
{
    let (ra, (rb, rc, rd)) = fork(consistency, policy, a, move || (b(), c(), d()))?;
    Ok((ra, rb, rc, rd))
}

#[allow(clippy::too_many_arguments)]
pub fn parallel_invoke5<T, FA, FB, FC, FD, FE, RA, RB, RC, RD, RE>(
    consistency: &Consistency<T>,
    policy: &dyn FencePolicy<T>,
    a: FA,
    b: FB,
    c: FC,
    d: FD,
    e: FE,
) -> Result<(RA, RB, RC, RD, RE)>
where
    T: Transport,
    FA: FnOnce() -> RA,
    FB: FnOnce() -> RB + Send,
    FC: FnOnce() -> RC + Send,
    FD: FnOnce() -> RD + Send,
    FE: FnOnce() -> RE + Send,
    RB: Send,
    RC: Send,
    RD: Send,
    RE: Send,
{
    let (ra, (rb, rc, rd, re)) = fork(consistency, policy, a, move || (b(), c(), d(), e()))?;
    Ok((ra, rb, rc, rd, re))
}

#[allow(clippy::too_many_arguments)]
pub fn parallel_invoke6<T, FA, FB, FC, FD, FE, FF, RA, RB, RC, RD, RE, RF>(
    consistency: &Consistency<T>,
    policy: &dyn FencePolicy<T>,
    a: FA,
    b: FB,
    c: FC,
    d: FD,
    e: FE,
    f: FF,
) -> Result<(RA, RB, RC, RD, RE, RF)>
where
    T: Transport,
    FA: FnOnce() -> RA,
    FB: FnOnce() -> RB + Send,
    FC: FnOnce() -> RC + Send,
    FD: FnOnce() -> RD + Send,
    FE: FnOnce() -> RE + Send,
    FF: FnOnce() -> RF + Send,
    RB: Send,
    RC: Send,
    RD: Send,
    RE: Send,
    RF: Send,
{
    let (ra, (rb, rc, rd, re, rf)) = fork(consistency, policy, a, move || (b(), c(), d(), e(), f()))?;
    Ok((ra, rb, rc, rd, re, rf))
}

#[allow(clippy::too_many_arguments)]
pub fn parallel_invoke7<T, FA, FB, FC, FD, FE, FF, FG, RA, RB, RC, RD, RE, RF, RG>(
    consistency: &Consistency<T>,
    policy: &dyn FencePolicy<T>,
    a: FA,
    b: FB,
    c: FC,
    d: FD,
    e: FE,
    f: FF,
    g: FG,
) -> Result<(RA, RB, RC, RD, RE, RF, RG)>
where
    T: Transport,
    FA: FnOnce() -> RA,
    FB: FnOnce() -> RB + Send,
    FC: FnOnce() -> RC + Send,
    FD: FnOnce() -> RD + Send,
    FE: FnOnce() -> RE + Send,
    FF: FnOnce() -> RF + Send,
    FG: FnOnce() -> RG + Send,
    RB: Send,
    RC: Send,
    RD: Send,
    RE: Send,
    RF: Send,
    RG: Send,
{
    let (ra, (rb, rc, rd, re, rf, rg)) = fork(consistency, policy, a, move || (b(), c(), d(), e(), f(), g()))?;
    Ok((ra, rb, rc, rd, re, rf, rg))
}

#[allow(clippy::too_many_arguments)]
pub fn parallel_invoke8<T, FA, FB, FC, FD, FE, FF, FG, FH, RA, RB, RC, RD, RE, RF, RG, RH>(
    consistency: &Consistency<T>,
    policy: &dyn FencePolicy<T>,
    a: FA,
    b: FB,
    c: FC,
    d: FD,
    e: FE,
    f: FF,
    g: FG,
    h: FH,
) -> Result<(RA, RB, RC, RD, RE, RF, RG, RH)>
where
    T: Transport,
    FA: FnOnce() -> RA,
    FB: FnOnce() -> RB + Send,
    FC: FnOnce() -> RC + Send,
    FD: FnOnce() -> RD + Send,
    FE: FnOnce() -> RE + Send,
    FF: FnOnce() -> RF + Send,
    FG: FnOnce() -> RG + Send,
    FH: FnOnce() -> RH + Send,
    RB: Send,
    RC: Send,
    RD: Send,
    RE: Send,
    RF: Send,
    RG: Send,
    RH: Send,
{
    let (ra, (rb, rc, rd, re, rf, rg, rh)) = fork(consistency, policy, a, move || (b(), c(), d(), e(), f(), g(), h()))?;
    Ok((ra, rb, rc, rd, re, rf, rg, rh))
}

/// Divide-and-conquer over an index range, with a sequential cutoff below
/// which no further forking happens. `body` receives `[start, end)`.
pub fn parallel_for<T>(
    consistency: &Consistency<T>,
    policy: &dyn FencePolicy<T>,
    range: std::ops::Range<u64>,
    cutoff: u64,
    body: &(dyn Fn(std::ops::Range<u64>) + Sync),
) -> Result<()>
where
    T: Transport,
{
    if range.end - range.start <= cutoff {
        body(range);
        return Ok(());
    }
    let mid = range.start + (range.end - range.start) / 2;
    let left = range.start..mid;
    let right = mid..range.end;

    // `&(dyn ... + Sync)` is itself `Send`, so the spawned side can
    // recurse on `right` through the same `body`/`consistency`/`policy`
    // references as the inline side.
    let (lr, rr) = fork(
        consistency,
        policy,
        || parallel_for(consistency, policy, left, cutoff, body),
        move || parallel_for(consistency, policy, right, cutoff, body),
    )?;
    lr?;
    rr?;
    Ok(())
}

/// Divide-and-conquer reduction: `transform_op(i)` produces the value at
/// index `i` and `combine` merges two partial results. spec.md §4.6 notes
/// `transform_op` defaults to the identity closure when the caller has no
/// transform to apply (pass `&|i| i` or equivalent, as `tests/reduce.rs`
/// does); the original's two overloads collapse to this one function.
pub fn parallel_reduce<T, Acc>(
    consistency: &Consistency<T>,
    policy: &dyn FencePolicy<T>,
    range: std::ops::Range<u64>,
    cutoff: u64,
    identity: Acc,
    combine: &(dyn Fn(Acc, Acc) -> Acc + Sync),
    transform_op: &(dyn Fn(u64) -> Acc + Sync),
) -> Result<Acc>
where
    T: Transport,
    Acc: Send + Clone,
{
    if range.end - range.start <= cutoff {
        let mut acc = identity;
        for i in range {
            acc = combine(acc, transform_op(i));
        }
        return Ok(acc);
    }
    let mid = range.start + (range.end - range.start) / 2;
    let identity_clone = identity.clone();

    let (left_acc, right_acc) = fork(
        consistency,
        policy,
        || parallel_reduce(consistency, policy, range.start..mid, cutoff, identity, combine, transform_op),
        move || parallel_reduce(consistency, policy, mid..range.end, cutoff, identity_clone, combine, transform_op),
    )?;
    Ok(combine(left_acc?, right_acc?))
}

/// Unary `parallel_transform`: apply `f` to every index in `range`.
/// Divide-and-conquer with sequential cutoff.
pub fn parallel_transform<T>(
    consistency: &Consistency<T>,
    policy: &dyn FencePolicy<T>,
    range: std::ops::Range<u64>,
    cutoff: u64,
    f: &(dyn Fn(u64) + Sync),
) -> Result<()>
where
    T: Transport,
{
    parallel_for(consistency, policy, range, cutoff, &|r| {
        for i in r {
            f(i);
        }
    })
}

/// Binary `parallel_transform`: reads one element of `src` and writes the
/// corresponding element of `dst` at every index in `range` (spec.md
/// §4.6's "binary variant reads two inputs"), e.g. zip-map. Unlike the
/// unary form, this drives the checkout itself via
/// [`crate::checkout::with_checkout2`] — `f` only sees the two
/// already-checked-out views, one open `Read` and one open `Write`.
#[allow(clippy::too_many_arguments)]
pub fn parallel_transform_binary<T, U, V>(
    consistency: &Consistency<T>,
    policy: &dyn FencePolicy<T>,
    heap: &GlobalHeap<T>,
    src: GlobalPtr<U>,
    dst: GlobalPtr<V>,
    range: std::ops::Range<u64>,
    cutoff: u64,
    epoch: u64,
    f: &(dyn Fn(&mut LocalView<'_, U, T>, &mut LocalView<'_, V, T>) + Sync),
) -> Result<()>
where
    T: Transport,
{
    parallel_for(consistency, policy, range, cutoff, &|r| {
        for i in r {
            with_checkout2(
                consistency.engine(),
                heap,
                src.offset(i as i64),
                1,
                AccessMode::Read,
                dst.offset(i as i64),
                1,
                AccessMode::Write,
                epoch,
                |s, d| f(s, d),
            )
            .expect("parallel_transform_binary: checkout failed");
        }
    })
}

/// The one entry point allowed to bracket with the naive release/acquire
/// pair directly instead of routing through a [`FencePolicy`] (spec.md
/// §4.6): the outermost `parallel_invoke`/`parallel_for`/... call in a
/// program is wrapped in `root_spawn` so the very first fork still starts
/// from a consistent cache state.
pub fn root_spawn<T, F, R>(consistency: &Consistency<T>, f: F) -> Result<R>
where
    T: Transport,
    F: FnOnce() -> Result<R>,
{
    consistency.release()?;
    let result = f();
    consistency.acquire();
    result
}
