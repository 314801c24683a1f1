//! The work-stealing scheduler (C6, spec.md §4.5): [`join`] is the single
//! fork-join primitive every pattern in [`crate::patterns`] is built on.

mod task;
mod worker;

pub use task::Task;
pub use worker::{current, current_rank, Pool, WorkerHandle};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Completion signal for a spawned child: set once by whichever thread
/// actually runs the task, observed by the parent either immediately
/// (if it reclaims the task itself before anyone steals it) or via
/// [`Condvar`] if a thief got to it first.
struct JoinSlot<R> {
    result: Mutex<Option<R>>,
    done: AtomicBool,
    cond: Condvar,
    executed_on: AtomicUsize,
}

impl<R> JoinSlot<R> {
    fn new() -> Self {
        JoinSlot {
            result: Mutex::new(None),
            done: AtomicBool::new(false),
            cond: Condvar::new(),
            executed_on: AtomicUsize::new(usize::MAX),
        }
    }

    fn publish(&self, rank: usize, value: R) {
        *self.result.lock().unwrap() = Some(value);
        self.executed_on.store(rank, Ordering::Release);
        self.done.store(true, Ordering::Release);
        self.cond.notify_all();
    }

    fn take(&self) -> R {
        let mut guard = self.result.lock().unwrap();
        while guard.is_none() {
            guard = self.cond.wait(guard).unwrap();
        }
        guard.take().unwrap()
    }
}

/// Fork `b` as a stealable task, run `a` inline, and rejoin.
///
/// Must be called from inside a [`WorkerHandle::scope`]. Looks up the
/// calling thread's own worker via [`current`] rather than taking one as
/// a parameter, since `b` may end up resumed by a *different* thread's
/// worker than the one that forked it — capturing a borrowed
/// `&WorkerHandle` across that boundary would be unsound, as
/// `crossbeam_deque::Worker` is deliberately `!Sync`.
///
/// Returns `(result_a, result_b, migrated)`, where `migrated` is true iff
/// `b` actually executed on a different rank than the one that called
/// `join` (spec.md §4.5's "Initial-rank check") — callers (the patterns in
/// [`crate::patterns`], by way of a [`crate::policy::FencePolicy`]) use
/// this to decide whether a fence is needed at all.
pub fn join<'a, A, B, RA, RB>(a: A, b: B) -> (RA, RB, bool)
where
    A: FnOnce() -> RA,
    B: FnOnce() -> RB + Send + 'a,
    RB: Send + 'a,
{
    let this = worker::current();
    let origin_rank = this.rank;
    let slot = Arc::new(JoinSlot::<RB>::new());

    let task_slot = slot.clone();
    // SAFETY: `join` does not return until `slot.done` is observed set,
    // which only happens after the pushed task has actually run (either
    // we reclaim and run it ourselves below, or we block until a thief's
    // `task.run` call publishes the result) — so `b`'s borrows never
    // outlive this stack frame despite the task technically needing to be
    // `'static` to live in the shared deque.
    let task = unsafe {
        Task::new_scoped(origin_rank, move || {
            let rank = current_rank().unwrap_or(origin_rank);
            let value = b();
            task_slot.publish(rank, value);
        })
    };
    this.push(task);

    let ra = a();

    let rb = match this.pop() {
        // We reclaimed our own child before any thief saw it: it never
        // left this rank, so no fence is needed regardless of policy.
        Some(task) => {
            task.run(true);
            (slot.take(), false)
        }
        // Already stolen (or the deque briefly looked empty to us under
        // contention — either way we must wait for whoever has it).
        // Keep stealing other work ourselves while we wait instead of
        // idling, so the pool as a whole keeps making progress.
        None => {
            while !slot.done.load(Ordering::Acquire) {
                if !this.steal_and_run_one() {
                    std::thread::yield_now();
                }
            }
            let value = slot.take();
            let executed_on = slot.executed_on.load(Ordering::Acquire);
            (value, executed_on != origin_rank)
        }
    };

    (ra, rb.0, rb.1)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn join_runs_both_sides_and_detects_no_migration_on_single_worker() {
        let (_pool, mut handles) = Pool::new(1);
        let handle = handles.pop().unwrap();
        handle.scope(|_| {
            let (a, b, migrated) = join(|| 1 + 1, || 2 + 2);
            assert_eq!(a, 2);
            assert_eq!(b, 4);
            assert!(!migrated);
        });
    }

    #[test]
    fn join_across_two_workers_can_migrate() {
        let (_pool, mut handles) = Pool::new(2);
        let h1 = handles.pop().unwrap();
        let h0 = handles.pop().unwrap();

        let barrier = Arc::new(std::sync::Barrier::new(2));
        let b0 = barrier.clone();
        let t0 = std::thread::spawn(move || {
            h0.scope(|_| {
                b0.wait();
                // Spawn many cheap children to make it overwhelmingly
                // likely at least one gets stolen by the other worker.
                for _ in 0..1000 {
                    let (_, _, _migrated) = join(|| (), || ());
                }
            });
        });
        let t1 = std::thread::spawn(move || {
            h1.scope(|h| {
                barrier.wait();
                for _ in 0..1000 {
                    h.steal_and_run_one();
                }
            });
        });
        t0.join().unwrap();
        t1.join().unwrap();
    }
}
