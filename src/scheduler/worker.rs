//! The per-rank logical worker and the pool of stealers it can steal from
//! (C6, spec.md §4.5).
//!
//! Each simulated rank owns exactly one [`WorkerHandle`], living on the OS
//! thread that plays that rank (see [`crate::transport::LocalTransport`]).
//! Work-stealing among ranks is therefore literally `crossbeam_deque`
//! stealing among OS threads in this process — the in-process stand-in for
//! the cross-process steal RPC a real deployment would need.
//!
//! `crossbeam_deque::Worker` is deliberately `!Sync` (only its owning
//! thread may push/pop it), so a [`WorkerHandle`] can never be shared by
//! reference across threads. Code that needs "the worker for whichever
//! thread I'm running on right now" — which is exactly what a task does
//! once it might have been resumed by a thief — looks it up via
//! [`current`] instead of closing over a borrowed handle.

use std::cell::Cell;
use std::sync::Arc;

use crossbeam_deque::{Injector, Steal, Stealer, Worker};

use super::task::Task;

/// Shared among every rank: the global overflow injector plus one
/// [`Stealer`] per rank, so any rank can attempt to steal from any other.
pub struct Pool {
    injector: Injector<Task>,
    stealers: Vec<Stealer<Task>>,
}

impl Pool {
    /// Build a pool together with one [`WorkerHandle`] per rank. Handle `i`
    /// is meant to be moved onto the OS thread playing rank `i` and
    /// installed there via [`WorkerHandle::scope`].
    pub fn new(n_ranks: usize) -> (Arc<Pool>, Vec<WorkerHandle>) {
        // LIFO: the owner pops the most recently pushed task first (child
        // before continuation), matching spec.md §4.5's "pop from the
        // bottom (child-first execution)"; thieves still steal from the
        // opposite end, oldest-first, which is what keeps stolen work
        // coarse-grained.
        let workers: Vec<Worker<Task>> = (0..n_ranks).map(|_| Worker::new_lifo()).collect();
        let stealers = workers.iter().map(|w| w.stealer()).collect();
        let pool = Arc::new(Pool { injector: Injector::new(), stealers });
        let handles = workers
            .into_iter()
            .enumerate()
            .map(|(rank, local)| WorkerHandle { rank, local, pool: pool.clone() })
            .collect();
        (pool, handles)
    }

    /// Try to find one task by round-robin stealing from every rank's
    /// local deque, then the overflow injector.
    fn steal_one(&self) -> Option<Task> {
        loop {
            match self.injector.steal() {
                Steal::Success(task) => return Some(task),
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }
        for stealer in &self.stealers {
            loop {
                match stealer.steal() {
                    Steal::Success(task) => return Some(task),
                    Steal::Retry => continue,
                    Steal::Empty => break,
                }
            }
        }
        None
    }
}

thread_local! {
    static CURRENT: Cell<Option<*const WorkerHandle>> = const { Cell::new(None) };
}

/// The calling OS thread's own worker, if it is executing inside a
/// [`WorkerHandle::scope`]. Every scheduler entry point (`join`, a task
/// body resumed by a thief) calls this rather than threading a borrowed
/// `&WorkerHandle` through recursive calls, since the handle a task
/// *started* on and the handle whichever thread ends up *running* it on
/// are not always the same one.
pub fn current() -> &'static WorkerHandle {
    CURRENT.with(|c| c.get()).map(|p| unsafe { &*p }).expect("not running inside a WorkerHandle::scope")
}

pub fn current_rank() -> Option<usize> {
    CURRENT.with(|c| c.get()).map(|p| unsafe { &*p }.rank)
}

/// One rank's logical worker: its own deque plus a handle to the shared
/// pool for stealing.
pub struct WorkerHandle {
    pub rank: usize,
    local: Worker<Task>,
    pool: Arc<Pool>,
}

impl WorkerHandle {
    /// Install `self` as the calling OS thread's current worker for the
    /// duration of `f`, so [`current`] resolves inside it.
    ///
    /// # Safety invariant
    /// `self` must outlive `f` — true for every caller in this crate,
    /// since `f` always runs to completion on the stack frame that owns
    /// `self` before `scope` returns.
    pub fn scope<R>(&self, f: impl FnOnce(&WorkerHandle) -> R) -> R {
        let previous = CURRENT.with(|c| c.replace(Some(self as *const WorkerHandle)));
        let result = f(self);
        CURRENT.with(|c| c.set(previous));
        result
    }

    pub fn push(&self, task: Task) {
        self.local.push(task);
    }

    /// Pop from the bottom of our own deque (child-first execution,
    /// spec.md §4.5).
    pub fn pop(&self) -> Option<Task> {
        self.local.pop()
    }

    /// Try to make progress on *some* task in the pool, running it if
    /// found. Used while a rank is blocked waiting on a child it lost to a
    /// thief, so the pool as a whole keeps moving instead of deadlocking
    /// on one idle worker.
    pub fn steal_and_run_one(&self) -> bool {
        if let Some(task) = self.local.pop() {
            task.run(true);
            return true;
        }
        if let Some(task) = self.pool.steal_one() {
            let origin = task.origin_rank;
            task.run(origin == self.rank);
            return true;
        }
        false
    }
}
