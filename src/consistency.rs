//! Whole-cache release/acquire operations (C4, spec.md §4.3).
//!
//! The [`cache::Engine`] owns per-block state; this module owns the
//! process-wide operations a task actually calls (`release`, `release_lazy`,
//! `acquire`, `poll`) and the epoch counter that makes `release_lazy` +
//! `acquire(handler)` cheaper than a full flush. Grounded on
//! `pcas::release_handler` as referenced from `ityr/iro.hpp`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::instrument;

use crate::cache::Engine;
use crate::error::Result;
use crate::logger::{EventKind, Logger};
use crate::transport::Transport;

/// A snapshot of the release-epoch counter taken by [`Consistency::release_lazy`].
///
/// Passing this to [`Consistency::acquire_with`] bounds the writeback to
/// only those blocks dirtied at or before the snapshot, instead of
/// flushing the entire cache — the lazy half of the work-first-lazy fence
/// policy (C8) relies on this to avoid a full release on every task join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseHandler(pub(crate) u64);

/// Wraps an [`Engine`] with the release/acquire operations spec.md §4.3
/// names at the whole-cache level.
pub struct Consistency<T: Transport> {
    engine: Engine<T>,
    epoch: AtomicU64,
    logger: OnceCell<Arc<Logger>>,
}

impl<T: Transport> Consistency<T> {
    pub fn new(engine: Engine<T>) -> Self {
        Consistency { engine, epoch: AtomicU64::new(0), logger: OnceCell::new() }
    }

    pub fn engine(&self) -> &Engine<T> {
        &self.engine
    }

    /// Attach the per-rank event recorder, sharing it with this
    /// consistency's own [`Engine`] so release/acquire and the cache
    /// fetch/writeback/evict events it triggers land in the same backend.
    /// Called once by [`crate::Runtime::init`].
    pub fn attach_logger(&self, logger: Arc<Logger>) {
        self.engine.attach_logger(logger.clone());
        let _ = self.logger.set(logger);
    }

    /// The attached logger, if any — [`crate::patterns::fork`] uses this to
    /// time the task-spawn/task-join half of [`crate::scheduler::join`]
    /// without threading a separate logger parameter through every pattern.
    pub(crate) fn logger(&self) -> Option<&Arc<Logger>> {
        self.logger.get()
    }

    /// Flush every dirty block so a subsequent `acquire` elsewhere observes
    /// this process's writes.
    #[instrument(skip(self))]
    pub fn release(&self) -> Result<()> {
        let _ev = self.logger.get().map(|l| l.scope(EventKind::Release));
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.engine.release_all()
    }

    /// Snapshot the current epoch without flushing. Pair with
    /// [`Consistency::acquire_with`] to defer the writeback to whichever
    /// later acquire actually needs it (work-first-lazy, C8).
    #[instrument(skip(self))]
    pub fn release_lazy(&self) -> ReleaseHandler {
        ReleaseHandler(self.epoch.fetch_add(1, Ordering::AcqRel))
    }

    /// Invalidate every clean block so the next checkout re-fetches.
    #[instrument(skip(self))]
    pub fn acquire(&self) {
        let _ev = self.logger.get().map(|l| l.scope(EventKind::Acquire));
        self.engine.invalidate_all();
    }

    /// Flush blocks dirtied at or before `handler`'s epoch, then invalidate
    /// clean blocks, bounding the cost of a deferred release.
    #[instrument(skip(self))]
    pub fn acquire_with(&self, handler: ReleaseHandler) -> Result<()> {
        let _ev = self.logger.get().map(|l| l.scope(EventKind::Acquire));
        self.engine.release_upto(handler.0)?;
        self.engine.invalidate_all();
        Ok(())
    }

    /// Opportunistic maintenance; see [`Engine::poll`].
    pub fn poll(&self) -> Result<()> {
        self.engine.poll()
    }
}
