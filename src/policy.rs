//! Fence-elision policies (C8, spec.md §4.6 REDESIGN note + §6).
//!
//! Four policies decide when a task boundary actually needs a
//! release/acquire pair versus when the scheduler can elide it because the
//! continuation stays on the same process. Selected once from `ITYR_POLICY`
//! at [`crate::Runtime::init`] time; every implementor itself contains no
//! further dynamic dispatch, so the one `match` in [`Dispatch`] is the only
//! indirection this introduces on the hot path.

use clap::ValueEnum;

use crate::consistency::{Consistency, ReleaseHandler};
use crate::error::Result;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyKind {
    Serial,
    Naive,
    #[value(name = "workfirst")]
    WorkFirst,
    #[value(name = "workfirst-lazy")]
    WorkFirstLazy,
}

/// Called by the scheduler around a `spawn`/`join` pair (C6 + C8
/// interaction, spec.md §4.5's `spawn_aux`/`join_aux`).
///
/// `on_die`/`on_block` name the same two events `ito_pattern_workfirst`
/// distinguishes in the original: `on_die(continued)` fires once the
/// spawning task's continuation either runs to completion locally
/// (`continued = true`) or is stolen and resumed elsewhere
/// (`continued = false`); `on_block` fires if the child the caller is
/// about to join has not finished yet and the caller must suspend.
pub trait FencePolicy<T: Transport>: Send + Sync {
    /// Before a task forks work that might be stolen.
    fn spawn_aux(&self, consistency: &Consistency<T>) -> Result<Option<ReleaseHandler>>;

    /// After the forked work rejoins, given the handler (if any) returned
    /// by `spawn_aux` and whether the continuation actually migrated.
    fn join_aux(
        &self,
        consistency: &Consistency<T>,
        handler: Option<ReleaseHandler>,
        migrated: bool,
    ) -> Result<()>;
}

/// No elision: every pattern invocation runs inline, no fences at all.
/// Matches `ITYR_POLICY=serial` / `ito_pattern_serial`.
pub struct Serial;

impl<T: Transport> FencePolicy<T> for Serial {
    fn spawn_aux(&self, _consistency: &Consistency<T>) -> Result<Option<ReleaseHandler>> {
        Ok(None)
    }
    fn join_aux(&self, _consistency: &Consistency<T>, _handler: Option<ReleaseHandler>, _migrated: bool) -> Result<()> {
        Ok(())
    }
}

/// Always release before a potential steal and acquire after every join,
/// regardless of whether the continuation actually migrated. The safe,
/// unconditional baseline spec.md calls "naive".
pub struct Naive;

impl<T: Transport> FencePolicy<T> for Naive {
    fn spawn_aux(&self, consistency: &Consistency<T>) -> Result<Option<ReleaseHandler>> {
        consistency.release()?;
        Ok(None)
    }
    fn join_aux(&self, consistency: &Consistency<T>, _handler: Option<ReleaseHandler>, _migrated: bool) -> Result<()> {
        consistency.acquire();
        Ok(())
    }
}

/// Only fence when the continuation actually migrated to another worker
/// (the "Initial-rank check" from spec.md §4.5): release eagerly at spawn,
/// but skip the acquire entirely if the rank never changed, since in that
/// case no other process could have observed (or needed to observe) the
/// release.
pub struct WorkFirst;

impl<T: Transport> FencePolicy<T> for WorkFirst {
    fn spawn_aux(&self, consistency: &Consistency<T>) -> Result<Option<ReleaseHandler>> {
        consistency.release()?;
        Ok(None)
    }
    fn join_aux(&self, consistency: &Consistency<T>, _handler: Option<ReleaseHandler>, migrated: bool) -> Result<()> {
        if migrated {
            consistency.acquire();
        }
        Ok(())
    }
}

/// Like [`WorkFirst`], but the release itself is deferred: `spawn_aux`
/// takes a lazy snapshot instead of flushing immediately, and the flush
/// only happens in `join_aux` if a migration actually occurred and thus
/// needs it.
pub struct WorkFirstLazy;

impl<T: Transport> FencePolicy<T> for WorkFirstLazy {
    fn spawn_aux(&self, consistency: &Consistency<T>) -> Result<Option<ReleaseHandler>> {
        Ok(Some(consistency.release_lazy()))
    }
    fn join_aux(&self, consistency: &Consistency<T>, handler: Option<ReleaseHandler>, migrated: bool) -> Result<()> {
        if migrated {
            if let Some(handler) = handler {
                consistency.acquire_with(handler)?;
            } else {
                consistency.acquire();
            }
        }
        Ok(())
    }
}

/// Picks the concrete policy named by `ITYR_POLICY` once at startup.
pub fn from_kind<T: Transport>(kind: PolicyKind) -> Box<dyn FencePolicy<T>> {
    match kind {
        PolicyKind::Serial => Box::new(Serial),
        PolicyKind::Naive => Box::new(Naive),
        PolicyKind::WorkFirst => Box::new(WorkFirst),
        PolicyKind::WorkFirstLazy => Box::new(WorkFirstLazy),
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::cache::{BlockKey, BlockState, Engine};
    use crate::transport::LocalTransport;

    fn consistency() -> Consistency<LocalTransport> {
        let t = LocalTransport::cluster(1, 4096, 1).into_iter().next().unwrap();
        Consistency::new(Engine::new(Arc::new(t), 4, 64, false))
    }

    #[test]
    fn serial_never_fences() {
        let c = consistency();
        let key = BlockKey { alloc_id: 1, block_index: 0 };
        let slot = c.engine().checkout_block(key, 0, 0, 64, true, false).unwrap();
        c.engine().checkin(&slot, 0, 8, true, 0).unwrap();
        let policy: Box<dyn FencePolicy<LocalTransport>> = Box::new(Serial);
        let handler = policy.spawn_aux(&c).unwrap();
        policy.join_aux(&c, handler, true).unwrap();
        assert_eq!(*slot.state.read(), BlockState::Dirty);
    }

    #[test]
    fn work_first_skips_acquire_when_not_migrated() {
        let c = consistency();
        let key = BlockKey { alloc_id: 1, block_index: 0 };
        let slot = c.engine().checkout_block(key, 0, 0, 64, true, false).unwrap();
        c.engine().checkin(&slot, 0, 8, true, 0).unwrap();
        let policy: Box<dyn FencePolicy<LocalTransport>> = Box::new(WorkFirst);
        let handler = policy.spawn_aux(&c).unwrap();
        assert_eq!(*slot.state.read(), BlockState::Clean); // released eagerly
        policy.join_aux(&c, handler, false).unwrap();
        assert_eq!(*slot.state.read(), BlockState::Clean); // no acquire; stays resident
    }

    #[test]
    fn work_first_acquires_on_migration() {
        let c = consistency();
        let key = BlockKey { alloc_id: 1, block_index: 0 };
        let slot = c.engine().checkout_block(key, 0, 0, 64, false, true).unwrap();
        let policy: Box<dyn FencePolicy<LocalTransport>> = Box::new(WorkFirst);
        let handler = policy.spawn_aux(&c).unwrap();
        policy.join_aux(&c, handler, true).unwrap();
        assert_eq!(*slot.state.read(), BlockState::Invalid);
    }

    #[test]
    fn work_first_lazy_defers_release_until_migration() {
        let c = consistency();
        let key = BlockKey { alloc_id: 1, block_index: 0 };
        let slot = c.engine().checkout_block(key, 0, 0, 64, true, false).unwrap();
        let policy: Box<dyn FencePolicy<LocalTransport>> = Box::new(WorkFirstLazy);
        let handler = policy.spawn_aux(&c).unwrap();
        c.engine().checkin(&slot, 0, 8, true, handler.unwrap().0).unwrap();
        assert_eq!(*slot.state.read(), BlockState::Dirty); // still dirty, no eager flush
        policy.join_aux(&c, handler, true).unwrap();
        assert_eq!(*slot.state.read(), BlockState::Invalid);
    }
}
