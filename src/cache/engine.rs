//! The cache engine (C3): fetch/writeback/invalidate/poll and eviction
//! (spec.md §4.2).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::cache::block::{BlockKey, BlockState, CacheSlot};
use crate::error::{Error, Result};
use crate::logger::{EventKind, Logger};
use crate::transport::Transport;

/// Above this fraction of capacity occupied, [`Engine::poll`] opportunistically
/// writes back the single oldest dirty block even without being asked to
/// release, so a long run of checkouts does not run the cache dry right as
/// a release finally arrives.
const WRITEBACK_WATERMARK: f64 = 0.9;

/// The resident block cache shared by every task on this process.
///
/// One `Engine` exists per process (see `Runtime`'s use of
/// `once_cell::sync::OnceCell`); it owns all [`CacheSlot`]s and is the only
/// thing that calls into [`Transport`] on the data path.
pub struct Engine<T: Transport> {
    transport: Arc<T>,
    capacity: usize,
    granularity: u64,
    write_through: bool,
    slots: RwLock<Vec<Arc<CacheSlot>>>,
    clock: AtomicU64,
    logger: OnceCell<Arc<Logger>>,
}

impl<T: Transport> Engine<T> {
    pub fn new(transport: Arc<T>, capacity: usize, granularity: u64, write_through: bool) -> Self {
        Engine {
            transport,
            capacity,
            granularity,
            write_through,
            slots: RwLock::new(Vec::with_capacity(capacity)),
            clock: AtomicU64::new(0),
            logger: OnceCell::new(),
        }
    }

    /// Attach the per-rank event recorder. Called once by [`crate::Runtime::init`];
    /// a second call is a no-op (the engine keeps whichever logger it saw
    /// first, matching `OnceCell`'s semantics) rather than a panic, since
    /// tests build bare engines that never attach one at all.
    pub fn attach_logger(&self, logger: Arc<Logger>) {
        let _ = self.logger.set(logger);
    }

    fn scope(&self, kind: EventKind) -> Option<crate::logger::ScopeEvent<'_>> {
        self.logger.get().map(|l| l.scope(kind))
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn find(&self, key: BlockKey) -> Option<Arc<CacheSlot>> {
        self.slots.read().iter().find(|s| s.key == key).cloned()
    }

    /// Resolve `key` to a resident slot, evicting and fetching as needed,
    /// and pin it. The returned slot's `state` is guaranteed to be `Clean`
    /// or `Dirty` (never `Invalid`/`Fetching`/`WritingBack`) once this
    /// returns, except when `for_write` is set and the block was
    /// `Invalid`, in which case it transitions straight to `Dirty` without
    /// a fetch (spec.md §4.3: "Invalid --checkout(write)--> Dirty").
    pub fn checkout_block(
        &self,
        key: BlockKey,
        home: usize,
        home_base: u64,
        block_bytes: u64,
        for_write: bool,
        for_read: bool,
    ) -> Result<Arc<CacheSlot>> {
        let slot = match self.find(key) {
            Some(slot) => slot,
            None => self.bring_in(key, home, home_base, block_bytes)?,
        };
        slot.pin();
        slot.touch(self.tick());

        let mut state = slot.state.write();
        match *state {
            BlockState::Invalid => {
                if for_write && !for_read {
                    // Entire block considered overwritten; no fetch needed.
                    *state = BlockState::Dirty;
                } else {
                    drop(state);
                    self.fetch_into(&slot, home, block_bytes)?;
                    state = slot.state.write();
                    if for_write {
                        *state = BlockState::Dirty;
                    }
                }
            }
            BlockState::Clean if for_write => {
                *state = BlockState::Dirty;
            }
            BlockState::Fetching | BlockState::WritingBack => {
                // A real implementation would wait on the in-flight
                // operation; our transport is synchronous so this state is
                // never observed between calls on the same thread.
                unreachable!("transient state observed outside its own call")
            }
            _ => {}
        }
        drop(state);
        Ok(slot)
    }

    fn bring_in(&self, key: BlockKey, home: usize, home_base: u64, block_bytes: u64) -> Result<Arc<CacheSlot>> {
        let mut slots = self.slots.write();
        if slots.len() >= self.capacity {
            let victim = self.pick_victim(&slots)?;
            self.evict(&victim)?;
            slots.retain(|s| !Arc::ptr_eq(s, &victim));
        }
        let slot = Arc::new(CacheSlot::new(key, home, home_base, block_bytes, self.granularity));
        slots.push(slot.clone());
        Ok(slot)
    }

    fn pick_victim(&self, slots: &[Arc<CacheSlot>]) -> Result<Arc<CacheSlot>> {
        let candidate = slots
            .iter()
            .filter(|s| !s.is_pinned())
            .min_by(|a, b| {
                let clock_cmp = a
                    .last_use_clock
                    .load(Ordering::Relaxed)
                    .cmp(&b.last_use_clock.load(Ordering::Relaxed));
                clock_cmp.then_with(|| {
                    // tie-break clean over dirty: a clean block sorts first
                    let a_dirty = *a.state.read() == BlockState::Dirty;
                    let b_dirty = *b.state.read() == BlockState::Dirty;
                    a_dirty.cmp(&b_dirty)
                })
            })
            .cloned();
        candidate.ok_or(Error::CacheExhausted { pinned: slots.len(), capacity: self.capacity })
    }

    fn evict(&self, slot: &Arc<CacheSlot>) -> Result<()> {
        let _ev = self.scope(EventKind::CacheEvict);
        if *slot.state.read() == BlockState::Dirty {
            self.writeback(slot)?;
        }
        *slot.state.write() = BlockState::Invalid;
        slot.dirty.clear();
        Ok(())
    }

    fn fetch_into(&self, slot: &Arc<CacheSlot>, home: usize, block_bytes: u64) -> Result<()> {
        let _ev = self.scope(EventKind::CacheFetch);
        *slot.state.write() = BlockState::Fetching;
        {
            let mut data = slot.data.write();
            self.transport.get(home, slot.home_base, &mut data[..block_bytes as usize]);
        }
        *slot.state.write() = BlockState::Clean;
        Ok(())
    }

    /// Send every dirty byte range back to `slot.home`, offset by
    /// `slot.home_base` (the block's position within its home rank's
    /// locally registered region — see [`CacheSlot::home_base`]), and mark
    /// it Clean.
    pub fn writeback(&self, slot: &Arc<CacheSlot>) -> Result<()> {
        if *slot.state.read() != BlockState::Dirty {
            return Ok(());
        }
        let _ev = self.scope(EventKind::CacheWriteback);
        *slot.state.write() = BlockState::WritingBack;
        {
            let data = slot.data.read();
            for (start, len) in slot.dirty.dirty_ranges() {
                self.transport.put(
                    slot.home,
                    slot.home_base + start,
                    &data[start as usize..(start + len) as usize],
                );
            }
        }
        slot.dirty.clear();
        *slot.state.write() = BlockState::Clean;
        Ok(())
    }

    /// Record that `range` within `slot` was written, per the checkout mode.
    /// If write-through is enabled, writes back immediately.
    pub fn checkin(&self, slot: &Arc<CacheSlot>, byte_offset: u64, len: u64, wrote: bool, epoch: u64) -> Result<()> {
        if wrote {
            slot.dirty.mark_range(byte_offset, len);
            slot.dirty_since_epoch.store(epoch, Ordering::Relaxed);
            if self.write_through {
                self.writeback(slot)?;
            }
        }
        if slot.unpin() == 0 {
            // no further bookkeeping needed; the block stays resident
            // until the eviction policy reclaims it.
        }
        Ok(())
    }

    /// Flush every dirty block (whole-cache release, spec.md §4.3).
    pub fn release_all(&self) -> Result<()> {
        let slots = self.slots.read().clone();
        for slot in &slots {
            self.writeback(slot)?;
        }
        Ok(())
    }

    /// Flush only blocks whose `dirty_since_epoch` is `<= upto_epoch`
    /// (bounded release used by `acquire(handler)`).
    pub fn release_upto(&self, upto_epoch: u64) -> Result<()> {
        let slots = self.slots.read().clone();
        for slot in &slots {
            if *slot.state.read() == BlockState::Dirty
                && slot.dirty_since_epoch.load(Ordering::Relaxed) <= upto_epoch
            {
                self.writeback(slot)?;
            }
        }
        Ok(())
    }

    /// Invalidate every Clean block (whole-cache acquire). Dirty blocks are
    /// left untouched: spec.md's acquire is only meaningful after a release
    /// has made the cache consistent with the next set of writers.
    pub fn invalidate_all(&self) {
        let slots = self.slots.read();
        for slot in slots.iter() {
            let mut state = slot.state.write();
            if *state == BlockState::Clean {
                *state = BlockState::Invalid;
                slot.dirty.clear();
            }
        }
    }

    /// Drain any transport-level completions (a no-op for the synchronous
    /// [`crate::transport::LocalTransport`]) and, if the cache is above the
    /// writeback watermark, opportunistically flush the oldest dirty block.
    pub fn poll(&self) -> Result<()> {
        let slots = self.slots.read();
        if slots.is_empty() || (slots.len() as f64) < WRITEBACK_WATERMARK * self.capacity as f64 {
            return Ok(());
        }
        let oldest_dirty = slots
            .iter()
            .filter(|s| *s.state.read() == BlockState::Dirty && !s.is_pinned())
            .min_by_key(|s| s.last_use_clock.load(Ordering::Relaxed))
            .cloned();
        drop(slots);
        if let Some(slot) = oldest_dirty {
            self.writeback(&slot)?;
        }
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn resident_count(&self) -> usize {
        self.slots.read().len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::LocalTransport;

    fn engine(capacity: usize) -> Engine<LocalTransport> {
        let t = LocalTransport::cluster(1, 4096, 1).into_iter().next().unwrap();
        Engine::new(Arc::new(t), capacity, 64, false)
    }

    #[test]
    fn write_checkout_on_invalid_skips_fetch() {
        let e = engine(4);
        let key = BlockKey { alloc_id: 1, block_index: 0 };
        let slot = e.checkout_block(key, 0, 0, 128, true, false).unwrap();
        assert_eq!(*slot.state.read(), BlockState::Dirty);
    }

    #[test]
    fn read_checkout_fetches_and_becomes_clean() {
        let e = engine(4);
        let key = BlockKey { alloc_id: 1, block_index: 0 };
        let slot = e.checkout_block(key, 0, 0, 128, false, true).unwrap();
        assert_eq!(*slot.state.read(), BlockState::Clean);
    }

    #[test]
    fn writeback_clears_dirty_and_sends_ranges() {
        let e = engine(4);
        let key = BlockKey { alloc_id: 1, block_index: 0 };
        let slot = e.checkout_block(key, 0, 0, 128, true, false).unwrap();
        e.checkin(&slot, 0, 16, true, 0).unwrap();
        assert!(!slot.dirty.is_empty());
        e.writeback(&slot).unwrap();
        assert_eq!(*slot.state.read(), BlockState::Clean);
        assert!(slot.dirty.is_empty());
    }

    #[test]
    fn eviction_fails_when_everything_pinned() {
        let e = engine(1);
        let key0 = BlockKey { alloc_id: 1, block_index: 0 };
        let slot0 = e.checkout_block(key0, 0, 0, 64, true, false).unwrap();
        // slot0 stays pinned (we never checkin), so bringing in a second
        // distinct block must fail eviction.
        let key1 = BlockKey { alloc_id: 1, block_index: 1 };
        let result = e.checkout_block(key1, 0, 0, 64, true, false);
        assert!(matches!(result, Err(Error::CacheExhausted { .. })));
        drop(slot0);
    }

    #[test]
    fn release_upto_only_flushes_older_epochs() {
        let e = engine(4);
        let key_a = BlockKey { alloc_id: 1, block_index: 0 };
        let key_b = BlockKey { alloc_id: 1, block_index: 1 };
        let slot_a = e.checkout_block(key_a, 0, 0, 64, true, false).unwrap();
        e.checkin(&slot_a, 0, 8, true, 1).unwrap();
        let slot_b = e.checkout_block(key_b, 0, 0, 64, true, false).unwrap();
        e.checkin(&slot_b, 0, 8, true, 5).unwrap();

        e.release_upto(2).unwrap();
        assert_eq!(*slot_a.state.read(), BlockState::Clean);
        assert_eq!(*slot_b.state.read(), BlockState::Dirty);
    }
}
