//! A single resident cache block and its coherence metadata (spec.md §3,
//! "Cache block"; §4.3's per-block state machine).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::RwLock;

/// Per-block coherence state (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Invalid,
    /// Transient: a remote read is in flight.
    Fetching,
    Clean,
    Dirty,
    /// Transient: a writeback is in flight.
    WritingBack,
}

/// `{allocation_id, block index within the allocation}` — the unit the
/// cache keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub alloc_id: u64,
    pub block_index: u64,
}

/// A simple per-byte-range dirty tracker at cache-line granularity.
///
/// spec.md leaves the dirty-bitmap granularity unspecified
/// ("dirty_bitmap (B/granularity bits)"); `SPEC_FULL.md` resolves this as
/// 64 bytes. We resolve Open Question 2 (false sharing) as block-level
/// last-writer-wins: this bitmap exists so a partial writeback only
/// sends the bytes *this process* touched, not to merge concurrent
/// writers from different processes.
pub struct DirtyBitmap {
    granularity: u64,
    bits: RwLock<Vec<bool>>,
}

impl DirtyBitmap {
    pub fn new(block_bytes: u64, granularity: u64) -> Self {
        let n = block_bytes.div_ceil(granularity) as usize;
        DirtyBitmap { granularity, bits: RwLock::new(vec![false; n]) }
    }

    pub fn mark_range(&self, byte_offset: u64, len: u64) {
        let mut bits = self.bits.write();
        let first = (byte_offset / self.granularity) as usize;
        let last = ((byte_offset + len.saturating_sub(1)) / self.granularity) as usize;
        for b in bits.iter_mut().take(last + 1).skip(first) {
            *b = true;
        }
    }

    pub fn clear(&self) {
        self.bits.write().iter_mut().for_each(|b| *b = false);
    }

    pub fn is_empty(&self) -> bool {
        !self.bits.read().iter().any(|&b| b)
    }

    /// Contiguous `[start, end)` byte ranges that are marked dirty,
    /// coalescing adjacent granules so a writeback issues one `put` per
    /// run instead of one per cache line.
    pub fn dirty_ranges(&self) -> Vec<(u64, u64)> {
        let bits = self.bits.read();
        let mut ranges = Vec::new();
        let mut run_start: Option<usize> = None;
        for (i, &dirty) in bits.iter().enumerate() {
            match (dirty, run_start) {
                (true, None) => run_start = Some(i),
                (false, Some(start)) => {
                    ranges.push((start as u64 * self.granularity, (i - start) as u64 * self.granularity));
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            ranges.push((
                start as u64 * self.granularity,
                (bits.len() - start) as u64 * self.granularity,
            ));
        }
        ranges
    }
}

/// A resident cache slot: `B` bytes of local storage plus the metadata
/// spec.md §3 ascribes to it.
pub struct CacheSlot {
    pub key: BlockKey,
    pub home: usize,
    /// Byte offset, within `home`'s locally registered region, at which
    /// this block begins — `mapper::MemoryMapper::local_block_base`'s
    /// result for this block, fixed at construction since a slot never
    /// changes which block it backs.
    pub home_base: u64,
    pub data: RwLock<Vec<u8>>,
    pub state: RwLock<BlockState>,
    pub pin_count: AtomicUsize,
    pub dirty: DirtyBitmap,
    pub last_use_clock: AtomicU64,
    /// The release-epoch value (see [`crate::consistency::ReleaseHandler`])
    /// at which this block most recently became dirty; used by
    /// `acquire(handler)` to bound how far back a lazy release must flush.
    pub dirty_since_epoch: AtomicU64,
}

impl CacheSlot {
    pub fn new(key: BlockKey, home: usize, home_base: u64, block_bytes: u64, granularity: u64) -> Self {
        CacheSlot {
            key,
            home,
            home_base,
            data: RwLock::new(vec![0u8; block_bytes as usize]),
            state: RwLock::new(BlockState::Invalid),
            pin_count: AtomicUsize::new(0),
            dirty: DirtyBitmap::new(block_bytes, granularity),
            last_use_clock: AtomicU64::new(0),
            dirty_since_epoch: AtomicU64::new(0),
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count.load(Ordering::Acquire) > 0
    }

    pub fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns the pin count *after* unpinning.
    pub fn unpin(&self) -> usize {
        self.pin_count.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub fn touch(&self, clock: u64) {
        self.last_use_clock.store(clock, Ordering::Relaxed);
    }
}
