//! The global heap and allocator (C2, spec.md §4.1).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::mapper::{Cyclic, MemoryMapper};
use crate::ptr::GlobalPtr;
use crate::transport::Transport;

/// Bookkeeping for one outstanding allocation.
pub(crate) struct Allocation {
    pub(crate) nbytes: u64,
    pub(crate) block_size: u64,
    pub(crate) mapper: Arc<dyn MemoryMapper>,
    /// For [`crate::mapper::Block`], the mapper needs "bytes per rank"
    /// rather than the configured cache block size; we store whichever
    /// value the mapper should be queried with here so `owner_of` stays a
    /// one-line call regardless of policy.
    pub(crate) mapper_block_size: u64,
}

/// The process-local view of the global heap: tracks allocations' sizes
/// and mappers so that [`GlobalHeap::owner_of`] and cache-block lookups
/// are pure local computation, never a round trip.
pub struct GlobalHeap<T: Transport> {
    transport: Arc<T>,
    next_alloc_id: AtomicU64,
    allocations: RwLock<HashMap<u64, Allocation>>,
}

/// A counter register reserved in rank 0's pinned region for handing out
/// allocation ids collectively.
const ALLOC_ID_COUNTER_OFFSET: u64 = 0;

impl<T: Transport> GlobalHeap<T> {
    pub fn new(transport: Arc<T>) -> Self {
        GlobalHeap {
            transport,
            next_alloc_id: AtomicU64::new(1),
            allocations: RwLock::new(HashMap::new()),
        }
    }

    /// Collective allocation: every rank calls this and all receive the
    /// same [`GlobalPtr`] naming the same allocation, as spec.md §4.1
    /// describes ("May be collective (all processes participate,
    /// returning equal G)").
    pub fn alloc<U>(&self, nelems: u64, mapper: Arc<dyn MemoryMapper>) -> Result<GlobalPtr<U>> {
        let elem_size = std::mem::size_of::<U>() as u64;
        let nbytes = nelems
            .checked_mul(elem_size)
            .ok_or(Error::OutOfMemory { nelems, elem_size: elem_size as usize })?;

        // Rank 0 mints the id via a transport-level atomic counter and it
        // is broadcast so every rank agrees without needing rank 0 to be
        // "the" allocator thread.
        let id = if self.transport.rank() == 0 {
            self.transport.fetch_add_i64(0, ALLOC_ID_COUNTER_OFFSET, 1) as u64 + 1
        } else {
            0
        };
        let id = self.transport.broadcast_u64(id);
        self.next_alloc_id.fetch_max(id + 1, Ordering::SeqCst);

        let block_size = if nbytes == 0 { 1 } else { nbytes.div_ceil(self.transport.n_ranks() as u64) };
        self.allocations.write().insert(
            id,
            Allocation { nbytes, block_size, mapper, mapper_block_size: block_size },
        );
        self.transport.barrier();

        Ok(GlobalPtr::new(id, 0))
    }

    /// Local (non-collective) allocation using the configured default
    /// mapper and cache block size: spec.md's "local" mode, where only the
    /// calling rank allocates immediately and others would resolve the
    /// `GlobalPtr` lazily once it is communicated to them out of band
    /// (the id itself is globally unique since it is minted from the same
    /// shared counter used by collective `alloc`).
    pub fn alloc_local<U>(&self, nelems: u64, block_size: u64) -> Result<GlobalPtr<U>> {
        let elem_size = std::mem::size_of::<U>() as u64;
        let nbytes = nelems
            .checked_mul(elem_size)
            .ok_or(Error::OutOfMemory { nelems, elem_size: elem_size as usize })?;

        let id = self.transport.fetch_add_i64(0, ALLOC_ID_COUNTER_OFFSET, 1) as u64 + 1;
        self.allocations.write().insert(
            id,
            Allocation {
                nbytes,
                block_size,
                mapper: Arc::new(Cyclic),
                mapper_block_size: block_size,
            },
        );
        Ok(GlobalPtr::new(id, 0))
    }

    /// Invalidate an allocation. All outstanding checkouts into it must
    /// already be completed (spec.md §4.1); this is a usage error the
    /// runtime does not detect (consistent with §7's "missing checkin
    /// before free" being undefined behaviour, not a checked error).
    pub fn free<U>(&self, ptr: GlobalPtr<U>) {
        self.allocations.write().remove(&ptr.alloc_id());
    }

    /// Pure function of the mapper: which rank is home for `offset`
    /// (element index) of `ptr`'s allocation.
    pub fn owner_of<U>(&self, ptr: GlobalPtr<U>, offset: u64) -> usize {
        let allocations = self.allocations.read();
        let alloc = allocations
            .get(&ptr.alloc_id())
            .expect("owner_of: unknown or freed allocation");
        let byte_offset = offset * std::mem::size_of::<U>() as u64;
        alloc
            .mapper
            .owner(byte_offset, self.transport.n_ranks(), alloc.mapper_block_size)
    }

    /// Byte offset, within the home rank's locally registered region, at
    /// which the block containing `byte_offset` begins —
    /// `MemoryMapper::local_block_base` for this allocation's mapper. This
    /// is the piece a cache-block fetch/writeback needs in addition to
    /// `owner_of`'s "which rank": two blocks homed on the same rank (the
    /// cyclic case with more blocks than ranks, or two allocations sharing
    /// a home rank) must land at different offsets in that rank's region,
    /// not both at offset 0.
    pub(crate) fn local_block_base<U>(&self, ptr: GlobalPtr<U>, byte_offset: u64) -> u64 {
        let allocations = self.allocations.read();
        let alloc = allocations
            .get(&ptr.alloc_id())
            .expect("local_block_base: unknown or freed allocation");
        alloc
            .mapper
            .local_block_base(byte_offset, self.transport.n_ranks(), alloc.mapper_block_size)
    }

    pub(crate) fn block_size_of(&self, alloc_id: u64) -> u64 {
        self.allocations
            .read()
            .get(&alloc_id)
            .expect("block_size_of: unknown or freed allocation")
            .block_size
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::LocalTransport;

    #[test]
    fn collective_alloc_returns_equal_ptr() {
        let ts = LocalTransport::cluster(3, 4096, 2);
        let handles: Vec<_> = ts
            .into_iter()
            .map(|t| {
                std::thread::spawn(move || {
                    let heap = GlobalHeap::new(Arc::new(t));
                    heap.alloc::<u64>(1000, Arc::new(Cyclic)).unwrap()
                })
            })
            .collect();
        let ptrs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ptrs.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn free_then_alloc_reuses_heap_state() {
        let ts = LocalTransport::cluster(1, 4096, 2);
        let t = Arc::new(ts.into_iter().next().unwrap());
        let heap = GlobalHeap::new(t);
        let p1 = heap.alloc::<u64>(10, Arc::new(Cyclic)).unwrap();
        heap.free(p1);
        let p2 = heap.alloc::<u64>(10, Arc::new(Cyclic)).unwrap();
        assert_ne!(p1.alloc_id(), p2.alloc_id());
    }
}
