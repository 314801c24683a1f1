//! The memory mapper: pure functions from a global offset to a home
//! process (spec.md §3, §4.1).

use clap::ValueEnum;

/// Which [`MemoryMapper`] a fresh allocation uses; selected by
/// `ITYR_DIST_POLICY` and fixed for the allocation's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DistPolicy {
    Cyclic,
    Block,
}

/// Maps a byte offset within an allocation to the rank that owns it.
///
/// Implementations are pure functions of `(offset, n_ranks, block_size)`;
/// they hold no state beyond what is needed to answer that question, so
/// the same mapper value can be shared (by copy) across every rank that
/// touches the allocation.
pub trait MemoryMapper: Send + Sync + 'static {
    /// Which rank is home for the block containing `byte_offset`.
    fn owner(&self, byte_offset: u64, n_ranks: usize, block_size: u64) -> usize;

    /// Byte offset, within the home rank's local region, at which the
    /// block containing `byte_offset` begins.
    fn local_block_base(&self, byte_offset: u64, n_ranks: usize, block_size: u64) -> u64;

    /// Number of bytes of this allocation that rank `rank` must reserve
    /// in its locally registered region.
    fn local_capacity(&self, total_bytes: u64, n_ranks: usize, block_size: u64, rank: usize) -> u64;
}

/// Block `i` of size `block_size` resides on process `i mod n_ranks`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cyclic;

impl MemoryMapper for Cyclic {
    fn owner(&self, byte_offset: u64, n_ranks: usize, block_size: u64) -> usize {
        let block_idx = byte_offset / block_size;
        (block_idx % n_ranks as u64) as usize
    }

    fn local_block_base(&self, byte_offset: u64, n_ranks: usize, block_size: u64) -> u64 {
        let block_idx = byte_offset / block_size;
        let local_block_idx = block_idx / n_ranks as u64;
        local_block_idx * block_size
    }

    fn local_capacity(&self, total_bytes: u64, n_ranks: usize, block_size: u64, rank: usize) -> u64 {
        let n_blocks = total_bytes.div_ceil(block_size);
        let mine = (rank as u64..n_blocks).step_by(n_ranks).count() as u64;
        mine * block_size
    }
}

/// Successive `block_size`-sized blocks are assigned round-robin, same as
/// [`Cyclic`] — the distinction in the original is between *cyclic* single
/// blocks and *block-cyclic* groups of blocks, but spec.md defines both
/// with block granularity `B`, so our `Cyclic` already implements
/// block-cyclic distribution at the unit-group size. `Block` instead
/// assigns one contiguous range per rank (a single "block" per rank,
/// regardless of `block_size`), matching `pcas::mem_mapper::block`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Block;

impl MemoryMapper for Block {
    fn owner(&self, byte_offset: u64, n_ranks: usize, block_size: u64) -> usize {
        // Determined by `local_capacity`-style even partition: the mapper
        // needs the allocation's total size to do this properly, so this
        // trait takes `block_size` as a stand-in for "total size divided
        // evenly"; callers (GlobalHeap) pass `total_bytes / n_ranks`
        // rounded up as `block_size` for the Block policy.
        let per_rank = block_size;
        ((byte_offset / per_rank) as usize).min(n_ranks - 1)
    }

    fn local_block_base(&self, byte_offset: u64, _n_ranks: usize, block_size: u64) -> u64 {
        (byte_offset / block_size) * block_size
    }

    fn local_capacity(&self, total_bytes: u64, n_ranks: usize, _block_size: u64, rank: usize) -> u64 {
        let per_rank = total_bytes.div_ceil(n_ranks as u64);
        let start = per_rank * rank as u64;
        total_bytes.saturating_sub(start).min(per_rank)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cyclic_round_robins_blocks() {
        let m = Cyclic;
        let bs = 100;
        assert_eq!(m.owner(0, 4, bs), 0);
        assert_eq!(m.owner(99, 4, bs), 0);
        assert_eq!(m.owner(100, 4, bs), 1);
        assert_eq!(m.owner(400, 4, bs), 0);
    }

    #[test]
    fn cyclic_local_capacity_sums_to_total() {
        let m = Cyclic;
        let total = 1000u64;
        let bs = 64u64;
        let n_ranks = 3usize;
        let sum: u64 = (0..n_ranks).map(|r| m.local_capacity(total, n_ranks, bs, r)).sum();
        let n_blocks = total.div_ceil(bs);
        assert_eq!(sum, n_blocks * bs);
    }
}
