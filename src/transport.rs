//! The messaging substrate (C1).
//!
//! spec.md §1 explicitly treats "platform details of the underlying
//! one-sided messaging transport" as an external collaborator: "assumed: a
//! two-sided + one-sided point-to-point layer supporting remote read/
//! write/atomic on pinned memory, plus a collective barrier and
//! broadcast." This module defines that assumption as the [`Transport`]
//! trait and ships exactly one implementation, [`LocalTransport`], which
//! simulates `n_ranks` processes as OS threads inside the current process,
//! each with a pinned byte buffer other "ranks" can remote-read/write via
//! real cross-thread synchronization (not a stub: every byte actually
//! crosses a `parking_lot::RwLock` boundary, and every barrier is a real
//! multi-thread rendezvous).
//!
//! A production deployment would implement `Transport` over MPI, libfabric,
//! or UCX; that implementation is out of scope here.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_utils::sync::{Parker, Unparker};
use parking_lot::RwLock;

pub type Rank = usize;

/// Remote read/write/atomic on pinned memory, plus collectives.
///
/// All operations are synchronous from the caller's point of view (they
/// return once the remote side has observed the effect), matching the
/// spec's framing of checkout/writeback as the layer that decides *when*
/// to call into the transport, not the transport deciding when to block.
pub trait Transport: Send + Sync + 'static {
    fn rank(&self) -> Rank;
    fn n_ranks(&self) -> usize;

    /// Copy `len` bytes starting at `offset` in `home`'s pinned region
    /// into `out`.
    fn get(&self, home: Rank, offset: u64, out: &mut [u8]);

    /// Copy `data` into `home`'s pinned region starting at `offset`.
    fn put(&self, home: Rank, offset: u64, data: &[u8]);

    /// Atomically fetch-and-add an `i64` counter living at `offset` in
    /// `home`'s pinned region (used by collective allocation to hand out
    /// monotonically increasing allocation ids without a central rank
    /// always being rank 0).
    fn fetch_add_i64(&self, home: Rank, offset: u64, delta: i64) -> i64;

    /// Block until every rank has called `barrier`.
    fn barrier(&self);

    /// Rank 0's value of `value` is returned on every rank; ranks other
    /// than 0 must pass a value (ignored) to satisfy the call signature,
    /// since Rust does not let us express "only rank 0 supplies this".
    fn broadcast_u64(&self, value_if_root: u64) -> u64;
}

struct RankState {
    region: RwLock<Vec<u8>>,
    counters: RwLock<Vec<AtomicI64>>,
}

struct BarrierState {
    generation: AtomicU64,
    arrived: AtomicU64,
    unparkers: Vec<Unparker>,
}

/// An in-process simulation of `n_ranks` cooperating processes.
///
/// Construct one [`LocalTransport`] handle per simulated rank via
/// [`LocalTransport::cluster`]; each handle is `Send` and is meant to live
/// on the OS thread that plays that rank.
pub struct LocalTransport {
    rank: Rank,
    regions: Arc<Vec<RankState>>,
    barrier: Arc<BarrierState>,
    root_broadcast: Arc<RwLock<u64>>,
    parker: Parker,
}

impl LocalTransport {
    /// Build `n_ranks` transport handles, each pre-registering
    /// `region_bytes` of pinned memory and `n_counters` atomic counters.
    pub fn cluster(n_ranks: usize, region_bytes: usize, n_counters: usize) -> Vec<LocalTransport> {
        assert!(n_ranks > 0);
        let regions: Arc<Vec<RankState>> = Arc::new(
            (0..n_ranks)
                .map(|_| RankState {
                    region: RwLock::new(vec![0u8; region_bytes]),
                    counters: RwLock::new((0..n_counters).map(|_| AtomicI64::new(0)).collect()),
                })
                .collect(),
        );

        let parkers: Vec<Parker> = (0..n_ranks).map(|_| Parker::new()).collect();
        let unparkers = parkers.iter().map(|p| p.unparker().clone()).collect();
        let barrier = Arc::new(BarrierState {
            generation: AtomicU64::new(0),
            arrived: AtomicU64::new(0),
            unparkers,
        });
        let root_broadcast = Arc::new(RwLock::new(0));

        parkers
            .into_iter()
            .enumerate()
            .map(|(rank, parker)| LocalTransport {
                rank,
                regions: regions.clone(),
                barrier: barrier.clone(),
                root_broadcast: root_broadcast.clone(),
                parker,
            })
            .collect()
    }
}

impl Transport for LocalTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn n_ranks(&self) -> usize {
        self.regions.len()
    }

    fn get(&self, home: Rank, offset: u64, out: &mut [u8]) {
        let region = self.regions[home].region.read();
        let start = offset as usize;
        out.copy_from_slice(&region[start..start + out.len()]);
    }

    fn put(&self, home: Rank, offset: u64, data: &[u8]) {
        let mut region = self.regions[home].region.write();
        let start = offset as usize;
        region[start..start + data.len()].copy_from_slice(data);
    }

    fn fetch_add_i64(&self, home: Rank, offset: u64, delta: i64) -> i64 {
        let counters = self.regions[home].counters.read();
        let idx = (offset as usize) / std::mem::size_of::<i64>();
        counters[idx].fetch_add(delta, Ordering::SeqCst)
    }

    fn barrier(&self) {
        let n = self.n_ranks() as u64;
        let my_gen = self.barrier.generation.load(Ordering::SeqCst);
        let arrived = self.barrier.arrived.fetch_add(1, Ordering::SeqCst) + 1;
        if arrived == n {
            self.barrier.arrived.store(0, Ordering::SeqCst);
            self.barrier.generation.store(my_gen + 1, Ordering::SeqCst);
            for u in &self.barrier.unparkers {
                u.unpark();
            }
        } else {
            while self.barrier.generation.load(Ordering::SeqCst) == my_gen {
                self.parker.park();
            }
        }
    }

    fn broadcast_u64(&self, value_if_root: u64) -> u64 {
        if self.rank == 0 {
            *self.root_broadcast.write() = value_if_root;
        }
        self.barrier();
        let v = *self.root_broadcast.read();
        self.barrier();
        v
    }
}
