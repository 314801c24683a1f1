//! Itoyori: fork-join task parallelism over a partitioned global address
//! space with software-managed cache coherence.
//!
//! The crate is organized by component (C1-C9): [`transport`] (C1),
//! [`heap`]/[`mapper`] (C2), [`cache`] (C3), [`consistency`] (C4),
//! [`checkout`] (C5), [`scheduler`] (C6), [`patterns`] (C7),
//! [`policy`] (C8), [`containers`] (C9). [`Runtime`] wires them together
//! into the process-wide facade a benchmark driver actually calls.

pub mod cache;
pub mod checkout;
pub mod config;
pub mod consistency;
pub mod containers;
pub mod error;
pub mod heap;
pub mod logger;
pub mod mapper;
pub mod patterns;
pub mod policy;
pub mod ptr;
pub mod scheduler;
pub mod signal;
pub mod transport;

use std::sync::Arc;

use once_cell::sync::OnceCell;

pub use config::Config;
pub use error::{Error, Result};
pub use ptr::GlobalPtr;

use cache::Engine;
use consistency::Consistency;
use logger::Logger;
use policy::FencePolicy;
use scheduler::{Pool, WorkerHandle};
use transport::{LocalTransport, Transport};

/// Process-wide configuration and scheduler pool: in a real deployment
/// (one OS process per rank) these, along with the heap/cache/logger
/// below, would all be a single `OnceCell` apiece (the "Global state"
/// design note). Our only `Transport` simulates several ranks as OS
/// threads inside one process, so the heap/cache/logger are instead
/// owned per-rank by [`RankRuntime`] below; `CONFIG` and `POOL` are the
/// pieces that genuinely are process-wide even under that simulation,
/// since every simulated rank shares one scheduler pool and one resolved
/// configuration.
static CONFIG: OnceCell<Config> = OnceCell::new();
static POOL: OnceCell<Arc<Pool>> = OnceCell::new();

/// One simulated rank's share of a [`Runtime::init`] call: its own cache
/// engine, heap, fence policy and logger, plus the [`WorkerHandle`] it
/// should install via [`WorkerHandle::scope`] before running any task.
pub struct RankRuntime<T: Transport = LocalTransport> {
    pub rank: usize,
    pub consistency: Consistency<T>,
    pub heap: heap::GlobalHeap<T>,
    pub policy: Box<dyn FencePolicy<T>>,
    pub logger: Arc<Logger>,
    pub worker: WorkerHandle,
}

impl<T: Transport> RankRuntime<T> {
    /// Tear down this rank: dump logger stats (if the configured backend
    /// collects any) to stdout. Pairs with [`Runtime::init`] per the
    /// "Global state" design note's init/fini symmetry.
    pub fn fini(&self) {
        if let Some(stats) = self.logger.dump_stats() {
            println!("{stats}");
        }
    }
}

/// The process-wide facade: resolves [`Config`] from the environment,
/// installs the fatal-signal handler once, and builds one
/// [`RankRuntime`] per simulated rank sharing one [`scheduler::Pool`].
pub struct Runtime;

impl Runtime {
    /// Build an `n_ranks`-wide in-process cluster. Each returned
    /// `RankRuntime` is meant to be moved onto the OS thread that will
    /// play that rank.
    ///
    /// # Panics
    /// Panics if called more than once in a process (the resolved
    /// `Config` and `scheduler::Pool` are genuine process-wide
    /// singletons — see the struct doc comment).
    pub fn init(config: Config) -> Vec<RankRuntime<LocalTransport>> {
        signal::install();

        let n_ranks = config.n_ranks;
        let cache_capacity = (config.cache_mb * 1024 * 1024 / config.block_size) as usize;
        let region_bytes = (config.cache_mb * 1024 * 1024) as usize;

        CONFIG.set(config.clone()).expect("Runtime::init called more than once");
        if config.print_env {
            tracing::info!("{config}");
        }

        let transports = LocalTransport::cluster(n_ranks.max(1), region_bytes, 4);
        let (pool, mut workers) = Pool::new(n_ranks.max(1));
        POOL.set(pool).expect("Runtime::init called more than once");

        transports
            .into_iter()
            .zip(workers.drain(..))
            .enumerate()
            .map(|(rank, (transport, worker))| {
                let transport = Arc::new(transport);
                let engine = Engine::new(
                    transport.clone(),
                    cache_capacity,
                    config.dirty_granularity(),
                    config.enable_write_through,
                );
                let logger =
                    Arc::new(Logger::new(rank, config.logger_impl).expect("failed to open logger output"));
                let consistency = Consistency::new(engine);
                consistency.attach_logger(logger.clone());
                RankRuntime {
                    rank,
                    consistency,
                    heap: heap::GlobalHeap::new(transport),
                    policy: policy::from_kind(config.policy),
                    logger,
                    worker,
                }
            })
            .collect()
    }

    /// The resolved configuration, once [`Runtime::init`] has run.
    pub fn config() -> &'static Config {
        CONFIG.get().expect("Runtime::init not called")
    }

    pub fn pool() -> &'static Arc<Pool> {
        POOL.get().expect("Runtime::init not called")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn init_builds_one_rankruntime_per_rank() {
        let mut config = Config::default();
        config.n_ranks = 3;
        config.cache_mb = 1;
        let ranks = Runtime::init(config);
        assert_eq!(ranks.len(), 3);
        for (i, r) in ranks.iter().enumerate() {
            assert_eq!(r.rank, i);
        }
        assert_eq!(Runtime::config().n_ranks, 3);
        for r in &ranks {
            r.fini();
        }
    }
}
