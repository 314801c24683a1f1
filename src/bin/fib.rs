//! `fib(n)` via `parallel_invoke2`: the textbook fork-join microbenchmark,
//! grounded on `original_source/fib.cpp`'s `madm::uth::thread` + `join`.

use clap::Parser;
use ityr::{patterns, Config, Runtime};

fn fib(consistency: &ityr::consistency::Consistency<ityr::transport::LocalTransport>, policy: &dyn ityr::policy::FencePolicy<ityr::transport::LocalTransport>, n: u64) -> ityr::Result<u64> {
    if n < 2 {
        return Ok(n);
    }
    let (a, b) = patterns::parallel_invoke2(consistency, policy, || fib(consistency, policy, n - 1), || fib(consistency, policy, n - 2))?;
    Ok(a? + b?)
}

fn main() {
    tracing_subscriber::fmt::try_init().ok();
    let mut config = Config::parse();
    if config.n_ranks == 0 {
        config.n_ranks = 1;
    }
    let n = std::env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(30u64);

    let ranks = Runtime::init(config);
    let mut ranks = ranks.into_iter();
    let root = ranks.next().expect("at least one rank");
    let others: Vec<_> = ranks.collect();

    // Helper ranks just steal forever; dropping their JoinHandles detaches
    // them, which is fine since the process exits once rank 0 is done.
    for rank in others {
        std::thread::spawn(move || {
            rank.worker.scope(|_| loop {
                if !rank.worker.steal_and_run_one() {
                    std::thread::yield_now();
                }
            });
        });
    }

    let result = root.worker.scope(|_| {
        patterns::root_spawn(&root.consistency, || fib(&root.consistency, root.policy.as_ref(), n))
    });

    root.fini();
    match result {
        Ok(value) => println!("fib({n}) = {value}"),
        Err(e) => eprintln!("fib failed: {e}"),
    }
}
