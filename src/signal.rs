//! Fatal-signal backtraces (spec.md §4.9, §7). Grounded on
//! `original_source/ityr/util.hpp`'s `set_segv_handler`/`print_backtrace`,
//! which used `libunwind`+`dladdr`; `backtrace` + `signal-hook` are the
//! idiomatic Rust substitutes for the same concern.

use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGABRT, SIGBUS, SIGSEGV, SIGTERM};
use signal_hook::iterator::Signals;

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the process-wide fatal-signal handler. Idempotent: a second
/// call from a later `Runtime::init` (e.g. in tests that build multiple
/// runtimes in one process) is a no-op.
///
/// On `SIGSEGV`/`SIGABRT`/`SIGBUS`, dumps a backtrace to stderr and aborts.
/// On `SIGTERM`, dumps a short notice and aborts without a backtrace
/// (not a crash, but the runtime has no graceful shutdown path for an
/// externally requested termination mid-job).
pub fn install() {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }
    let mut signals = match Signals::new([SIGSEGV, SIGABRT, SIGBUS, SIGTERM]) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install fatal-signal handler");
            return;
        }
    };
    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            handle(signal);
        }
    });
}

fn handle(signal: i32) {
    match signal {
        SIGTERM => {
            eprintln!("ityr: received SIGTERM, aborting");
        }
        _ => {
            eprintln!("ityr: fatal signal {signal}, backtrace follows:");
            eprintln!("{:?}", backtrace::Backtrace::new());
        }
    }
    std::process::abort();
}
