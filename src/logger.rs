//! Structured logging and stats collection (spec.md §6).
//!
//! Grounded on `original_source/ityr/logger/logger.hpp`'s RAII
//! scope-event/stats-dump pattern, re-expressed over `tracing` instead of a
//! hand-rolled event ring buffer.

use std::collections::HashMap;
use std::fs::File;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use serde::Serialize;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// `ITYR_LOGGER_IMPL`: which backend records scheduler/cache events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LoggerImpl {
    /// No recording at all.
    Dummy,
    /// Per-rank JSON-lines event stream, written via `tracing-subscriber`.
    Trace,
    /// In-memory counters/durations per event kind, dumped as JSON on
    /// `fini`.
    Stats,
}

/// The event kinds the logger distinguishes (spec.md §6: "task spawn/join,
/// release, acquire, cache fetch/writeback/evict, steal attempts").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    TaskSpawn,
    TaskJoin,
    Release,
    Acquire,
    CacheFetch,
    CacheWriteback,
    CacheEvict,
    StealAttempt,
}

#[derive(Default, Serialize)]
struct Stat {
    count: u64,
    total: Duration,
}

/// A running scope timer; dropping it (or calling [`ScopeEvent::finish`])
/// records its elapsed time against the event kind it was opened with.
pub struct ScopeEvent<'a> {
    logger: &'a Logger,
    kind: EventKind,
    start: Instant,
    finished: bool,
}

impl<'a> ScopeEvent<'a> {
    pub fn finish(mut self) {
        self.record();
        self.finished = true;
    }

    fn record(&mut self) {
        if self.finished {
            return;
        }
        self.logger.record(self.kind, self.start.elapsed());
    }
}

impl Drop for ScopeEvent<'_> {
    fn drop(&mut self) {
        self.record();
    }
}

enum Backend {
    Dummy,
    Trace,
    Stats(Mutex<HashMap<EventKind, Stat>>),
}

/// Process-wide event recorder; one instance lives behind
/// `crate::Runtime`'s `once_cell::sync::OnceCell`.
pub struct Logger {
    rank: usize,
    backend: Backend,
    _trace_guard: Option<tracing_appender_guard::Guard>,
}

/// A tiny stand-in for `tracing_appender::non_blocking`'s guard type: we
/// only need "keep the file handle alive for the process lifetime", not a
/// background flush thread, so we hold the `File` directly rather than
/// pulling in another crate for one field.
mod tracing_appender_guard {
    pub struct Guard(#[allow(dead_code)] pub(super) std::fs::File);
}

impl Logger {
    pub fn new(rank: usize, impl_kind: LoggerImpl) -> std::io::Result<Logger> {
        let (backend, guard) = match impl_kind {
            LoggerImpl::Dummy => (Backend::Dummy, None),
            LoggerImpl::Trace => {
                let path = format!("ityr-{rank}.log");
                let file = File::create(&path)?;
                let make_writer = file.try_clone()?.with_max_level(tracing::Level::TRACE);
                let subscriber = tracing_subscriber::fmt()
                    .json()
                    .with_writer(make_writer)
                    .finish();
                // Only the first rank to construct a Trace logger in a
                // process actually installs the global subscriber; later
                // ranks (in our in-process transport simulation, separate
                // OS threads) share it. A real multi-process deployment
                // would have one subscriber per process and this call
                // always succeeds.
                let _ = tracing::subscriber::set_global_default(subscriber);
                (Backend::Trace, Some(tracing_appender_guard::Guard(file)))
            }
            LoggerImpl::Stats => (Backend::Stats(Mutex::new(HashMap::new())), None),
        };
        Ok(Logger { rank, backend, _trace_guard: guard })
    }

    pub fn scope(&self, kind: EventKind) -> ScopeEvent<'_> {
        if matches!(self.backend, Backend::Trace) {
            tracing::trace!(rank = self.rank, event = ?kind, "begin");
        }
        ScopeEvent { logger: self, kind, start: Instant::now(), finished: false }
    }

    fn record(&self, kind: EventKind, elapsed: Duration) {
        match &self.backend {
            Backend::Dummy => {}
            Backend::Trace => {
                tracing::trace!(rank = self.rank, event = ?kind, elapsed_ns = elapsed.as_nanos() as u64, "end");
            }
            Backend::Stats(stats) => {
                let mut stats = stats.lock().unwrap();
                let entry = stats.entry(kind).or_default();
                entry.count += 1;
                entry.total += elapsed;
            }
        }
    }

    /// Dump accumulated stats as JSON (only meaningful for `LoggerImpl::Stats`).
    pub fn dump_stats(&self) -> Option<String> {
        match &self.backend {
            Backend::Stats(stats) => {
                let stats = stats.lock().unwrap();
                let as_map: HashMap<String, &Stat> =
                    stats.iter().map(|(k, v)| (format!("{k:?}"), v)).collect();
                serde_json::to_string_pretty(&as_map).ok()
            }
            _ => None,
        }
    }
}
