//! Session-level counters backing the `session_stats` telemetry event (spec
//! §6 names the event; this shape is a supplemented addition since the
//! contract otherwise leaves it undefined beyond `listenerCount`).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct SessionStats {
    listener_count: AtomicUsize,
    stt_reconnects: AtomicU64,
    dropped_partials: AtomicU64,
    forced_commits: AtomicU64,
}

/// A point-in-time snapshot, cheap to clone and log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatsSnapshot {
    pub listener_count: usize,
    pub stt_reconnects: u64,
    pub dropped_partials: u64,
    pub forced_commits: u64,
}

impl SessionStats {
    pub fn set_listener_count(&self, count: usize) {
        self.listener_count.store(count, Ordering::Relaxed);
    }

    pub fn record_dropped_partial(&self) {
        self.dropped_partials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forced_commit(&self) {
        self.forced_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stt_reconnect(&self) {
        self.stt_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            listener_count: self.listener_count.load(Ordering::Relaxed),
            stt_reconnects: self.stt_reconnects.load(Ordering::Relaxed),
            dropped_partials: self.dropped_partials.load(Ordering::Relaxed),
            forced_commits: self.forced_commits.load(Ordering::Relaxed),
        }
    }
}
