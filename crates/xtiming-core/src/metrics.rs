//! Global atomic counters for pipeline observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a CLI command).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_write_failures: AtomicU64,
    events_dropped: AtomicU64,
    segments_discarded: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_write_failures: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            segments_discarded: AtomicU64::new(0),
        }
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_hits", "counter incremented");
    }

    pub fn inc_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_misses", "counter incremented");
    }

    pub fn inc_cache_write_failures(&self) {
        self.cache_write_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_write_failures", "counter incremented");
    }

    /// Add events removed by calibration (unmapped or out of window).
    pub fn add_events_dropped(&self, n: u64) {
        self.events_dropped.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "events_dropped", n, "counter incremented");
    }

    /// Add GTIs discarded by segmentation.
    pub fn add_segments_discarded(&self, n: u64) {
        self.segments_discarded.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "segments_discarded", n, "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            cache_hits = self.cache_hits(),
            cache_misses = self.cache_misses(),
            cache_write_failures = self.cache_write_failures(),
            events_dropped = self.events_dropped(),
            segments_discarded = self.segments_discarded(),
        );
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn cache_write_failures(&self) -> u64 {
        self.cache_write_failures.load(Ordering::Relaxed)
    }

    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    pub fn segments_discarded(&self) -> u64 {
        self.segments_discarded.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.cache_write_failures.store(0, Ordering::Relaxed);
        self.events_dropped.store(0, Ordering::Relaxed);
        self.segments_discarded.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Local instances; the global is shared with every other test.
    #[test]
    fn counters_accumulate_and_reset() {
        let m = Metrics::new();
        m.inc_cache_hits();
        m.inc_cache_hits();
        m.inc_cache_misses();
        m.add_events_dropped(7);
        m.add_segments_discarded(2);
        assert_eq!(m.cache_hits(), 2);
        assert_eq!(m.cache_misses(), 1);
        assert_eq!(m.events_dropped(), 7);
        assert_eq!(m.segments_discarded(), 2);

        m.reset();
        assert_eq!(m.cache_hits(), 0);
        assert_eq!(m.events_dropped(), 0);
    }

    #[test]
    fn flush_does_not_panic() {
        Metrics::new().flush();
    }
}
