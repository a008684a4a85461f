//! Structured observability hooks for pipeline stages.
//!
//! `ObservationSpan` scopes every log line of one orchestrator call to its
//! mission and observation. The `emit_*` functions log stage completions and
//! cache decisions with a stable `event` field so logs can be filtered
//! mechanically (`RUST_LOG=xtiming_core=info`, `--json`).

use tracing::{info, warn};

use xtiming_store::CacheKey;

/// RAII guard that enters an observation-scoped span.
///
/// ```ignore
/// let _span = ObservationSpan::enter("nicer", "1050360105");
/// // every event logged here carries mission=nicer obsid=1050360105
/// ```
pub struct ObservationSpan {
    _span: tracing::span::EnteredSpan,
}

impl ObservationSpan {
    pub fn enter(mission: &str, obsid: &str) -> Self {
        let span = tracing::info_span!("xtiming.observation", mission = %mission, obsid = %obsid);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_cache_hit(key: &CacheKey) {
    info!(event = "cache.hit", key = %key);
}

pub fn emit_cache_miss(key: &CacheKey, overwrite: bool) {
    info!(event = "cache.miss", key = %key, overwrite = overwrite);
}

/// A persisted entry could not be read back and will be recomputed.
pub fn emit_cache_corrupt(key: &CacheKey, error: &dyn std::fmt::Display) {
    warn!(event = "cache.corrupt", key = %key, error = %error);
}

pub fn emit_cache_write_failed(key: &CacheKey, error: &dyn std::fmt::Display) {
    warn!(event = "cache.write_failed", key = %key, error = %error);
}

pub fn emit_cache_swept(live: usize, removed: usize) {
    info!(event = "cache.swept", live_blocks = live, removed_blocks = removed);
}

pub fn emit_cache_sweep_failed(error: &dyn std::fmt::Display) {
    warn!(event = "cache.sweep_failed", error = %error);
}

pub fn emit_calibrated(
    instrument: &str,
    kept: usize,
    dropped_unmapped: usize,
    dropped_out_of_window: usize,
) {
    info!(
        event = "calibrate.done",
        instrument = %instrument,
        kept = kept,
        dropped_unmapped = dropped_unmapped,
        dropped_out_of_window = dropped_out_of_window,
    );
}

pub fn emit_lcurve_done(instrument: &str, bin_width: f64, bins: usize, total_counts: u64) {
    info!(
        event = "lcurve.done",
        instrument = %instrument,
        bin_width = bin_width,
        bins = bins,
        total_counts = total_counts,
    );
}

pub fn emit_gtis_done(instrument: &str, segments: usize, discarded: usize, groups: usize) {
    info!(
        event = "gtis.done",
        instrument = %instrument,
        segments = segments,
        discarded = discarded,
        groups = groups,
    );
}

/// One instrument failed; the others continue.
pub fn emit_instrument_failed(instrument: &str, error: &dyn std::fmt::Display) {
    warn!(event = "instrument.failed", instrument = %instrument, error = %error);
}
