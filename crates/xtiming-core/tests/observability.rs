//! Structured log events emitted by the pipeline.

mod common;

use common::*;
use tracing_test::traced_test;
use xtiming_core::fakes::MemoryEventSource;
use xtiming_core::obs::{emit_cache_write_failed, ObservationSpan};
use xtiming_core::{ArtifactCache, CacheKey, Pipeline, METRICS};

#[traced_test]
#[test]
fn cold_run_logs_each_stage() {
    let config = config();
    let events = nicer_source();
    let calibration = calibration();
    let cache = ArtifactCache::in_memory();
    let pipeline = Pipeline::new(&config, None, &events, &calibration, &cache).unwrap();

    pipeline.gtis(&nicer_obs(), "XTI", 10.0).unwrap();

    assert!(logs_contain("cache.miss"));
    assert!(logs_contain("calibrate.done"));
    assert!(logs_contain("lcurve.done"));
    assert!(logs_contain("gtis.done"));
    assert!(logs_contain("obsid=1050360105"));
}

#[traced_test]
#[test]
fn warm_run_logs_hit() {
    let config = config();
    let events = nicer_source();
    let calibration = calibration();
    let cache = ArtifactCache::in_memory();
    let pipeline = Pipeline::new(&config, None, &events, &calibration, &cache).unwrap();

    pipeline.lcurve(&nicer_obs(), &["XTI"], 10.0);
    pipeline.lcurve(&nicer_obs(), &["XTI"], 10.0);

    assert!(logs_contain("cache.hit"));
    assert!(logs_contain("nicer/1050360105/lc/XTI/bin=10"));
}

#[traced_test]
#[test]
fn instrument_failure_is_warned() {
    let config = config();
    let events = MemoryEventSource::new();
    let calibration = calibration();
    let cache = ArtifactCache::in_memory();
    let pipeline = Pipeline::new(&config, None, &events, &calibration, &cache).unwrap();

    let results = pipeline.lcurve(&nicer_obs(), &[], 10.0);
    assert!(!results.is_complete());
    assert!(logs_contain("instrument.failed"));
    assert!(logs_contain("upstream data missing"));
}

#[traced_test]
#[test]
fn write_failure_event_names_key() {
    let _span = ObservationSpan::enter("nustar", NUSTAR_OBSID);
    let key = CacheKey::new("nustar", NUSTAR_OBSID, "FPMA", "calib");
    emit_cache_write_failed(&key, &"disk full");
    assert!(logs_contain("cache.write_failed"));
    assert!(logs_contain("disk full"));
}

#[traced_test]
#[test]
fn metrics_flush_logs_counters() {
    METRICS.flush();
    assert!(logs_contain("cache_hits"));
    assert!(logs_contain("segments_discarded"));
}
