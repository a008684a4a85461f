//! Pipeline runs against the on-disk artifact cache.

mod common;

use std::path::{Path, PathBuf};

use common::*;
use xtiming_core::{ArtifactCache, CacheStatus, Pipeline, PipelineOptions};

fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}

#[test]
fn reopened_cache_serves_identical_products() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let events = nicer_source();
    let calibration = calibration();
    let obs = nicer_obs();

    let first = {
        let cache = ArtifactCache::open(dir.path()).unwrap();
        let pipeline = Pipeline::new(&config, None, &events, &calibration, &cache).unwrap();
        pipeline.gtis(&obs, "XTI", 10.0).unwrap()
    };
    assert!(first.persisted);
    let manifests = files_under(&dir.path().join("manifests"));
    assert_eq!(manifests.len(), 3);

    let cache = ArtifactCache::open(dir.path()).unwrap();
    let pipeline = Pipeline::new(&config, None, &events, &calibration, &cache).unwrap();
    let second = pipeline.gtis(&obs, "XTI", 10.0).unwrap();
    assert_eq!(second.status, CacheStatus::Hit);
    assert_eq!(second.value, first.value);
    assert_eq!(events.loads(), 1);

    // A hit writes nothing new.
    assert_eq!(files_under(&dir.path().join("manifests")), manifests);
}

#[test]
fn damaged_blocks_are_recomputed() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let events = nicer_source();
    let calibration = calibration();
    let cache = ArtifactCache::open(dir.path()).unwrap();
    let pipeline = Pipeline::new(&config, None, &events, &calibration, &cache).unwrap();
    let obs = nicer_obs();

    let original = pipeline.lcurve(&obs, &["XTI"], 10.0);
    let original = original.get("XTI").unwrap().clone();

    for block in files_under(&dir.path().join("blocks")) {
        std::fs::write(&block, b"\x00garbage").unwrap();
    }

    let recomputed = pipeline.lcurve(&obs, &["XTI"], 10.0);
    let cached = &recomputed.products["XTI"];
    assert_eq!(cached.status, CacheStatus::Miss);
    assert!(cached.persisted);
    assert_eq!(cached.value, original);
    assert_eq!(events.loads(), 2);

    // The rewrite healed the entry.
    let third = pipeline.lcurve(&obs, &["XTI"], 10.0);
    assert_eq!(third.products["XTI"].status, CacheStatus::Hit);
}

#[test]
fn unparseable_manifest_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let events = nicer_source();
    let calibration = calibration();
    let cache = ArtifactCache::open(dir.path()).unwrap();
    let pipeline = Pipeline::new(&config, None, &events, &calibration, &cache).unwrap();
    let obs = nicer_obs();

    pipeline.calibrate(&obs, "XTI").unwrap();
    for manifest in files_under(&dir.path().join("manifests")) {
        std::fs::write(&manifest, "{ not json").unwrap();
    }

    let again = pipeline.calibrate(&obs, "XTI").unwrap();
    assert_eq!(again.status, CacheStatus::Miss);
    assert_eq!(again.value.events.len(), 1000);
    assert_eq!(
        pipeline.calibrate(&obs, "XTI").unwrap().status,
        CacheStatus::Hit
    );
}

#[test]
fn invalidated_entry_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let events = nicer_source();
    let calibration = calibration();
    let cache = ArtifactCache::open(dir.path()).unwrap();
    let pipeline = Pipeline::new(&config, None, &events, &calibration, &cache).unwrap();
    let obs = nicer_obs();

    pipeline.lcurve(&obs, &["XTI"], 10.0);
    let key = cache
        .entries("nicer", NICER_OBSID)
        .unwrap()
        .into_iter()
        .find(|k| k.kind == "lc")
        .unwrap();
    assert!(cache.invalidate(&key).unwrap());

    let rebuilt = pipeline.lcurve(&obs, &["XTI"], 10.0);
    assert_eq!(rebuilt.products["XTI"].status, CacheStatus::Miss);
    // Calibrated events were still cached.
    assert_eq!(events.loads(), 1);
}

#[test]
fn dropped_entries_release_their_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let events = nicer_source();
    let calibration = calibration();
    let cache = ArtifactCache::open(dir.path()).unwrap();
    let pipeline = Pipeline::new(&config, None, &events, &calibration, &cache).unwrap();
    let obs = nicer_obs();

    pipeline.lcurve(&obs, &["XTI"], 10.0);
    let single = files_under(&dir.path().join("blocks")).len();
    for width in [1.0, 2.0, 5.0] {
        pipeline.lcurve(&obs, &["XTI"], width);
    }
    assert!(files_under(&dir.path().join("blocks")).len() > single);

    let keys = cache.entries("nicer", NICER_OBSID).unwrap();
    let dropped = cache.invalidate_many(&keys).unwrap();
    assert_eq!(dropped.removed.len(), 5);
    assert!(files_under(&dir.path().join("blocks")).is_empty());
}

#[test]
fn overwrite_does_not_grow_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let events = nicer_source();
    let calibration = calibration();
    let cache = ArtifactCache::open(dir.path()).unwrap();
    let obs = nicer_obs();

    Pipeline::new(&config, None, &events, &calibration, &cache)
        .unwrap()
        .gtis(&obs, "XTI", 10.0)
        .unwrap();
    let before = files_under(&dir.path().join("blocks")).len();

    let forced = Pipeline::new(&config, None, &events, &calibration, &cache)
        .unwrap()
        .with_options(PipelineOptions {
            overwrite: true,
            ..PipelineOptions::default()
        });
    for _ in 0..3 {
        forced.gtis(&obs, "XTI", 10.0).unwrap();
    }
    assert_eq!(files_under(&dir.path().join("blocks")).len(), before);
}
