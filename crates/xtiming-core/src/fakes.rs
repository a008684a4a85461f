//! In-memory fakes for the upstream data traits (testing only)
//!
//! Both fakes count how often they are asked for data, which is how tests
//! observe whether the pipeline recomputed or served from the cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::calibration::CalibrationCurve;
use crate::config::MissionConfig;
use crate::error::{Result, TimingError};
use crate::events::{Observation, RawEvents};
use crate::sources::{CalibrationSource, EventSource};

// ---------------------------------------------------------------------------
// MemoryEventSource
// ---------------------------------------------------------------------------

/// Event source backed by a `HashMap<(obsid, instrument), RawEvents>`.
#[derive(Debug, Default)]
pub struct MemoryEventSource {
    events: Mutex<HashMap<(String, String), RawEvents>>,
    loads: AtomicUsize,
}

impl MemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, obsid: &str, instrument: &str, raw: RawEvents) {
        self.events
            .lock()
            .unwrap()
            .insert((obsid.to_string(), instrument.to_string()), raw);
    }

    pub fn with(self, obsid: &str, instrument: &str, raw: RawEvents) -> Self {
        self.insert(obsid, instrument, raw);
        self
    }

    /// Number of `load_raw_events` calls so far, including failed ones.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl EventSource for MemoryEventSource {
    fn load_raw_events(&self, obs: &Observation, instrument: &str) -> Result<RawEvents> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .get(&(obs.obsid.clone(), instrument.to_string()))
            .cloned()
            .ok_or_else(|| TimingError::missing_upstream(&obs.obsid, instrument, "no such events"))
    }
}

// ---------------------------------------------------------------------------
// StaticCalibrationSource
// ---------------------------------------------------------------------------

/// Hands out one fixed curve for every mission.
#[derive(Debug)]
pub struct StaticCalibrationSource {
    curve: CalibrationCurve,
    loads: AtomicUsize,
}

impl StaticCalibrationSource {
    pub fn new(curve: CalibrationCurve) -> Self {
        Self {
            curve,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl CalibrationSource for StaticCalibrationSource {
    fn load_calibration_curve(&self, _mission: &MissionConfig) -> Result<CalibrationCurve> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.curve.clone())
    }
}
