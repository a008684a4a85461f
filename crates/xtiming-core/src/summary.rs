//! Serializable run summaries printed by the CLI.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{CacheStatus, Cached};
use crate::error::Result;
use crate::events::{CalibratedEvents, Observation};
use crate::gti::GroupedLightCurve;
use crate::lightcurve::BinnedLightCurve;
use crate::pipeline::InstrumentResults;
use crate::time::{mission_time_to_mjd, mjd_to_datetime};

/// Per-instrument outcome of one command.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommandSummary<T> {
    pub mission: String,
    pub obsid: String,
    pub generated_at: DateTime<Utc>,
    pub products: BTreeMap<String, T>,
    /// Instrument → error message.
    pub failures: BTreeMap<String, String>,
}

impl<T> CommandSummary<T> {
    pub fn from_results<P>(
        obs: &Observation,
        results: &InstrumentResults<P>,
        summarize: impl Fn(&Cached<P>) -> T,
    ) -> Self {
        Self {
            mission: obs.mission.clone(),
            obsid: obs.obsid.clone(),
            generated_at: Utc::now(),
            products: results
                .products
                .iter()
                .map(|(instrument, cached)| (instrument.clone(), summarize(cached)))
                .collect(),
            failures: results
                .failures
                .iter()
                .map(|(instrument, err)| (instrument.clone(), err.to_string()))
                .collect(),
        }
    }
}

fn utc(seconds: f64, mjd_ref: Option<f64>) -> Option<DateTime<Utc>> {
    mjd_ref.and_then(|r| mjd_to_datetime(mission_time_to_mjd(seconds, r)))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CalibrateSummary {
    pub status: CacheStatus,
    pub persisted: bool,
    pub events: usize,
    pub gtis: usize,
    pub energy_min: f64,
    pub energy_max: f64,
    pub time_start: f64,
    pub time_stop: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_utc: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_utc: Option<DateTime<Utc>>,
}

impl CalibrateSummary {
    pub fn new(cached: &Cached<CalibratedEvents>, mjd_ref: Option<f64>) -> Self {
        let meta = &cached.value.meta;
        Self {
            status: cached.status,
            persisted: cached.persisted,
            events: cached.value.events.len(),
            gtis: cached.value.gtis.len(),
            energy_min: meta.energy_window.min,
            energy_max: meta.energy_window.max,
            time_start: meta.time_start,
            time_stop: meta.time_stop,
            start_utc: utc(meta.time_start, mjd_ref),
            stop_utc: utc(meta.time_stop, mjd_ref),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LightCurveSummary {
    pub status: CacheStatus,
    pub persisted: bool,
    pub bin_width: f64,
    pub bins: usize,
    pub total_counts: u64,
    pub count_rate: f64,
    pub time_start: f64,
    pub time_stop: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_utc: Option<DateTime<Utc>>,
}

impl LightCurveSummary {
    pub fn new(cached: &Cached<BinnedLightCurve>, mjd_ref: Option<f64>) -> Self {
        let lc = &cached.value;
        Self {
            status: cached.status,
            persisted: cached.persisted,
            bin_width: lc.meta.bin_width,
            bins: lc.len(),
            total_counts: lc.total_counts(),
            count_rate: lc.count_rate(),
            time_start: lc.meta.time_start,
            time_stop: lc.meta.time_stop,
            start_utc: utc(lc.meta.time_start, mjd_ref),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GroupSummary {
    pub group: usize,
    pub segments: Vec<usize>,
    pub bins: usize,
    pub exposure: f64,
    pub total_counts: u64,
    pub time_start: f64,
    pub time_stop: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GtisSummary {
    pub status: CacheStatus,
    pub persisted: bool,
    pub bin_width: f64,
    pub groups: Vec<GroupSummary>,
}

impl GtisSummary {
    pub fn new(cached: &Cached<GroupedLightCurve>) -> Self {
        Self {
            status: cached.status,
            persisted: cached.persisted,
            bin_width: cached.value.meta.bin_width,
            groups: cached
                .value
                .groups
                .values()
                .map(|g| GroupSummary {
                    group: g.group,
                    segments: g.segments.clone(),
                    bins: g.curve.len(),
                    exposure: g.exposure(),
                    total_counts: g.curve.total_counts(),
                    time_start: g.curve.meta.time_start,
                    time_stop: g.curve.meta.time_stop,
                })
                .collect(),
        }
    }
}

/// Write `summary` as pretty JSON.
pub fn write_summary_json(path: &Path, summary: &impl Serialize) -> Result<()> {
    let content = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, content)?;
    Ok(())
}
