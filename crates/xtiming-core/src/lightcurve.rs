//! Binned light curves.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::binning::{bin_events, BinnedCounts};
use crate::error::{Result, TimingError};
use crate::events::{CalibratedEvents, EnergyWindow};

/// Identity and binning parameters of a light curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightCurveMeta {
    pub mission: String,
    pub obsid: String,
    pub instrument: String,
    pub bin_width: f64,
    /// Left edge of the first bin.
    pub time_start: f64,
    /// Right edge of the last bin, or the requested stop for a full curve.
    pub time_stop: f64,
    pub energy_window: EnergyWindow,
}

/// `(bin start, count)` pairs on a uniform grid of `meta.bin_width`.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedLightCurve {
    pub meta: LightCurveMeta,
    pub times: Vec<f64>,
    pub counts: Vec<u64>,
}

impl BinnedLightCurve {
    /// Bin the calibrated events of one instrument over its full
    /// observation span.
    pub fn from_events(events: &CalibratedEvents, bin_width: f64) -> Result<Self> {
        let meta = LightCurveMeta {
            mission: events.meta.mission.clone(),
            obsid: events.meta.obsid.clone(),
            instrument: events.meta.instrument.clone(),
            bin_width,
            time_start: events.meta.time_start,
            time_stop: events.meta.time_stop,
            energy_window: events.meta.energy_window,
        };
        let binned = bin_events(
            events.events.times(),
            bin_width,
            meta.time_start,
            meta.time_stop,
        )?;
        Ok(Self::from_counts(meta, binned))
    }

    pub fn from_counts(meta: LightCurveMeta, binned: BinnedCounts) -> Self {
        Self {
            meta,
            times: binned.times(),
            counts: binned.counts,
        }
    }

    pub fn from_parts(meta: LightCurveMeta, times: Vec<f64>, counts: Vec<u64>) -> Result<Self> {
        if times.len() != counts.len() {
            return Err(TimingError::corrupt(format!(
                "light curve has {} bin times but {} counts",
                times.len(),
                counts.len()
            )));
        }
        Ok(Self {
            meta,
            times,
            counts,
        })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn bin_width(&self) -> f64 {
        self.meta.bin_width
    }

    pub fn total_counts(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Exposure covered by the bins.
    pub fn duration(&self) -> f64 {
        self.len() as f64 * self.meta.bin_width
    }

    /// Mean counts per second; zero for an empty curve.
    pub fn count_rate(&self) -> f64 {
        let duration = self.duration();
        if duration > 0.0 {
            self.total_counts() as f64 / duration
        } else {
            0.0
        }
    }

    /// Copy of the bins in `range`, with the time bounds narrowed to them.
    pub fn slice(&self, range: Range<usize>) -> Self {
        let times = self.times[range.clone()].to_vec();
        let counts = self.counts[range].to_vec();
        let mut meta = self.meta.clone();
        if let (Some(first), Some(last)) = (times.first(), times.last()) {
            meta.time_start = *first;
            meta.time_stop = *last + meta.bin_width;
        }
        Self {
            meta,
            times,
            counts,
        }
    }
}
