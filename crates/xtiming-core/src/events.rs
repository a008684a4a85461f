//! Event-level data model: raw and calibrated event streams, GTIs and
//! energy windows.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TimingError};

/// A Good Time Interval, `[start, stop)` in mission seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gti {
    pub start: f64,
    pub stop: f64,
}

impl Gti {
    pub fn new(start: f64, stop: f64) -> Self {
        Self { start, stop }
    }

    pub fn duration(&self) -> f64 {
        self.stop - self.start
    }
}

/// Check that GTIs are finite, ordered and non-overlapping.
pub fn validate_gtis(gtis: &[Gti]) -> Result<()> {
    for (i, gti) in gtis.iter().enumerate() {
        if !gti.start.is_finite() || !gti.stop.is_finite() {
            return Err(TimingError::MalformedGtis(format!(
                "GTI {i} has a non-finite bound"
            )));
        }
        if gti.stop < gti.start {
            return Err(TimingError::MalformedGtis(format!(
                "GTI {i} stops ({}) before it starts ({})",
                gti.stop, gti.start
            )));
        }
        if i > 0 && gti.start < gtis[i - 1].stop {
            return Err(TimingError::MalformedGtis(format!(
                "GTI {i} starts at {} before GTI {} stops at {}",
                gti.start,
                i - 1,
                gtis[i - 1].stop
            )));
        }
    }
    Ok(())
}

/// Inclusive energy acceptance window in keV.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyWindow {
    pub min: f64,
    pub max: f64,
}

impl EnergyWindow {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(TimingError::Config(format!(
                "energy window [{min}, {max}] must be finite with min <= max"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, energy: f64) -> bool {
        energy >= self.min && energy <= self.max
    }
}

/// Time-ordered events with their raw channel codes and, once calibrated,
/// per-event energies.
///
/// All columns have the same length and share one ordering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventStream {
    times: Vec<f64>,
    channels: Vec<i32>,
    energies: Option<Vec<f64>>,
}

impl EventStream {
    pub fn new(times: Vec<f64>, channels: Vec<i32>) -> Result<Self> {
        if times.len() != channels.len() {
            return Err(TimingError::MalformedEvents(format!(
                "{} timestamps but {} channel codes",
                times.len(),
                channels.len()
            )));
        }
        if let Some(i) = times.iter().position(|t| !t.is_finite()) {
            return Err(TimingError::MalformedEvents(format!(
                "timestamp {i} is not finite"
            )));
        }
        if let Some(i) = times.windows(2).position(|w| w[1] < w[0]) {
            return Err(TimingError::MalformedEvents(format!(
                "timestamps decrease at index {}",
                i + 1
            )));
        }
        Ok(Self {
            times,
            channels,
            energies: None,
        })
    }

    /// Attach calibrated energies.
    pub fn with_energies(mut self, energies: Vec<f64>) -> Result<Self> {
        if energies.len() != self.times.len() {
            return Err(TimingError::MalformedEvents(format!(
                "{} energies for {} events",
                energies.len(),
                self.times.len()
            )));
        }
        self.energies = Some(energies);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn channels(&self) -> &[i32] {
        &self.channels
    }

    pub fn energies(&self) -> Option<&[f64]> {
        self.energies.as_deref()
    }
}

/// The resolved catalog row for one observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub mission: String,
    pub obsid: String,
    #[serde(default)]
    pub object: Option<String>,
}

impl Observation {
    pub fn new(mission: impl Into<String>, obsid: impl Into<String>) -> Self {
        Self {
            mission: mission.into(),
            obsid: obsid.into(),
            object: None,
        }
    }
}

/// Columns extracted from one instrument's cleaned event file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvents {
    /// Observation start, mission seconds.
    pub time_start: f64,
    /// Observation stop, mission seconds.
    pub time_stop: f64,
    pub times: Vec<f64>,
    pub channels: Vec<i32>,
    pub gtis: Vec<Gti>,
    /// Energy window recorded with the file, if any.
    #[serde(default)]
    pub energy_window: Option<EnergyWindow>,
}

/// Identity and provenance of a calibrated event product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    pub mission: String,
    pub obsid: String,
    pub instrument: String,
    pub time_start: f64,
    pub time_stop: f64,
    pub energy_window: EnergyWindow,
}

/// Energy-filtered events of one instrument together with its GTIs.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedEvents {
    pub meta: EventMeta,
    pub events: EventStream,
    pub gtis: Vec<Gti>,
}
