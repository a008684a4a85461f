//! Channel-to-energy calibration and energy filtering.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::UnmappedChannelPolicy;
use crate::error::{Result, TimingError};
use crate::events::{EnergyWindow, EventStream};

/// Energy bounds (keV) of one instrument channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelBounds {
    pub channel: i32,
    pub e_min: f64,
    pub e_max: f64,
}

impl ChannelBounds {
    pub fn midpoint(&self) -> f64 {
        (self.e_min + self.e_max) / 2.0
    }
}

/// Immutable channel → energy table for one mission.
///
/// Lookups are direct indexing when the channels form one contiguous run
/// (the usual PI layout) and a binary search otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationCurve {
    channels: Vec<ChannelBounds>,
    contiguous: bool,
}

impl CalibrationCurve {
    pub fn from_channels(mut channels: Vec<ChannelBounds>) -> Result<Self> {
        if channels.is_empty() {
            return Err(TimingError::InvalidCalibration(
                "calibration table is empty".to_string(),
            ));
        }
        for c in &channels {
            if !c.e_min.is_finite() || !c.e_max.is_finite() || c.e_min > c.e_max {
                return Err(TimingError::InvalidCalibration(format!(
                    "channel {} has invalid bounds [{}, {}]",
                    c.channel, c.e_min, c.e_max
                )));
            }
        }
        channels.sort_by_key(|c| c.channel);
        if let Some(dup) = channels.windows(2).find(|w| w[0].channel == w[1].channel) {
            return Err(TimingError::InvalidCalibration(format!(
                "channel {} appears more than once",
                dup[0].channel
            )));
        }
        let contiguous = channels
            .windows(2)
            .all(|w| w[1].channel == w[0].channel + 1);
        Ok(Self {
            channels,
            contiguous,
        })
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn bounds(&self, channel: i32) -> Option<&ChannelBounds> {
        if self.contiguous {
            let first = self.channels.first()?.channel;
            let offset = i64::from(channel) - i64::from(first);
            usize::try_from(offset)
                .ok()
                .and_then(|i| self.channels.get(i))
        } else {
            self.channels
                .binary_search_by_key(&channel, |c| c.channel)
                .ok()
                .map(|i| &self.channels[i])
        }
    }

    /// Energy estimate for `channel`: the midpoint of its bounds.
    pub fn energy(&self, channel: i32) -> Result<f64> {
        self.bounds(channel)
            .map(ChannelBounds::midpoint)
            .ok_or(TimingError::UnmappedChannel { channel })
    }

    /// Lowest and highest energy covered by the table.
    pub fn energy_range(&self) -> (f64, f64) {
        let lo = self
            .channels
            .iter()
            .map(|c| c.e_min)
            .fold(f64::INFINITY, f64::min);
        let hi = self
            .channels
            .iter()
            .map(|c| c.e_max)
            .fold(f64::NEG_INFINITY, f64::max);
        (lo, hi)
    }
}

/// Result of calibrating and energy-filtering one event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOutcome {
    pub events: EventStream,
    pub dropped_unmapped: usize,
    pub dropped_out_of_window: usize,
    pub unmapped_channels: BTreeSet<i32>,
}

/// Assign energies from `curve` and keep events inside `window`.
///
/// Event order is preserved. Unmapped channels are handled per `policy`:
/// dropped and counted, or reported as `UnmappedChannel`.
pub fn calibrate_events(
    stream: &EventStream,
    curve: &CalibrationCurve,
    window: EnergyWindow,
    policy: UnmappedChannelPolicy,
) -> Result<CalibrationOutcome> {
    let mut times = Vec::with_capacity(stream.len());
    let mut channels = Vec::with_capacity(stream.len());
    let mut energies = Vec::with_capacity(stream.len());
    let mut dropped_unmapped = 0;
    let mut dropped_out_of_window = 0;
    let mut unmapped_channels = BTreeSet::new();

    for (&time, &channel) in stream.times().iter().zip(stream.channels()) {
        let energy = match curve.energy(channel) {
            Ok(energy) => energy,
            Err(err) => match policy {
                UnmappedChannelPolicy::Abort => return Err(err),
                UnmappedChannelPolicy::Drop => {
                    dropped_unmapped += 1;
                    unmapped_channels.insert(channel);
                    continue;
                }
            },
        };
        if !window.contains(energy) {
            dropped_out_of_window += 1;
            continue;
        }
        times.push(time);
        channels.push(channel);
        energies.push(energy);
    }

    if dropped_unmapped > 0 {
        tracing::warn!(
            event = "calibrate.unmapped_channels",
            dropped = dropped_unmapped,
            channels = ?unmapped_channels,
            "events with uncalibrated channels were dropped"
        );
    }

    let events = EventStream::new(times, channels)?.with_energies(energies)?;
    Ok(CalibrationOutcome {
        events,
        dropped_unmapped,
        dropped_out_of_window,
        unmapped_channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_curve(n: i32) -> CalibrationCurve {
        // 10 eV per channel, like NICER PI.
        CalibrationCurve::from_channels(
            (0..n)
                .map(|c| ChannelBounds {
                    channel: c,
                    e_min: f64::from(c) * 0.01,
                    e_max: f64::from(c + 1) * 0.01,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn energy_is_bound_midpoint() {
        let curve = linear_curve(100);
        assert!((curve.energy(50).unwrap() - 0.505).abs() < 1e-12);
    }

    #[test]
    fn sparse_curve_uses_search() {
        let curve = CalibrationCurve::from_channels(vec![
            ChannelBounds { channel: 40, e_min: 4.0, e_max: 4.2 },
            ChannelBounds { channel: 10, e_min: 1.0, e_max: 1.2 },
        ])
        .unwrap();
        assert!((curve.energy(10).unwrap() - 1.1).abs() < 1e-12);
        assert!((curve.energy(40).unwrap() - 4.1).abs() < 1e-12);
        assert!(matches!(
            curve.energy(20),
            Err(TimingError::UnmappedChannel { channel: 20 })
        ));
        assert_eq!(curve.energy_range(), (1.0, 4.2));
    }

    #[test]
    fn contiguous_curve_rejects_out_of_range() {
        let curve = linear_curve(10);
        assert!(curve.energy(-1).is_err());
        assert!(curve.energy(10).is_err());
        assert!(curve.energy(i32::MIN).is_err());
    }

    #[test]
    fn duplicate_channels_rejected() {
        let c = ChannelBounds { channel: 3, e_min: 0.0, e_max: 1.0 };
        assert!(matches!(
            CalibrationCurve::from_channels(vec![c, c]),
            Err(TimingError::InvalidCalibration(_))
        ));
    }

    #[test]
    fn filter_keeps_closed_window_in_order() {
        let curve = linear_curve(1000);
        // Channel 100 -> ~1.005 keV, 200 -> ~2.005 keV, 900 -> ~9.005 keV.
        let stream =
            EventStream::new(vec![1.0, 2.0, 3.0, 4.0], vec![100, 900, 200, 100]).unwrap();
        let window = EnergyWindow::new(1.0, 2.5).unwrap();
        let out =
            calibrate_events(&stream, &curve, window, UnmappedChannelPolicy::Drop).unwrap();
        assert_eq!(out.events.times(), &[1.0, 3.0, 4.0]);
        assert_eq!(out.events.channels(), &[100, 200, 100]);
        assert_eq!(out.dropped_out_of_window, 1);
        assert_eq!(out.dropped_unmapped, 0);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let curve = CalibrationCurve::from_channels(vec![
            ChannelBounds { channel: 1, e_min: 1.0, e_max: 2.0 },
            ChannelBounds { channel: 2, e_min: 2.0, e_max: 3.0 },
            ChannelBounds { channel: 3, e_min: 3.0, e_max: 4.0 },
        ])
        .unwrap();
        let stream = EventStream::new(vec![0.0, 1.0, 2.0], vec![1, 2, 3]).unwrap();
        let window = EnergyWindow::new(1.5, 2.5).unwrap();
        let out =
            calibrate_events(&stream, &curve, window, UnmappedChannelPolicy::Drop).unwrap();
        assert_eq!(out.events.energies(), Some(&[1.5, 2.5][..]));
    }

    #[test]
    fn drop_policy_skips_unmapped_events() {
        let curve = linear_curve(100);
        let stream = EventStream::new(vec![1.0, 2.0, 3.0], vec![10, 5000, 20]).unwrap();
        let window = EnergyWindow::new(0.0, 100.0).unwrap();
        let out =
            calibrate_events(&stream, &curve, window, UnmappedChannelPolicy::Drop).unwrap();
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.dropped_unmapped, 1);
        assert!(out.unmapped_channels.contains(&5000));
    }

    #[test]
    fn abort_policy_fails_on_unmapped() {
        let curve = linear_curve(100);
        let stream = EventStream::new(vec![1.0, 2.0], vec![10, 5000]).unwrap();
        let window = EnergyWindow::new(0.0, 100.0).unwrap();
        assert!(matches!(
            calibrate_events(&stream, &curve, window, UnmappedChannelPolicy::Abort),
            Err(TimingError::UnmappedChannel { channel: 5000 })
        ));
    }

    #[test]
    fn wider_window_is_superset() {
        let curve = linear_curve(1200);
        let channels: Vec<i32> = (0..1200).step_by(7).collect();
        let times: Vec<f64> = (0..channels.len()).map(|i| i as f64).collect();
        let stream = EventStream::new(times, channels).unwrap();

        let narrow = calibrate_events(
            &stream,
            &curve,
            EnergyWindow::new(2.0, 8.0).unwrap(),
            UnmappedChannelPolicy::Drop,
        )
        .unwrap();
        let wide = calibrate_events(
            &stream,
            &curve,
            EnergyWindow::new(0.5, 11.0).unwrap(),
            UnmappedChannelPolicy::Drop,
        )
        .unwrap();

        assert!(wide.events.len() > narrow.events.len());
        for t in narrow.events.times() {
            assert!(wide.events.times().contains(t));
        }
    }
}
