//! Shared fixtures for the pipeline integration tests.

#![allow(dead_code)]

use xtiming_core::fakes::{MemoryEventSource, StaticCalibrationSource};
use xtiming_core::{
    CalibrationCurve, ChannelBounds, EnergyWindow, Gti, Observation, RawEvents, TimingConfig,
};

pub const NICER_OBSID: &str = "1050360105";
pub const NUSTAR_OBSID: &str = "30101022002";

/// 10 eV channels from 0 keV, like NICER PI.
pub fn linear_curve(channels: i32) -> CalibrationCurve {
    CalibrationCurve::from_channels(
        (0..channels)
            .map(|c| ChannelBounds {
                channel: c,
                e_min: f64::from(c) * 0.01,
                e_max: f64::from(c + 1) * 0.01,
            })
            .collect(),
    )
    .unwrap()
}

pub fn calibration() -> StaticCalibrationSource {
    StaticCalibrationSource::new(linear_curve(8000))
}

/// One event per second over `[0, 1000)`, all at channel 100 (~1 keV),
/// with GTIs `[0, 400)` and `[450, 1000)`.
pub fn uniform_events() -> RawEvents {
    RawEvents {
        time_start: 0.0,
        time_stop: 1000.0,
        times: (0..1000).map(f64::from).collect(),
        channels: vec![100; 1000],
        gtis: vec![Gti::new(0.0, 400.0), Gti::new(450.0, 1000.0)],
        energy_window: None,
    }
}

pub fn config() -> TimingConfig {
    TimingConfig::with_default_missions("/data")
}

pub fn nicer_obs() -> Observation {
    Observation::new("nicer", NICER_OBSID)
}

pub fn nustar_obs() -> Observation {
    Observation::new("nustar", NUSTAR_OBSID)
}

pub fn nicer_source() -> MemoryEventSource {
    MemoryEventSource::new().with(NICER_OBSID, "XTI", uniform_events())
}

pub fn window(min: f64, max: f64) -> EnergyWindow {
    EnergyWindow::new(min, max).unwrap()
}

/// `uniform_events` shifted to channel 500 (~5 keV) for NuSTAR's band.
pub fn hard_events() -> RawEvents {
    RawEvents {
        channels: vec![500; 1000],
        ..uniform_events()
    }
}
