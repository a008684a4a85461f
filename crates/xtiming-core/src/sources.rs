//! Upstream data: raw event files and calibration tables.
//!
//! The pipeline only sees the two traits; the file-backed implementations
//! read the JSON layouts produced by the extraction tooling.

use std::path::{Path, PathBuf};

use crate::calibration::{CalibrationCurve, ChannelBounds};
use crate::config::MissionConfig;
use crate::error::{Result, TimingError};
use crate::events::{Observation, RawEvents};

/// Supplies the cleaned event columns and GTIs of one instrument.
pub trait EventSource: Send + Sync {
    fn load_raw_events(&self, obs: &Observation, instrument: &str) -> Result<RawEvents>;
}

/// Supplies the channel → energy table of a mission.
pub trait CalibrationSource: Send + Sync {
    fn load_calibration_curve(&self, mission: &MissionConfig) -> Result<CalibrationCurve>;
}

/// Reads `<data_dir>/<obsid>/events/<instrument>.json`.
#[derive(Debug, Clone)]
pub struct FsEventSource {
    data_dir: PathBuf,
}

impl FsEventSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn for_mission(mission: &MissionConfig) -> Self {
        Self::new(mission.data_dir.clone())
    }

    pub fn event_path(&self, obsid: &str, instrument: &str) -> PathBuf {
        self.data_dir
            .join(obsid)
            .join("events")
            .join(format!("{instrument}.json"))
    }
}

impl EventSource for FsEventSource {
    fn load_raw_events(&self, obs: &Observation, instrument: &str) -> Result<RawEvents> {
        let path = self.event_path(&obs.obsid, instrument);
        let bytes = std::fs::read(&path).map_err(|e| {
            TimingError::missing_upstream(&obs.obsid, instrument, format!("{}: {e}", path.display()))
        })?;
        let raw: RawEvents = serde_json::from_slice(&bytes).map_err(|e| {
            TimingError::missing_upstream(&obs.obsid, instrument, format!("{}: {e}", path.display()))
        })?;
        tracing::debug!(
            path = %path.display(),
            events = raw.times.len(),
            gtis = raw.gtis.len(),
            "raw events loaded"
        );
        Ok(raw)
    }
}

/// Reads the JSON channel table named by `MissionConfig::calibration`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsCalibrationSource;

impl FsCalibrationSource {
    pub fn read(path: &Path) -> Result<CalibrationCurve> {
        let bytes = std::fs::read(path).map_err(|e| {
            TimingError::InvalidCalibration(format!("cannot read {}: {e}", path.display()))
        })?;
        let channels: Vec<ChannelBounds> = serde_json::from_slice(&bytes).map_err(|e| {
            TimingError::InvalidCalibration(format!("cannot parse {}: {e}", path.display()))
        })?;
        CalibrationCurve::from_channels(channels)
    }
}

impl CalibrationSource for FsCalibrationSource {
    fn load_calibration_curve(&self, mission: &MissionConfig) -> Result<CalibrationCurve> {
        let curve = Self::read(&mission.calibration)?;
        tracing::info!(
            mission = %mission.name,
            channels = curve.len(),
            "calibration curve loaded"
        );
        Ok(curve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;

    #[test]
    fn reads_event_file_from_observation_dir() {
        let dir = tempfile::tempdir().unwrap();
        let events_dir = dir.path().join("1050360105").join("events");
        std::fs::create_dir_all(&events_dir).unwrap();
        std::fs::write(
            events_dir.join("XTI.json"),
            r#"{"time_start":0.0,"time_stop":100.0,"times":[1.0,2.0],"channels":[50,60],
                "gtis":[{"start":0.0,"stop":100.0}]}"#,
        )
        .unwrap();

        let source = FsEventSource::new(dir.path());
        let raw = source
            .load_raw_events(&Observation::new("nicer", "1050360105"), "XTI")
            .unwrap();
        assert_eq!(raw.channels, vec![50, 60]);
        assert_eq!(raw.time_stop, 100.0);
    }

    #[test]
    fn missing_event_file_is_missing_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsEventSource::new(dir.path());
        match source.load_raw_events(&Observation::new("nicer", "42"), "XTI") {
            Err(TimingError::MissingUpstreamData { obsid, instrument, .. }) => {
                assert_eq!(obsid, "42");
                assert_eq!(instrument, "XTI");
            }
            other => panic!("expected MissingUpstreamData, got {other:?}"),
        }
    }

    #[test]
    fn reads_calibration_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TimingConfig::with_default_missions(dir.path());
        let nicer = config.missions.get_mut("nicer").unwrap();
        nicer.calibration = dir.path().join("channels.json");
        std::fs::write(
            &nicer.calibration,
            r#"[{"channel":0,"e_min":0.0,"e_max":0.01},{"channel":1,"e_min":0.01,"e_max":0.02}]"#,
        )
        .unwrap();

        let curve = FsCalibrationSource.load_calibration_curve(nicer).unwrap();
        assert_eq!(curve.len(), 2);
    }

    #[test]
    fn unreadable_calibration_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channels.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FsCalibrationSource::read(&path),
            Err(TimingError::InvalidCalibration(_))
        ));
    }
}
