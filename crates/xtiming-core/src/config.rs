//! Mission definitions and pipeline settings.
//!
//! A [`TimingConfig`] is built once (from TOML or the built-in defaults) and
//! passed by reference into the pipeline; nothing mutates it afterwards.
//!
//! ```toml
//! default_mission = "nicer"
//! unmapped_channels = "drop"
//!
//! [segmentation]
//! min_gti_sec = 16.0
//! group_period = 128.0
//!
//! [missions.nicer]
//! data_dir = "/data/nicer"
//! calibration = "/data/caldb/nicer/channels.json"
//! good_energy_min = 0.2
//! good_energy_max = 12.0
//! instruments = ["XTI"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TimingError};
use crate::events::EnergyWindow;

/// What calibration does with events whose channel has no curve entry.
///
/// `Drop` keeps the rest of the observation usable when the calibration
/// table has gaps; `Abort` fails the whole instrument on the first
/// unmapped channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedChannelPolicy {
    #[default]
    Drop,
    Abort,
}

/// GTI segmentation and grouping thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// GTIs shorter than this many seconds are discarded.
    pub min_gti_sec: f64,
    /// Consecutive segments separated by less than this many seconds share a group.
    pub group_period: f64,
    /// Optional mean count rate (counts/s) below which a segment is discarded.
    pub min_count_rate: Option<f64>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            min_gti_sec: 16.0,
            group_period: 128.0,
            min_count_rate: None,
        }
    }
}

impl SegmentConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.min_gti_sec.is_finite() || self.min_gti_sec <= 0.0 {
            return Err(TimingError::Config(format!(
                "min_gti_sec must be a positive number of seconds, got {}",
                self.min_gti_sec
            )));
        }
        if !self.group_period.is_finite() || self.group_period <= 0.0 {
            return Err(TimingError::Config(format!(
                "group_period must be a positive number of seconds, got {}",
                self.group_period
            )));
        }
        if let Some(rate) = self.min_count_rate {
            if !rate.is_finite() || rate < 0.0 {
                return Err(TimingError::Config(format!(
                    "min_count_rate must be a non-negative number, got {rate}"
                )));
            }
        }
        Ok(())
    }
}

/// Per-mission paths and instrument definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionConfig {
    /// Filled from the table key when omitted.
    #[serde(default)]
    pub name: String,
    /// Root of the downloaded observations.
    pub data_dir: PathBuf,
    /// Artifact cache root; `<data_dir>/xtiming` when unset.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Channel-to-energy table for this mission.
    pub calibration: PathBuf,
    pub good_energy_min: f64,
    pub good_energy_max: f64,
    pub instruments: Vec<String>,
    /// Mission time reference (MJD of mission second zero).
    #[serde(default)]
    pub mjd_ref: Option<f64>,
}

impl MissionConfig {
    pub fn good_energy(&self) -> Result<EnergyWindow> {
        EnergyWindow::new(self.good_energy_min, self.good_energy_max)
    }

    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("xtiming"))
    }

    pub fn has_instrument(&self, instrument: &str) -> bool {
        self.instruments.iter().any(|i| i == instrument)
    }

    pub fn validate(&self) -> Result<()> {
        if self.instruments.is_empty() {
            return Err(TimingError::Config(format!(
                "mission {} defines no instruments",
                self.name
            )));
        }
        self.good_energy()
            .map_err(|e| TimingError::Config(format!("mission {}: {e}", self.name)))?;
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default)]
    pub default_mission: Option<String>,
    #[serde(default)]
    pub missions: BTreeMap<String, MissionConfig>,
    #[serde(default)]
    pub segmentation: SegmentConfig,
    #[serde(default)]
    pub unmapped_channels: UnmappedChannelPolicy,
}

impl TimingConfig {
    /// Read and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TimingError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: TimingConfig =
            toml::from_str(raw).map_err(|e| TimingError::Config(e.to_string()))?;
        for (key, mission) in config.missions.iter_mut() {
            if mission.name.is_empty() {
                mission.name = key.clone();
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// NICER and NuSTAR definitions with data under `root/<mission>`.
    pub fn with_default_missions(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let mut missions = BTreeMap::new();
        missions.insert(
            "nicer".to_string(),
            MissionConfig {
                name: "nicer".to_string(),
                data_dir: root.join("nicer"),
                cache_dir: None,
                calibration: root.join("nicer").join("calibration.json"),
                good_energy_min: 0.2,
                good_energy_max: 12.0,
                instruments: vec!["XTI".to_string()],
                mjd_ref: Some(56658.0 + 7.775_925_925_925_93e-4),
            },
        );
        missions.insert(
            "nustar".to_string(),
            MissionConfig {
                name: "nustar".to_string(),
                data_dir: root.join("nustar"),
                cache_dir: None,
                calibration: root.join("nustar").join("calibration.json"),
                good_energy_min: 1.6,
                good_energy_max: 79.0,
                instruments: vec!["FPMA".to_string(), "FPMB".to_string()],
                mjd_ref: Some(55197.0 + 7.660_185_2e-4),
            },
        );
        Self {
            default_mission: Some("nicer".to_string()),
            missions,
            segmentation: SegmentConfig::default(),
            unmapped_channels: UnmappedChannelPolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.segmentation.validate()?;
        for mission in self.missions.values() {
            mission.validate()?;
        }
        if let Some(name) = &self.default_mission {
            if !self.missions.contains_key(name) {
                return Err(TimingError::Config(format!(
                    "default mission {name} is not defined"
                )));
            }
        }
        Ok(())
    }

    /// Look up `name`, or the default mission when `name` is `None`.
    /// A configuration with a single mission needs no default.
    pub fn mission(&self, name: Option<&str>) -> Result<&MissionConfig> {
        let name = match name.or(self.default_mission.as_deref()) {
            Some(name) => name,
            None if self.missions.len() == 1 => {
                return self
                    .missions
                    .values()
                    .next()
                    .ok_or_else(|| TimingError::UnknownMission(String::new()))
            }
            None => {
                return Err(TimingError::Config(
                    "no mission given and no default_mission configured".to_string(),
                ))
            }
        };
        self.missions
            .get(name)
            .ok_or_else(|| TimingError::UnknownMission(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
default_mission = "nicer"
unmapped_channels = "abort"

[segmentation]
min_gti_sec = 32.0

[missions.nicer]
data_dir = "/data/nicer"
calibration = "/data/nicer/channels.json"
good_energy_min = 0.2
good_energy_max = 12.0
instruments = ["XTI"]
"#;

    #[test]
    fn parses_toml_and_fills_names() {
        let config = TimingConfig::from_toml_str(SAMPLE).unwrap();
        let nicer = config.mission(None).unwrap();
        assert_eq!(nicer.name, "nicer");
        assert_eq!(nicer.cache_root(), PathBuf::from("/data/nicer/xtiming"));
        assert_eq!(config.unmapped_channels, UnmappedChannelPolicy::Abort);
        // Unset segmentation fields keep their defaults.
        assert_eq!(config.segmentation.min_gti_sec, 32.0);
        assert_eq!(config.segmentation.group_period, 128.0);
    }

    #[test]
    fn defaults_cover_nicer_and_nustar() {
        let config = TimingConfig::with_default_missions("/data");
        config.validate().unwrap();
        let nustar = config.mission(Some("nustar")).unwrap();
        assert!(nustar.has_instrument("FPMA"));
        assert!(nustar.has_instrument("FPMB"));
        assert!(!nustar.has_instrument("XTI"));
        assert_eq!(config.segmentation, SegmentConfig::default());
    }

    #[test]
    fn unknown_mission_is_reported() {
        let config = TimingConfig::with_default_missions("/data");
        assert!(matches!(
            config.mission(Some("chandra")),
            Err(TimingError::UnknownMission(name)) if name == "chandra"
        ));
    }

    #[test]
    fn rejects_inverted_energy_range() {
        let raw = SAMPLE.replace("good_energy_min = 0.2", "good_energy_min = 20.0");
        assert!(matches!(
            TimingConfig::from_toml_str(&raw),
            Err(TimingError::Config(_))
        ));
    }

    #[test]
    fn rejects_undefined_default_mission() {
        let raw = SAMPLE.replace("default_mission = \"nicer\"", "default_mission = \"xmm\"");
        assert!(TimingConfig::from_toml_str(&raw).is_err());
    }

    #[test]
    fn rejects_negative_group_period() {
        let config = SegmentConfig {
            group_period: -1.0,
            ..SegmentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn thresholds_must_be_positive() {
        for config in [
            SegmentConfig {
                min_gti_sec: 0.0,
                ..SegmentConfig::default()
            },
            SegmentConfig {
                group_period: 0.0,
                ..SegmentConfig::default()
            },
        ] {
            assert!(matches!(config.validate(), Err(TimingError::Config(_))));
        }

        let raw = SAMPLE.replace("min_gti_sec = 32.0", "min_gti_sec = 0.0");
        assert!(matches!(
            TimingConfig::from_toml_str(&raw),
            Err(TimingError::Config(_))
        ));
    }
}
