//! Error taxonomy for the timing pipeline.

use xtiming_store::StoreError;

/// Errors produced by calibration, binning, segmentation and the
/// orchestrators.
#[derive(Debug, thiserror::Error)]
pub enum TimingError {
    #[error("channel {channel} has no calibration entry")]
    UnmappedChannel { channel: i32 },

    #[error("invalid time span: start={start}, stop={stop}, bin width={width}")]
    InvalidTimeSpan { start: f64, stop: f64, width: f64 },

    #[error("no usable GTIs: all {total} were shorter than {min_duration}s or empty")]
    NoValidGtis { total: usize, min_duration: f64 },

    #[error("malformed GTIs: {0}")]
    MalformedGtis(String),

    #[error("malformed event stream: {0}")]
    MalformedEvents(String),

    #[error("invalid calibration curve: {0}")]
    InvalidCalibration(String),

    #[error("cache entry corrupt: {0}")]
    CacheCorrupt(String),

    #[error("upstream data missing for {obsid}/{instrument}: {reason}")]
    MissingUpstreamData {
        obsid: String,
        instrument: String,
        reason: String,
    },

    #[error("unknown mission: {0}")]
    UnknownMission(String),

    #[error("instrument {instrument} is not defined for mission {mission}")]
    UnknownInstrument { mission: String, instrument: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TimingError {
    pub(crate) fn missing_upstream(
        obsid: &str,
        instrument: &str,
        reason: impl std::fmt::Display,
    ) -> Self {
        TimingError::MissingUpstreamData {
            obsid: obsid.to_string(),
            instrument: instrument.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn corrupt(reason: impl std::fmt::Display) -> Self {
        TimingError::CacheCorrupt(reason.to_string())
    }
}

/// Result type for timing operations.
pub type Result<T> = std::result::Result<T, TimingError>;
