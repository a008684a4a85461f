//! xtiming-core: X-ray event timing pipeline.
//!
//! Calibrates raw event channels to energies, bins events into light
//! curves, cuts light curves along Good Time Intervals and groups the
//! segments. Every product is memoized in an [`ArtifactCache`] and produced
//! through a [`Pipeline`].

pub mod binning;
pub mod cache;
pub mod calibration;
pub mod config;
pub mod error;
pub mod events;
pub mod fakes;
pub mod gti;
pub mod lightcurve;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod sources;
pub mod summary;
pub mod telemetry;
pub mod time;

pub use binning::{bin_count, bin_events, BinnedCounts, MAX_BINS};
pub use cache::{ArtifactCache, CacheStatus, Cached, Invalidation, Product, ProductKind};
pub use calibration::{calibrate_events, CalibrationCurve, CalibrationOutcome, ChannelBounds};
pub use config::{MissionConfig, SegmentConfig, TimingConfig, UnmappedChannelPolicy};
pub use error::{Result, TimingError};
pub use events::{
    validate_gtis, CalibratedEvents, EnergyWindow, EventMeta, EventStream, Gti, Observation,
    RawEvents,
};
pub use gti::{
    assign_groups, group_segments, segment_gtis, GroupedLightCurve, GtiSegment, LightCurveGroup,
    Segmentation,
};
pub use lightcurve::{BinnedLightCurve, LightCurveMeta};
pub use metrics::METRICS;
pub use pipeline::{InstrumentResults, Pipeline, PipelineOptions};
pub use sources::{CalibrationSource, EventSource, FsCalibrationSource, FsEventSource};

pub use xtiming_store::CacheKey;
