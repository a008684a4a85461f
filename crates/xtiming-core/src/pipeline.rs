//! Orchestrators: `calibrate`, `lcurve` and `gtis` per observation.
//!
//! Each stage consults the artifact cache first and only pulls its inputs
//! from the previous stage on a miss. Multi-instrument calls isolate
//! failures: one instrument failing never stops the others.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use xtiming_store::CacheKey;

use crate::cache::{ArtifactCache, Cached, Product};
use crate::calibration::{calibrate_events, CalibrationCurve};
use crate::config::{MissionConfig, TimingConfig};
use crate::error::{Result, TimingError};
use crate::events::{
    validate_gtis, CalibratedEvents, EnergyWindow, EventMeta, EventStream, Observation,
};
use crate::gti::{group_segments, segment_gtis, GroupedLightCurve};
use crate::lightcurve::BinnedLightCurve;
use crate::metrics::METRICS;
use crate::obs::{
    emit_calibrated, emit_gtis_done, emit_instrument_failed, emit_lcurve_done, ObservationSpan,
};
use crate::sources::{CalibrationSource, EventSource};

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineOptions {
    /// Recompute every stage touched instead of reading the cache.
    pub overwrite: bool,
    /// Replaces the file's or mission's energy window.
    pub energy_window: Option<EnergyWindow>,
}

/// Successes and failures of one multi-instrument call, keyed by instrument.
#[derive(Debug)]
pub struct InstrumentResults<T> {
    pub products: BTreeMap<String, Cached<T>>,
    pub failures: BTreeMap<String, TimingError>,
}

impl<T> Default for InstrumentResults<T> {
    fn default() -> Self {
        Self {
            products: BTreeMap::new(),
            failures: BTreeMap::new(),
        }
    }
}

impl<T> InstrumentResults<T> {
    pub fn get(&self, instrument: &str) -> Option<&T> {
        self.products.get(instrument).map(|c| &c.value)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, instrument: &str, result: Result<Cached<T>>) {
        match result {
            Ok(product) => {
                self.products.insert(instrument.to_string(), product);
            }
            Err(err) => {
                emit_instrument_failed(instrument, &err);
                self.failures.insert(instrument.to_string(), err);
            }
        }
    }
}

pub struct Pipeline<'a> {
    config: &'a TimingConfig,
    mission: &'a MissionConfig,
    events: &'a dyn EventSource,
    calibration: &'a dyn CalibrationSource,
    cache: &'a ArtifactCache,
    options: PipelineOptions,
    curve: OnceCell<Arc<CalibrationCurve>>,
}

impl<'a> Pipeline<'a> {
    /// Pipeline for `mission`, or the configured default mission.
    pub fn new(
        config: &'a TimingConfig,
        mission: Option<&str>,
        events: &'a dyn EventSource,
        calibration: &'a dyn CalibrationSource,
        cache: &'a ArtifactCache,
    ) -> Result<Self> {
        Ok(Self {
            config,
            mission: config.mission(mission)?,
            events,
            calibration,
            cache,
            options: PipelineOptions::default(),
            curve: OnceCell::new(),
        })
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn mission(&self) -> &MissionConfig {
        self.mission
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    /// The mission's calibration curve, loaded on first use and shared
    /// by every later call.
    pub fn calibration_curve(&self) -> Result<Arc<CalibrationCurve>> {
        self.curve
            .get_or_try_init(|| {
                self.calibration
                    .load_calibration_curve(self.mission)
                    .map(Arc::new)
            })
            .cloned()
    }

    /// Energy-calibrated, filtered events of one instrument.
    pub fn calibrate(
        &self,
        obs: &Observation,
        instrument: &str,
    ) -> Result<Cached<CalibratedEvents>> {
        let _span = ObservationSpan::enter(&obs.mission, &obs.obsid);
        self.check(obs, instrument)?;
        self.calibrate_with(obs, instrument, self.options.overwrite)
    }

    /// `calibrate` for every instrument of the mission.
    pub fn calibrate_all(&self, obs: &Observation) -> InstrumentResults<CalibratedEvents> {
        let _span = ObservationSpan::enter(&obs.mission, &obs.obsid);
        self.each_instrument(&[], |instrument| {
            self.check(obs, instrument)?;
            self.calibrate_with(obs, instrument, self.options.overwrite)
        })
    }

    /// Light curves binned at `bin_width` for `instruments`; an empty list
    /// means every instrument of the mission.
    pub fn lcurve(
        &self,
        obs: &Observation,
        instruments: &[&str],
        bin_width: f64,
    ) -> InstrumentResults<BinnedLightCurve> {
        let _span = ObservationSpan::enter(&obs.mission, &obs.obsid);
        self.each_instrument(instruments, |instrument| {
            self.check(obs, instrument)?;
            self.lcurve_with(obs, instrument, bin_width, self.options.overwrite)
        })
    }

    /// GTI-segmented, grouped light curve of one instrument.
    pub fn gtis(
        &self,
        obs: &Observation,
        instrument: &str,
        bin_width: f64,
    ) -> Result<Cached<GroupedLightCurve>> {
        let _span = ObservationSpan::enter(&obs.mission, &obs.obsid);
        self.check(obs, instrument)?;
        self.gtis_with(obs, instrument, bin_width, self.options.overwrite)
    }

    /// `gtis` for every instrument of the mission.
    pub fn gtis_all(
        &self,
        obs: &Observation,
        bin_width: f64,
    ) -> InstrumentResults<GroupedLightCurve> {
        let _span = ObservationSpan::enter(&obs.mission, &obs.obsid);
        self.each_instrument(&[], |instrument| {
            self.check(obs, instrument)?;
            self.gtis_with(obs, instrument, bin_width, self.options.overwrite)
        })
    }

    /// Cache key of `P` for one instrument.
    ///
    /// Every key carries the requested energy window (`emin`/`emax`): the
    /// override if set, else the mission's good band. Changing either
    /// therefore never serves a product cut with the old window. `params`
    /// come on top.
    pub fn cache_key<P: Product>(
        &self,
        obs: &Observation,
        instrument: &str,
        params: &[(&str, String)],
    ) -> CacheKey {
        let (emin, emax) = match self.options.energy_window {
            Some(window) => (window.min, window.max),
            None => (self.mission.good_energy_min, self.mission.good_energy_max),
        };
        let mut key = CacheKey::new(&obs.mission, &obs.obsid, instrument, P::KIND.as_str())
            .with_param("emin", emin)
            .with_param("emax", emax);
        for (name, value) in params {
            key = key.with_param(*name, value);
        }
        key
    }

    fn check(&self, obs: &Observation, instrument: &str) -> Result<()> {
        if obs.mission != self.mission.name {
            return Err(TimingError::Config(format!(
                "observation {} belongs to mission {}, pipeline runs {}",
                obs.obsid, obs.mission, self.mission.name
            )));
        }
        if !self.mission.has_instrument(instrument) {
            return Err(TimingError::UnknownInstrument {
                mission: self.mission.name.clone(),
                instrument: instrument.to_string(),
            });
        }
        Ok(())
    }

    /// Run `run` for each of `instruments`, or for every mission instrument
    /// when the list is empty, collecting failures per instrument.
    pub fn each_instrument<T>(
        &self,
        instruments: &[&str],
        mut run: impl FnMut(&str) -> Result<Cached<T>>,
    ) -> InstrumentResults<T> {
        let mut results = InstrumentResults::default();
        if instruments.is_empty() {
            for instrument in &self.mission.instruments {
                results.record(instrument, run(instrument.as_str()));
            }
        } else {
            for &instrument in instruments {
                results.record(instrument, run(instrument));
            }
        }
        results
    }

    fn calibrate_with(
        &self,
        obs: &Observation,
        instrument: &str,
        overwrite: bool,
    ) -> Result<Cached<CalibratedEvents>> {
        let key = self.cache_key::<CalibratedEvents>(obs, instrument, &[]);
        self.cache.get_or_compute(&key, overwrite, || {
            let raw = self.events.load_raw_events(obs, instrument)?;
            let window = match self.options.energy_window.or(raw.energy_window) {
                Some(window) => window,
                None => self.mission.good_energy()?,
            };
            validate_gtis(&raw.gtis)?;
            let stream = EventStream::new(raw.times, raw.channels)?;
            let curve = self.calibration_curve()?;

            let outcome =
                calibrate_events(&stream, &curve, window, self.config.unmapped_channels)?;
            METRICS.add_events_dropped(
                (outcome.dropped_unmapped + outcome.dropped_out_of_window) as u64,
            );
            emit_calibrated(
                instrument,
                outcome.events.len(),
                outcome.dropped_unmapped,
                outcome.dropped_out_of_window,
            );

            Ok(CalibratedEvents {
                meta: EventMeta {
                    mission: obs.mission.clone(),
                    obsid: obs.obsid.clone(),
                    instrument: instrument.to_string(),
                    time_start: raw.time_start,
                    time_stop: raw.time_stop,
                    energy_window: window,
                },
                events: outcome.events,
                gtis: raw.gtis,
            })
        })
    }

    fn lcurve_with(
        &self,
        obs: &Observation,
        instrument: &str,
        bin_width: f64,
        overwrite: bool,
    ) -> Result<Cached<BinnedLightCurve>> {
        let key =
            self.cache_key::<BinnedLightCurve>(obs, instrument, &[("bin", bin_width.to_string())]);
        self.cache.get_or_compute(&key, overwrite, || {
            let events = self.calibrate_with(obs, instrument, overwrite)?.value;
            let lc = BinnedLightCurve::from_events(&events, bin_width)?;
            emit_lcurve_done(instrument, bin_width, lc.len(), lc.total_counts());
            Ok(lc)
        })
    }

    fn gtis_with(
        &self,
        obs: &Observation,
        instrument: &str,
        bin_width: f64,
        overwrite: bool,
    ) -> Result<Cached<GroupedLightCurve>> {
        let segmentation = &self.config.segmentation;
        let mut params = vec![
            ("bin", bin_width.to_string()),
            ("min_gti", segmentation.min_gti_sec.to_string()),
            ("group_period", segmentation.group_period.to_string()),
        ];
        if let Some(rate) = segmentation.min_count_rate {
            params.push(("min_rate", rate.to_string()));
        }
        let key = self.cache_key::<GroupedLightCurve>(obs, instrument, &params);

        self.cache.get_or_compute(&key, overwrite, || {
            let lc = self.lcurve_with(obs, instrument, bin_width, overwrite)?.value;
            // The light curve stage just refreshed the calibrated entry when
            // overwriting, so a plain read is enough for the GTIs.
            let events = self.calibrate_with(obs, instrument, false)?.value;

            let segmented = segment_gtis(&lc, &events.gtis, segmentation)?;
            METRICS.add_segments_discarded(segmented.discarded as u64);
            let segments = segmented.segments.len();
            let grouped = group_segments(&lc.meta, segmented.segments, segmentation.group_period);
            emit_gtis_done(instrument, segments, segmented.discarded, grouped.len());
            Ok(grouped)
        })
    }
}
