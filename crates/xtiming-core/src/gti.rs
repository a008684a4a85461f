//! GTI segmentation and grouping.
//!
//! A light curve is cut into one segment per Good Time Interval, short or
//! empty segments are dropped, and the survivors are chained into groups
//! wherever the gap between consecutive segments stays under the grouping
//! period. Each group becomes one concatenated light curve.

use std::collections::BTreeMap;

use crate::config::SegmentConfig;
use crate::error::{Result, TimingError};
use crate::events::{validate_gtis, Gti};
use crate::lightcurve::{BinnedLightCurve, LightCurveMeta};

/// The bins of one retained GTI.
#[derive(Debug, Clone, PartialEq)]
pub struct GtiSegment {
    /// Position among retained segments, in time order.
    pub index: usize,
    /// Group id; equals `index` until grouping runs.
    pub group: usize,
    pub gti: Gti,
    pub curve: BinnedLightCurve,
}

/// Retained segments plus how many GTIs were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub segments: Vec<GtiSegment>,
    pub discarded: usize,
}

/// Slice `lc` into one segment per GTI.
///
/// A segment holds the bins overlapping `[gti.start, gti.stop)`. GTIs
/// shorter than `config.min_gti_sec`, GTIs with no bins and, when
/// `config.min_count_rate` is set, segments below that mean rate are
/// discarded. Fails with `NoValidGtis` when nothing is left.
///
/// The minimum duration applies to the GTI as recorded, not to the part of
/// it the light curve covers: a long GTI running past the end of `lc` keeps
/// its segment even if only a few bins fall inside.
pub fn segment_gtis(
    lc: &BinnedLightCurve,
    gtis: &[Gti],
    config: &SegmentConfig,
) -> Result<Segmentation> {
    validate_gtis(gtis)?;
    let width = lc.bin_width();
    let mut segments = Vec::new();

    for gti in gtis {
        if gti.duration() < config.min_gti_sec {
            tracing::debug!(start = gti.start, stop = gti.stop, "GTI shorter than minimum");
            continue;
        }
        let first = lc.times.partition_point(|&t| t + width <= gti.start);
        let end = lc.times.partition_point(|&t| t < gti.stop);
        if first >= end {
            tracing::debug!(start = gti.start, stop = gti.stop, "GTI covers no bins");
            continue;
        }
        let curve = lc.slice(first..end);
        if let Some(min_rate) = config.min_count_rate {
            if curve.count_rate() < min_rate {
                tracing::debug!(
                    start = gti.start,
                    stop = gti.stop,
                    rate = curve.count_rate(),
                    "GTI below minimum count rate"
                );
                continue;
            }
        }
        let index = segments.len();
        segments.push(GtiSegment {
            index,
            group: index,
            gti: *gti,
            curve,
        });
    }

    let discarded = gtis.len() - segments.len();
    if segments.is_empty() {
        return Err(TimingError::NoValidGtis {
            total: gtis.len(),
            min_duration: config.min_gti_sec,
        });
    }
    Ok(Segmentation {
        segments,
        discarded,
    })
}

/// Assign group ids in one pass: a gap of at least `period` between a
/// segment's stop and the next one's start opens a new group.
pub fn assign_groups(segments: &mut [GtiSegment], period: f64) {
    let mut group = 0;
    let mut prev_stop: Option<f64> = None;
    for segment in segments.iter_mut() {
        if let Some(stop) = prev_stop {
            if segment.gti.start - stop >= period {
                group += 1;
            }
        }
        segment.group = group;
        prev_stop = Some(segment.gti.stop);
    }
}

/// Member segments of one group and their concatenated light curve.
#[derive(Debug, Clone, PartialEq)]
pub struct LightCurveGroup {
    pub group: usize,
    /// Indices of the member segments.
    pub segments: Vec<usize>,
    /// GTIs of the member segments.
    pub gtis: Vec<Gti>,
    pub curve: BinnedLightCurve,
}

impl LightCurveGroup {
    /// Summed duration of the member GTIs.
    pub fn exposure(&self) -> f64 {
        self.gtis.iter().map(Gti::duration).sum()
    }
}

/// Group id → concatenated light curve for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedLightCurve {
    /// Metadata of the light curve the groups were cut from.
    pub meta: LightCurveMeta,
    pub groups: BTreeMap<usize, LightCurveGroup>,
}

impl GroupedLightCurve {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, group: usize) -> Option<&BinnedLightCurve> {
        self.groups.get(&group).map(|g| &g.curve)
    }

    pub fn curves(&self) -> impl Iterator<Item = (usize, &BinnedLightCurve)> {
        self.groups.iter().map(|(id, g)| (*id, &g.curve))
    }

    pub fn segment_count(&self) -> usize {
        self.groups.values().map(|g| g.segments.len()).sum()
    }
}

/// Group `segments` and concatenate each group's bins in time order.
///
/// Bins are copied as they are; a bin shared by two adjacent segments
/// appears once.
pub fn group_segments(
    meta: &LightCurveMeta,
    mut segments: Vec<GtiSegment>,
    period: f64,
) -> GroupedLightCurve {
    assign_groups(&mut segments, period);

    let mut groups: BTreeMap<usize, LightCurveGroup> = BTreeMap::new();
    for segment in segments {
        let group = groups.entry(segment.group).or_insert_with(|| LightCurveGroup {
            group: segment.group,
            segments: Vec::new(),
            gtis: Vec::new(),
            curve: BinnedLightCurve {
                meta: segment.curve.meta.clone(),
                times: Vec::new(),
                counts: Vec::new(),
            },
        });
        group.segments.push(segment.index);
        group.gtis.push(segment.gti);

        let curve = &mut group.curve;
        for (&t, &c) in segment.curve.times.iter().zip(&segment.curve.counts) {
            if curve.times.last().is_some_and(|&last| t <= last) {
                continue;
            }
            curve.times.push(t);
            curve.counts.push(c);
        }
        if let Some(&last) = curve.times.last() {
            curve.meta.time_stop = last + curve.meta.bin_width;
        }
    }

    GroupedLightCurve {
        meta: meta.clone(),
        groups,
    }
}
