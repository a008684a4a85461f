//! Split-record encodings of the pipeline products.
//!
//! Every product is one JSON metadata block followed by column blocks:
//!
//! | product              | meta                      | arrays                                 |
//! |----------------------|---------------------------|----------------------------------------|
//! | `CalibratedEvents`   | `EventMeta`               | events (`time`,`channel`,`energy`), GTIs (`start`,`stop`) |
//! | `BinnedLightCurve`   | `LightCurveMeta`          | bins (`time`,`counts`)                 |
//! | `GroupedLightCurve`  | curve meta + group records | one bins block per group, in group order |

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use xtiming_store::StoredArtifact;

use super::columns::{Column, ColumnBlock};
use crate::error::{Result, TimingError};
use crate::events::{CalibratedEvents, EventMeta, EventStream, Gti};
use crate::gti::{GroupedLightCurve, LightCurveGroup};
use crate::lightcurve::{BinnedLightCurve, LightCurveMeta};

/// Product kinds, used as the `kind` component of cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProductKind {
    Calibrated,
    LightCurve,
    Gtis,
}

impl ProductKind {
    pub const ALL: [ProductKind; 3] = [
        ProductKind::Calibrated,
        ProductKind::LightCurve,
        ProductKind::Gtis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::Calibrated => "calib",
            ProductKind::LightCurve => "lc",
            ProductKind::Gtis => "gtis",
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductKind {
    type Err = TimingError;

    fn from_str(s: &str) -> Result<Self> {
        ProductKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TimingError::Config(format!("unknown product kind: {s}")))
    }
}

/// A value the artifact cache can persist.
pub trait Product: Sized {
    const KIND: ProductKind;

    fn to_artifact(&self) -> Result<StoredArtifact>;

    fn from_artifact(artifact: StoredArtifact) -> Result<Self>;
}

fn decode_meta<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| TimingError::corrupt(format!("unreadable metadata block: {e}")))
}

fn expect_arrays(artifact: &StoredArtifact, expected: usize, kind: ProductKind) -> Result<()> {
    if artifact.arrays.len() != expected {
        return Err(TimingError::corrupt(format!(
            "{kind} entry has {} array blocks, expected {expected}",
            artifact.arrays.len()
        )));
    }
    Ok(())
}

fn bins_block(times: &[f64], counts: &[u64]) -> Result<Vec<u8>> {
    ColumnBlock::new()
        .with("time", Column::F64(times.to_vec()))
        .with("counts", Column::U64(counts.to_vec()))
        .to_bytes()
}

fn read_bins(bytes: &[u8]) -> Result<(Vec<f64>, Vec<u64>)> {
    let mut block = ColumnBlock::from_bytes(bytes)?;
    Ok((block.take_f64("time")?, block.take_u64("counts")?))
}

impl Product for CalibratedEvents {
    const KIND: ProductKind = ProductKind::Calibrated;

    fn to_artifact(&self) -> Result<StoredArtifact> {
        let energies = self
            .events
            .energies()
            .ok_or_else(|| TimingError::MalformedEvents("events are not calibrated".to_string()))?;
        let events = ColumnBlock::new()
            .with("time", Column::F64(self.events.times().to_vec()))
            .with(
                "channel",
                Column::I64(self.events.channels().iter().map(|&c| i64::from(c)).collect()),
            )
            .with("energy", Column::F64(energies.to_vec()));
        let gtis = ColumnBlock::new()
            .with("start", Column::F64(self.gtis.iter().map(|g| g.start).collect()))
            .with("stop", Column::F64(self.gtis.iter().map(|g| g.stop).collect()));

        Ok(StoredArtifact::new(serde_json::to_vec(&self.meta)?)
            .with_array(events.to_bytes()?)
            .with_array(gtis.to_bytes()?))
    }

    fn from_artifact(artifact: StoredArtifact) -> Result<Self> {
        expect_arrays(&artifact, 2, Self::KIND)?;
        let meta: EventMeta = decode_meta(&artifact.meta)?;

        let mut events = ColumnBlock::from_bytes(&artifact.arrays[0])?;
        let times = events.take_f64("time")?;
        let channels = events
            .take_i64("channel")?
            .into_iter()
            .map(i32::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TimingError::corrupt(format!("channel out of range: {e}")))?;
        let energies = events.take_f64("energy")?;
        let events = EventStream::new(times, channels)
            .and_then(|s| s.with_energies(energies))
            .map_err(TimingError::corrupt)?;

        let mut gti_block = ColumnBlock::from_bytes(&artifact.arrays[1])?;
        let gtis = gti_block
            .take_f64("start")?
            .into_iter()
            .zip(gti_block.take_f64("stop")?)
            .map(|(start, stop)| Gti::new(start, stop))
            .collect();

        Ok(CalibratedEvents { meta, events, gtis })
    }
}

impl Product for BinnedLightCurve {
    const KIND: ProductKind = ProductKind::LightCurve;

    fn to_artifact(&self) -> Result<StoredArtifact> {
        Ok(StoredArtifact::new(serde_json::to_vec(&self.meta)?)
            .with_array(bins_block(&self.times, &self.counts)?))
    }

    fn from_artifact(artifact: StoredArtifact) -> Result<Self> {
        expect_arrays(&artifact, 1, Self::KIND)?;
        let meta: LightCurveMeta = decode_meta(&artifact.meta)?;
        let (times, counts) = read_bins(&artifact.arrays[0])?;
        BinnedLightCurve::from_parts(meta, times, counts)
    }
}

/// Metadata of one group; its bins live in the matching array block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GroupRecord {
    group: usize,
    segments: Vec<usize>,
    gtis: Vec<Gti>,
    meta: LightCurveMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GroupedMeta {
    meta: LightCurveMeta,
    groups: Vec<GroupRecord>,
}

impl Product for GroupedLightCurve {
    const KIND: ProductKind = ProductKind::Gtis;

    fn to_artifact(&self) -> Result<StoredArtifact> {
        let meta = GroupedMeta {
            meta: self.meta.clone(),
            groups: self
                .groups
                .values()
                .map(|g| GroupRecord {
                    group: g.group,
                    segments: g.segments.clone(),
                    gtis: g.gtis.clone(),
                    meta: g.curve.meta.clone(),
                })
                .collect(),
        };
        let mut artifact = StoredArtifact::new(serde_json::to_vec(&meta)?);
        for group in self.groups.values() {
            artifact = artifact.with_array(bins_block(&group.curve.times, &group.curve.counts)?);
        }
        Ok(artifact)
    }

    fn from_artifact(artifact: StoredArtifact) -> Result<Self> {
        let meta: GroupedMeta = decode_meta(&artifact.meta)?;
        expect_arrays(&artifact, meta.groups.len(), Self::KIND)?;

        let mut groups = BTreeMap::new();
        for (record, block) in meta.groups.into_iter().zip(&artifact.arrays) {
            let (times, counts) = read_bins(block)?;
            let curve = BinnedLightCurve::from_parts(record.meta, times, counts)?;
            let group = LightCurveGroup {
                group: record.group,
                segments: record.segments,
                gtis: record.gtis,
                curve,
            };
            if groups.insert(record.group, group).is_some() {
                return Err(TimingError::corrupt(format!(
                    "group {} is stored twice",
                    record.group
                )));
            }
        }
        Ok(GroupedLightCurve {
            meta: meta.meta,
            groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentConfig;
    use crate::events::EnergyWindow;
    use crate::gti::{group_segments, segment_gtis};

    fn event_meta() -> EventMeta {
        EventMeta {
            mission: "nustar".to_string(),
            obsid: "30101022002".to_string(),
            instrument: "FPMA".to_string(),
            time_start: 1.0e8,
            time_stop: 1.0e8 + 1000.0,
            energy_window: EnergyWindow::new(3.0, 79.0).unwrap(),
        }
    }

    fn light_curve() -> BinnedLightCurve {
        let meta = LightCurveMeta {
            mission: "nustar".to_string(),
            obsid: "30101022002".to_string(),
            instrument: "FPMA".to_string(),
            bin_width: 0.5,
            time_start: 0.0,
            time_stop: 500.0,
            energy_window: EnergyWindow::new(3.0, 79.0).unwrap(),
        };
        let times: Vec<f64> = (0..1000).map(|k| f64::from(k) * 0.5).collect();
        let counts: Vec<u64> = (0..1000).map(|k| k % 7).collect();
        BinnedLightCurve::from_parts(meta, times, counts).unwrap()
    }

    #[test]
    fn kind_names_parse_back() {
        for kind in ProductKind::ALL {
            assert_eq!(kind.as_str().parse::<ProductKind>().unwrap(), kind);
        }
        assert!("pds".parse::<ProductKind>().is_err());
    }

    #[test]
    fn calibrated_events_split_into_three_blocks() {
        let events = CalibratedEvents {
            meta: event_meta(),
            events: EventStream::new(vec![1.0e8 + 0.125, 1.0e8 + 3.5], vec![40, 1200])
                .unwrap()
                .with_energies(vec![3.2, 30.04])
                .unwrap(),
            gtis: vec![Gti::new(1.0e8, 1.0e8 + 600.0), Gti::new(1.0e8 + 700.0, 1.0e8 + 1000.0)],
        };
        let artifact = events.to_artifact().unwrap();
        assert_eq!(artifact.arrays.len(), 2);
        assert_eq!(CalibratedEvents::from_artifact(artifact).unwrap(), events);
    }

    #[test]
    fn uncalibrated_stream_cannot_be_stored() {
        let events = CalibratedEvents {
            meta: event_meta(),
            events: EventStream::new(vec![1.0], vec![40]).unwrap(),
            gtis: vec![],
        };
        assert!(events.to_artifact().is_err());
    }

    #[test]
    fn grouped_curve_stores_one_block_per_group() {
        let lc = light_curve();
        let segments = segment_gtis(
            &lc,
            &[
                Gti::new(0.0, 100.0),
                Gti::new(110.0, 200.0),
                Gti::new(400.0, 500.0),
            ],
            &SegmentConfig::default(),
        )
        .unwrap()
        .segments;
        let grouped = group_segments(&lc.meta, segments, 128.0);
        assert_eq!(grouped.len(), 2);

        let artifact = grouped.to_artifact().unwrap();
        assert_eq!(artifact.arrays.len(), 2);
        assert_eq!(GroupedLightCurve::from_artifact(artifact).unwrap(), grouped);
    }

    #[test]
    fn missing_group_block_is_corrupt() {
        let lc = light_curve();
        let segments = segment_gtis(&lc, &[Gti::new(0.0, 100.0)], &SegmentConfig::default())
            .unwrap()
            .segments;
        let mut artifact = group_segments(&lc.meta, segments, 128.0)
            .to_artifact()
            .unwrap();
        artifact.arrays.clear();
        assert!(matches!(
            GroupedLightCurve::from_artifact(artifact),
            Err(TimingError::CacheCorrupt(_))
        ));
    }

    #[test]
    fn light_curve_with_swapped_blocks_is_corrupt() {
        let mut artifact = light_curve().to_artifact().unwrap();
        std::mem::swap(&mut artifact.meta, &mut artifact.arrays[0]);
        assert!(matches!(
            BinnedLightCurve::from_artifact(artifact),
            Err(TimingError::CacheCorrupt(_))
        ));
    }
}
