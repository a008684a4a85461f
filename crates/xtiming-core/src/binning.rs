//! Fixed-width histogramming of event times.

use crate::error::{Result, TimingError};

/// Counts on a uniform grid starting at `start` with spacing `width`.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedCounts {
    pub start: f64,
    pub width: f64,
    pub counts: Vec<u64>,
}

impl BinnedCounts {
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Left edge of bin `k`.
    pub fn bin_time(&self, k: usize) -> f64 {
        self.start + k as f64 * self.width
    }

    /// Left edges of every bin.
    pub fn times(&self) -> Vec<f64> {
        (0..self.counts.len()).map(|k| self.bin_time(k)).collect()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Largest grid [`bin_count`] accepts: 2^28 bins, 2 GiB of `u64` counts.
pub const MAX_BINS: usize = 1 << 28;

/// Number of bins of `width` needed to cover `[start, stop)`.
///
/// Fails with `InvalidTimeSpan` unless the result is between 1 and
/// [`MAX_BINS`]; a span far narrower than one bin can round to zero.
pub fn bin_count(start: f64, stop: f64, width: f64) -> Result<usize> {
    let invalid = || TimingError::InvalidTimeSpan { start, stop, width };
    let valid = start.is_finite()
        && stop.is_finite()
        && width.is_finite()
        && width > 0.0
        && stop > start;
    if !valid {
        return Err(invalid());
    }
    let n = ((stop - start) / width).ceil();
    if !(n >= 1.0 && n <= MAX_BINS as f64) {
        return Err(invalid());
    }
    Ok(n as usize)
}

/// Histogram `times` into bins `[start + k*width, start + (k+1)*width)`
/// spanning `[start, stop)`.
///
/// Every bin of the span is emitted, including empty ones. Events outside
/// `[start, stop)` are ignored. Runs in `O(events + bins)` and does not
/// require `times` to be sorted.
pub fn bin_events(times: &[f64], width: f64, start: f64, stop: f64) -> Result<BinnedCounts> {
    let n = bin_count(start, stop, width)?;
    let mut counts = vec![0u64; n];

    for &t in times {
        if !(t >= start && t < stop) {
            continue;
        }
        // Rounding can push an event just below `stop` past the last edge.
        let k = (((t - start) / width).floor() as usize).min(n - 1);
        counts[k] += 1;
    }

    Ok(BinnedCounts {
        start,
        width,
        counts,
    })
}
