//! Summary statistics over probe durations.
//!
//! Percentiles use the nearest-rank rule: sort ascending, take the element at
//! `floor(p / 100 * n)` clamped to the last index. For small sample counts this
//! makes p95 and p99 equal to the maximum. The median averages the two central
//! values for even counts, and `p50` is always the median.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Aggregate statistics for one (query, mode) sample set, in milliseconds.
///
/// Every real-valued field is `None` when `count == 0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct RunStatistics {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub p50: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub stddev: Option<f64>,
}

impl RunStatistics {
    /// Statistics for an empty sample set.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            count: 0,
            min: None,
            max: None,
            mean: None,
            median: None,
            p50: None,
            p95: None,
            p99: None,
            stddev: None,
        }
    }

    /// Like [`summarize`], but an empty input yields [`RunStatistics::empty`].
    pub fn from_durations(durations_ms: &[f64]) -> Result<Self> {
        match summarize(durations_ms) {
            Err(Error::EmptySamples) => Ok(Self::empty()),
            other => other,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Compute summary statistics over a non-empty set of durations.
///
/// Returns [`Error::EmptySamples`] for an empty slice and
/// [`Error::InvalidSample`] for negative or non-finite values.
pub fn summarize(durations_ms: &[f64]) -> Result<RunStatistics> {
    if durations_ms.is_empty() {
        return Err(Error::EmptySamples);
    }
    if let Some(bad) = durations_ms
        .iter()
        .copied()
        .find(|d| !d.is_finite() || *d < 0.0)
    {
        return Err(Error::InvalidSample(bad));
    }

    let mut sorted = durations_ms.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    #[allow(clippy::cast_precision_loss)]
    let n_f = n as f64;
    let mean = sorted.iter().sum::<f64>() / n_f;
    let median = median_of_sorted(&sorted);
    let stddev = if n > 1 {
        let sum_sq = sorted
            .iter()
            .map(|d| {
                let delta = d - mean;
                delta * delta
            })
            .sum::<f64>();
        (sum_sq / (n_f - 1.0)).sqrt()
    } else {
        0.0
    };

    Ok(RunStatistics {
        count: n,
        min: Some(sorted[0]),
        max: Some(sorted[n - 1]),
        mean: Some(mean),
        median: Some(median),
        p50: Some(median),
        p95: Some(nearest_rank(&sorted, 95.0)),
        p99: Some(nearest_rank(&sorted, 99.0)),
        stddev: Some(stddev),
    })
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        f64::midpoint(sorted[n / 2 - 1], sorted[n / 2])
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let idx = ((p / 100.0) * n as f64).floor() as usize;
    sorted[idx.min(n - 1)]
}

/// Ratio of a baseline (no index) metric to a candidate (with index) metric.
///
/// Undefined when either side is missing or the candidate is zero.
#[must_use]
pub fn speedup(baseline: Option<f64>, candidate: Option<f64>) -> Option<f64> {
    let candidate = candidate.filter(|v| *v != 0.0)?;
    baseline.map(|base| base / candidate)
}
