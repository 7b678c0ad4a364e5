//! Summary statistics over latency samples.
//!
//! Percentiles use linear interpolation between closest ranks:
//! `r = p/100 * (n-1)`, result `v[floor(r)] + frac(r) * (v[ceil(r)] - v[floor(r)])`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from reducing a sample set
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    #[error("Insufficient samples: at least one sample is required")]
    InsufficientSamples,

    #[error("Percentile out of range: {0} (expected 0..=100)")]
    InvalidPercentile(f64),

    #[error("Sample set contains a non-finite value")]
    NonFiniteSample,
}

/// Min/max/mean and tail percentiles of a sample set, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Summary {
    /// Reduce a non-empty sample set
    pub fn from_samples(samples: &[f64]) -> Result<Self, StatsError> {
        let sorted = sorted(samples)?;

        Ok(Self {
            count: sorted.len(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
            p50: interpolate(&sorted, 50.0),
            p95: interpolate(&sorted, 95.0),
            p99: interpolate(&sorted, 99.0),
        })
    }
}

pub fn min(samples: &[f64]) -> Result<f64, StatsError> {
    Ok(sorted(samples)?[0])
}

pub fn max(samples: &[f64]) -> Result<f64, StatsError> {
    let sorted = sorted(samples)?;
    Ok(sorted[sorted.len() - 1])
}

pub fn mean(samples: &[f64]) -> Result<f64, StatsError> {
    let sorted = sorted(samples)?;
    Ok(sorted.iter().sum::<f64>() / sorted.len() as f64)
}

/// Percentile `p` (0..=100) of a sample set
pub fn percentile(samples: &[f64], p: f64) -> Result<f64, StatsError> {
    if !(0.0..=100.0).contains(&p) {
        return Err(StatsError::InvalidPercentile(p));
    }
    Ok(interpolate(&sorted(samples)?, p))
}

/// Validated ascending copy of the samples
fn sorted(samples: &[f64]) -> Result<Vec<f64>, StatsError> {
    if samples.is_empty() {
        return Err(StatsError::InsufficientSamples);
    }
    if samples.iter().any(|v| !v.is_finite()) {
        return Err(StatsError::NonFiniteSample);
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Ok(sorted)
}

// `sorted` must be non-empty and ascending.
fn interpolate(sorted: &[f64], p: f64) -> f64 {
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (rank - rank.floor()) * (sorted[upper] - sorted[lower])
}
