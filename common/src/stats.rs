//! Pooling of per-shard sample statistics.
//!
//! Every shard reports a mean and standard deviation over its own samples.
//! Averaging those directly is wrong as soon as shards differ in size, so
//! these combine them into the statistics of the union of all samples, using
//! the sample counts as weights.

use crate::error::{Error, Result};

/// `Σ(mean_i * weight_i) / Σ weight_i`
pub fn combine_means(means: &[f64], weights: &[u64]) -> Result<f64> {
    if means.len() != weights.len() {
        return Err(Error::InvalidInput(format!(
            "{} means but {} weights",
            means.len(),
            weights.len()
        )));
    }
    let total_weight: u64 = weights.iter().sum();
    if total_weight == 0 {
        return Err(Error::DivisionByZero);
    }
    let weighted = means
        .iter()
        .zip(weights)
        .map(|(mean, weight)| mean * *weight as f64)
        .sum::<f64>();
    Ok(weighted / total_weight as f64)
}

/// Pooled standard deviation of several sub-samples.
///
/// Accumulates `Σ[(w_i - 1)·σ_i² + w_i·μ_i²]`, removes
/// `total_weight·combined_mean²` and divides by `total_weight - 1`.
pub fn combine_stddevs(
    stddevs: &[f64],
    weights: &[u64],
    means: &[f64],
    total_weight: u64,
    combined_mean: f64,
) -> Result<f64> {
    if stddevs.len() != weights.len() || means.len() != weights.len() {
        return Err(Error::InvalidInput(format!(
            "{} stddevs, {} weights and {} means",
            stddevs.len(),
            weights.len(),
            means.len()
        )));
    }
    if total_weight <= 1 {
        return Err(Error::InvalidInput(format!(
            "sample variance is undefined for a total weight of {total_weight}"
        )));
    }

    let accumulated = stddevs
        .iter()
        .zip(weights)
        .zip(means)
        .map(|((stddev, weight), mean)| {
            let weight = *weight as f64;
            (weight - 1.0) * stddev * stddev + weight * mean * mean
        })
        .sum::<f64>();
    let total = total_weight as f64;
    let variance = (accumulated - total * combined_mean * combined_mean) / (total - 1.0);
    // rounding can push an exact zero variance slightly negative
    Ok(variance.max(0.0).sqrt())
}

/// Mean, standard deviation and sample count of one sample set.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SampleStats {
    pub mean: f64,
    pub stddev: f64,
    pub count: u64,
}

impl SampleStats {
    pub fn new(mean: f64, stddev: f64, count: u64) -> Self {
        Self {
            mean,
            stddev,
            count,
        }
    }

    /// Combines sample sets into the statistics of their union.
    pub fn pool(parts: &[SampleStats]) -> Result<SampleStats> {
        let means = parts.iter().map(|x| x.mean).collect::<Vec<_>>();
        let stddevs = parts.iter().map(|x| x.stddev).collect::<Vec<_>>();
        let weights = parts.iter().map(|x| x.count).collect::<Vec<_>>();
        let count = weights.iter().sum();

        let mean = combine_means(&means, &weights)?;
        let stddev = combine_stddevs(&stddevs, &weights, &means, count, mean)?;
        Ok(SampleStats {
            mean,
            stddev,
            count,
        })
    }
}
