//! Population firing rate from the multiunit spike mask

use serde::{Deserialize, Serialize};

use crate::error::{LinmuError, Result};
use crate::types::TimeIndex;

/// Turns a per-bin spike indicator (0 or 1) into spikes/s, one value per bin
pub trait FiringRateEstimator: Send + Sync {
    fn estimate(&self, spikes: &[f64], sampling_frequency: f64) -> Vec<f64>;
}

/// Gaussian-smoothed instantaneous rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianFiringRate {
    /// Kernel standard deviation in seconds
    pub smoothing_sigma: f64,
    /// Kernel half-width in standard deviations
    pub truncate: f64,
}

impl GaussianFiringRate {
    /// 15 ms kernel truncated at 8 standard deviations
    pub const DEFAULT: GaussianFiringRate = GaussianFiringRate {
        smoothing_sigma: 0.015,
        truncate: 8.0,
    };
}

impl Default for GaussianFiringRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FiringRateEstimator for GaussianFiringRate {
    fn estimate(&self, spikes: &[f64], sampling_frequency: f64) -> Vec<f64> {
        let rate: Vec<f64> = spikes.iter().map(|s| s * sampling_frequency).collect();
        gaussian_smooth(&rate, self.smoothing_sigma * sampling_frequency, self.truncate)
    }
}

/// Convolve with a normalised Gaussian of `sigma` samples; zeros are assumed beyond the ends
pub fn gaussian_smooth(data: &[f64], sigma: f64, truncate: f64) -> Vec<f64> {
    if !(sigma.is_finite() && sigma > 0.0) || data.is_empty() {
        return data.to_vec();
    }
    let radius = (truncate * sigma + 0.5) as usize;
    let mut kernel: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let k = i as f64 - radius as f64;
            (-0.5 * (k / sigma).powi(2)).exp()
        })
        .collect();
    let total: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= total);

    let n = data.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(radius);
            let hi = (i + radius).min(n - 1);
            (lo..=hi)
                .map(|j| kernel[j + radius - i] * data[j])
                .sum()
        })
        .collect()
}

/// Smoothed multiunit rate aligned to the position grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationFiringRate {
    pub time: TimeIndex,
    /// spikes/s
    pub firing_rate: Vec<f64>,
}

impl PopulationFiringRate {
    pub fn len(&self) -> usize {
        self.firing_rate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.firing_rate.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.firing_rate.is_empty() {
            None
        } else {
            Some(self.firing_rate.iter().sum::<f64>() / self.firing_rate.len() as f64)
        }
    }
}

/// Estimate the population rate from the spike mask
pub fn estimate_firing_rate(
    estimator: &dyn FiringRateEstimator,
    mask: &[bool],
    sampling_frequency: f64,
    time: &TimeIndex,
) -> Result<PopulationFiringRate> {
    if !(sampling_frequency.is_finite() && sampling_frequency > 0.0) {
        return Err(LinmuError::InvalidParameter(format!(
            "sampling_frequency must be positive, got {}",
            sampling_frequency
        )));
    }
    if mask.len() != time.len() {
        return Err(LinmuError::MalformedData(format!(
            "spike mask has {} bins but the time index has {}",
            mask.len(),
            time.len()
        )));
    }

    let spikes: Vec<f64> = mask.iter().map(|&m| if m { 1.0 } else { 0.0 }).collect();
    let firing_rate = estimator.estimate(&spikes, sampling_frequency);
    if firing_rate.len() != mask.len() {
        return Err(LinmuError::MalformedData(format!(
            "firing rate estimator returned {} values for {} bins",
            firing_rate.len(),
            mask.len()
        )));
    }

    Ok(PopulationFiringRate {
        time: time.clone(),
        firing_rate,
    })
}
