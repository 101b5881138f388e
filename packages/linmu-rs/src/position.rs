//! Position loading and resampling
//!
//! Raw position arrives irregularly sampled (camera frames). It is averaged
//! into fixed-width bins, gaps are filled by linear interpolation in time, and
//! invalid speeds are clamped, giving the uniform grid every other stream is
//! aligned to.

use serde::{Deserialize, Serialize};

use crate::config::{Animal, AnimalRegistry};
use crate::error::{LinmuError, Result};
use crate::types::{EpochKey, PositionSample, TimeIndex};

/// Column count of a raw position matrix without the smoothed block
pub const RAW_COLUMN_COUNT: usize = 5;

/// Column count once the smoothed x, y, head direction and speed are appended
pub const SMOOTHED_COLUMN_COUNT: usize = 9;

/// Source of raw position matrices.
///
/// Rows are samples; columns are `[time, x, y, head_direction, speed]`,
/// optionally followed by their four smoothed counterparts. Time is in seconds.
pub trait PositionReader: Send + Sync {
    fn read_position(&self, animal: &Animal, day: u32, epoch: u32) -> Result<Vec<Vec<f64>>>;
}

/// Which block of the raw matrix the samples came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    Raw,
    Smoothed,
}

/// Position samples tagged with the columns they were read from
#[derive(Debug, Clone, PartialEq)]
pub enum PositionColumns {
    Raw(Vec<PositionSample>),
    Smoothed(Vec<PositionSample>),
}

impl PositionColumns {
    /// Pick the smoothed block when the matrix has one, the raw block otherwise
    pub fn from_matrix(matrix: &[Vec<f64>]) -> Result<Self> {
        let n_cols = match matrix.first() {
            Some(row) => row.len(),
            None => {
                return Err(LinmuError::MissingData(
                    "position matrix has no rows".to_string(),
                ))
            }
        };
        if let Some(row) = matrix.iter().position(|r| r.len() != n_cols) {
            return Err(LinmuError::MalformedData(format!(
                "position row {} has {} columns, expected {}",
                row,
                matrix[row].len(),
                n_cols
            )));
        }

        let (smoothed, offset) = if n_cols > RAW_COLUMN_COUNT {
            if n_cols < SMOOTHED_COLUMN_COUNT {
                return Err(LinmuError::MalformedData(format!(
                    "position matrix has {} columns; expected {} or at least {}",
                    n_cols, RAW_COLUMN_COUNT, SMOOTHED_COLUMN_COUNT
                )));
            }
            (true, RAW_COLUMN_COUNT)
        } else if n_cols == RAW_COLUMN_COUNT {
            (false, 1)
        } else {
            return Err(LinmuError::MalformedData(format!(
                "position matrix has {} columns; expected at least {}",
                n_cols, RAW_COLUMN_COUNT
            )));
        };

        let samples: Vec<PositionSample> = matrix
            .iter()
            .map(|row| {
                PositionSample::new(
                    row[0],
                    row[offset],
                    row[offset + 1],
                    row[offset + 2],
                    row[offset + 3],
                )
            })
            .collect();

        for (i, pair) in samples.windows(2).enumerate() {
            if !(pair[1].time > pair[0].time) {
                return Err(LinmuError::MalformedData(format!(
                    "position time is not strictly increasing at row {} ({} -> {})",
                    i + 1,
                    pair[0].time,
                    pair[1].time
                )));
            }
        }
        if let Some(sample) = samples.iter().find(|s| !s.time.is_finite()) {
            return Err(LinmuError::MalformedData(format!(
                "non-finite position time {}",
                sample.time
            )));
        }

        Ok(if smoothed {
            PositionColumns::Smoothed(samples)
        } else {
            PositionColumns::Raw(samples)
        })
    }

    pub fn source(&self) -> PositionSource {
        match self {
            PositionColumns::Raw(_) => PositionSource::Raw,
            PositionColumns::Smoothed(_) => PositionSource::Smoothed,
        }
    }

    pub fn samples(&self) -> &[PositionSample] {
        match self {
            PositionColumns::Raw(samples) | PositionColumns::Smoothed(samples) => samples,
        }
    }
}

/// Read one epoch's raw position, preferring smoothed columns when present
pub fn load_raw_position(
    reader: &dyn PositionReader,
    animals: &AnimalRegistry,
    epoch_key: &EpochKey,
) -> Result<PositionColumns> {
    let animal = animals.get(&epoch_key.animal)?;
    let matrix = reader.read_position(animal, epoch_key.day, epoch_key.epoch)?;
    if matrix.is_empty() {
        return Err(LinmuError::MissingData(format!(
            "no position samples for {}",
            epoch_key
        )));
    }

    let columns = PositionColumns::from_matrix(&matrix)?;
    log::info!(
        "Loaded {} {:?} position samples for {}",
        columns.samples().len(),
        columns.source(),
        epoch_key
    );
    Ok(columns)
}

/// Position on a uniform time grid, stored column-wise
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResampledPositionSeries {
    pub time: TimeIndex,
    /// Grid step in seconds
    pub step: f64,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub head_direction: Vec<f64>,
    pub speed: Vec<f64>,
}

impl ResampledPositionSeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// (x, y) pairs in grid order
    pub fn points(&self) -> Vec<[f64; 2]> {
        self.x.iter().zip(&self.y).map(|(&x, &y)| [x, y]).collect()
    }

    pub fn sample(&self, row: usize) -> Option<PositionSample> {
        Some(PositionSample::new(
            *self.time.get(row)?,
            self.x[row],
            self.y[row],
            self.head_direction[row],
            self.speed[row],
        ))
    }
}

const NANOS_PER_SECOND: f64 = 1e9;

fn to_nanos(seconds: f64) -> i64 {
    (seconds * NANOS_PER_SECOND).round() as i64
}

/// Resample onto a grid of width `step` seconds and clean the result.
///
/// The grid starts at the first sample's time. Samples are binned by
/// `floor((time - first) / step)`, bins are labelled by their left edge
/// (`first + k * step`) and averaged, ignoring NaN values. Empty bins are filled by linear
/// interpolation in time between the nearest valid neighbours. Per column,
/// bins before the first valid value stay NaN and bins after the last valid
/// value hold that value; nothing is extrapolated. Negative speeds become 0.
pub fn resample_and_clean(samples: &[PositionSample], step: f64) -> Result<ResampledPositionSeries> {
    if !(step.is_finite() && step > 0.0) {
        return Err(LinmuError::InvalidParameter(format!(
            "resampling step must be positive, got {}",
            step
        )));
    }
    let step_ns = to_nanos(step);
    if step_ns < 1 {
        return Err(LinmuError::InvalidParameter(format!(
            "resampling step {} is below 1 ns",
            step
        )));
    }
    let (first, last) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(LinmuError::MissingData(
                "no position samples to resample".to_string(),
            ))
        }
    };

    let origin_ns = to_nanos(first.time);
    let last_bin = (to_nanos(last.time) - origin_ns).div_euclid(step_ns);
    if last_bin < 0 {
        return Err(LinmuError::MalformedData(
            "position time runs backwards".to_string(),
        ));
    }
    let n_bins = (last_bin + 1) as usize;

    let mut sums = vec![[0.0f64; 4]; n_bins];
    let mut counts = vec![[0u32; 4]; n_bins];
    for sample in samples {
        let bin = (to_nanos(sample.time) - origin_ns).div_euclid(step_ns) as usize;
        let values = [sample.x, sample.y, sample.head_direction, sample.speed];
        for (column, value) in values.into_iter().enumerate() {
            if value.is_finite() {
                sums[bin][column] += value;
                counts[bin][column] += 1;
            }
        }
    }

    let time: Vec<f64> = (0..n_bins)
        .map(|i| (origin_ns + i as i64 * step_ns) as f64 / NANOS_PER_SECOND)
        .collect();

    let mut columns: Vec<Vec<f64>> = (0..4)
        .map(|column| {
            let means: Vec<f64> = sums
                .iter()
                .zip(&counts)
                .map(|(sum, count)| {
                    if count[column] > 0 {
                        sum[column] / count[column] as f64
                    } else {
                        f64::NAN
                    }
                })
                .collect();
            interpolate_time(&time, &means)
        })
        .collect();

    let mut speed = columns.pop().unwrap_or_default();
    let head_direction = columns.pop().unwrap_or_default();
    let y = columns.pop().unwrap_or_default();
    let x = columns.pop().unwrap_or_default();

    let mut clamped = 0usize;
    for value in speed.iter_mut() {
        if *value < 0.0 {
            *value = 0.0;
            clamped += 1;
        }
    }

    let occupied = counts.iter().filter(|c| c.iter().any(|&n| n > 0)).count();
    log::debug!(
        "Resampled {} samples into {} bins of {} s ({} interpolated, {} negative speeds clamped)",
        samples.len(),
        n_bins,
        step,
        n_bins - occupied,
        clamped
    );

    Ok(ResampledPositionSeries {
        time: TimeIndex::new(time),
        step,
        x,
        y,
        head_direction,
        speed,
    })
}

/// Fill NaN entries by linear interpolation on `time`.
///
/// Leading NaNs are kept, trailing NaNs take the last valid value.
pub(crate) fn interpolate_time(time: &[f64], values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    let mut previous: Option<usize> = None;
    let mut i = 0;
    while i < out.len() {
        if !out[i].is_nan() {
            previous = Some(i);
            i += 1;
            continue;
        }
        let next = (i + 1..out.len()).find(|&j| !values[j].is_nan());
        match (previous, next) {
            (Some(a), Some(b)) => {
                let span = time[b] - time[a];
                for k in i..b {
                    let fraction = (time[k] - time[a]) / span;
                    out[k] = values[a] + (values[b] - values[a]) * fraction;
                }
                i = b;
            }
            (Some(a), None) => {
                for value in out.iter_mut().skip(i) {
                    *value = values[a];
                }
                break;
            }
            (None, Some(b)) => i = b,
            (None, None) => break,
        }
    }
    out
}
