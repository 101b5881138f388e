use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::LinmuError;

/// One recording epoch: animal short name, day and epoch (both 1-based)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EpochKey {
    pub animal: String,
    pub day: u32,
    pub epoch: u32,
}

impl EpochKey {
    pub fn new(animal: impl Into<String>, day: u32, epoch: u32) -> Self {
        Self {
            animal: animal.into(),
            day,
            epoch,
        }
    }
}

impl fmt::Display for EpochKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.animal, self.day, self.epoch)
    }
}

impl FromStr for EpochKey {
    type Err = LinmuError;

    /// Parse `animal:day:epoch`, e.g. `CH105:3:2`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 || parts[0].trim().is_empty() {
            return Err(LinmuError::InvalidParameter(format!(
                "Invalid epoch key '{}': expected 'animal:day:epoch'",
                s
            )));
        }
        let day = parts[1].trim().parse::<u32>().map_err(|_| {
            LinmuError::InvalidParameter(format!("Invalid day '{}' in epoch key '{}'", parts[1], s))
        })?;
        let epoch = parts[2].trim().parse::<u32>().map_err(|_| {
            LinmuError::InvalidParameter(format!(
                "Invalid epoch '{}' in epoch key '{}'",
                parts[2], s
            ))
        })?;
        Ok(Self::new(parts[0].trim(), day, epoch))
    }
}

/// Shared, immutable timestamps in seconds.
///
/// Computed once from the resampled position grid and handed explicitly to every
/// component that needs to align data to it. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeIndex(Arc<[f64]>);

impl TimeIndex {
    pub fn new(times: Vec<f64>) -> Self {
        Self(times.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn first(&self) -> Option<f64> {
        self.0.first().copied()
    }

    pub fn last(&self) -> Option<f64> {
        self.0.last().copied()
    }

    /// New index holding only the given rows, in the given order
    pub fn select(&self, rows: &[usize]) -> Self {
        Self::new(rows.iter().map(|&row| self.0[row]).collect())
    }

    pub fn is_strictly_increasing(&self) -> bool {
        self.0.windows(2).all(|w| w[1] > w[0])
    }
}

impl std::ops::Deref for TimeIndex {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

/// A single position record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Seconds since the start of the recording day
    pub time: f64,
    pub x: f64,
    pub y: f64,
    /// Radians
    pub head_direction: f64,
    /// cm/s
    pub speed: f64,
}

impl PositionSample {
    pub fn new(time: f64, x: f64, y: f64, head_direction: f64, speed: f64) -> Self {
        Self {
            time,
            x,
            y,
            head_direction,
            speed,
        }
    }
}

/// Identifies one electrode group (tetrode or probe shank) within an epoch
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TetrodeKey {
    pub animal: String,
    pub day: u32,
    pub epoch: u32,
    pub tetrode_number: u32,
}

impl TetrodeKey {
    pub fn new(epoch_key: &EpochKey, tetrode_number: u32) -> Self {
        Self {
            animal: epoch_key.animal.clone(),
            day: epoch_key.day,
            epoch: epoch_key.epoch,
            tetrode_number,
        }
    }

    pub fn epoch_key(&self) -> EpochKey {
        EpochKey::new(self.animal.clone(), self.day, self.epoch)
    }
}

impl fmt::Display for TetrodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.animal, self.day, self.epoch, self.tetrode_number
        )
    }
}

/// Metadata for one electrode group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TetrodeInfo {
    #[serde(flatten)]
    pub key: TetrodeKey,
    /// Brain area label as recorded, e.g. "CA1" or "iCA1"
    pub area: String,
    #[serde(default)]
    pub depth: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub num_cells: Option<u32>,
}

impl TetrodeInfo {
    pub fn new(key: TetrodeKey, area: impl Into<String>) -> Self {
        Self {
            key,
            area: area.into(),
            depth: None,
            description: None,
            num_cells: None,
        }
    }
}
