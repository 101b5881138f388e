//! Plain-text animal directories
//!
//! Layout, with `{short}` the animal's short name and numbers zero-padded to
//! two digits:
//!
//! - `{short}pos{day}-{epoch}.txt`: position matrix, one sample per row
//! - `{short}tetinfo.json`: electrode group metadata for every epoch
//! - `{short}marks{day}-{epoch}-{tetrode}.txt`: one spike per row, `time feature...`
//!
//! Numeric files are whitespace or comma separated; `#` starts a comment line.

use ndarray::Array3;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::config::{Animal, AnimalRegistry};
use crate::error::{LinmuError, Result};
use crate::mmap_utils::mmap_file;
use crate::multiunit::{MultiunitSource, TetrodeInfoSource, TimeIndexProvider};
use crate::position::PositionReader;
use crate::types::{EpochKey, TetrodeInfo, TetrodeKey, TimeIndex};

/// Reads position, electrode metadata and spike marks from animal directories
#[derive(Debug, Clone, Default)]
pub struct TextStore {
    bin_width: Option<f64>,
}

impl TextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Width of the bins spikes are placed into. Inferred from the time index
    /// when not set.
    pub fn with_bin_width(mut self, bin_width: f64) -> Self {
        self.bin_width = Some(bin_width);
        self
    }

    pub fn position_path(animal: &Animal, day: u32, epoch: u32) -> PathBuf {
        animal
            .directory
            .join(format!("{}pos{:02}-{:02}.txt", animal.short_name, day, epoch))
    }

    pub fn tetinfo_path(animal: &Animal) -> PathBuf {
        animal
            .directory
            .join(format!("{}tetinfo.json", animal.short_name))
    }

    pub fn marks_path(animal: &Animal, day: u32, epoch: u32, tetrode: u32) -> PathBuf {
        animal.directory.join(format!(
            "{}marks{:02}-{:02}-{:02}.txt",
            animal.short_name, day, epoch, tetrode
        ))
    }

    /// `(day, epoch)` of every position file in the animal's directory, sorted
    pub fn epochs(&self, animal: &Animal) -> Result<Vec<(u32, u32)>> {
        let dir = glob::Pattern::escape(&animal.directory.to_string_lossy());
        let prefix = format!("{}pos", animal.short_name);
        let pattern = format!("{}/{}*-*.txt", dir, glob::Pattern::escape(&prefix));

        let paths = glob::glob(&pattern)
            .map_err(|e| LinmuError::InvalidParameter(format!("Invalid glob pattern: {}", e)))?;

        let mut epochs: Vec<(u32, u32)> = paths
            .filter_map(|entry| entry.ok())
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?;
                let stem = name.strip_prefix(prefix.as_str())?.strip_suffix(".txt")?;
                let (day, epoch) = stem.split_once('-')?;
                Some((day.parse().ok()?, epoch.parse().ok()?))
            })
            .collect();
        epochs.sort_unstable();
        epochs.dedup();
        log::debug!(
            "Found {} epochs for {} in {}",
            epochs.len(),
            animal.short_name,
            animal.directory.display()
        );
        Ok(epochs)
    }

    fn read_marks(&self, path: &Path) -> Result<Vec<Vec<f64>>> {
        let mmap = mmap_file(path)?;
        let rows = parse_numeric_rows(&mmap, path)?;
        if let Some(i) = rows.iter().position(|row| row.len() < 2) {
            return Err(LinmuError::MalformedData(format!(
                "{} row {} has no spike features",
                path.display(),
                i
            )));
        }
        Ok(rows)
    }

    fn tolerance(&self, time: &TimeIndex) -> f64 {
        let width = self.bin_width.unwrap_or_else(|| {
            time.windows(2)
                .map(|pair| pair[1] - pair[0])
                .filter(|d| *d > 0.0)
                .fold(f64::INFINITY, f64::min)
        });
        if width.is_finite() {
            width / 2.0
        } else {
            f64::EPSILON
        }
    }
}

impl PositionReader for TextStore {
    fn read_position(&self, animal: &Animal, day: u32, epoch: u32) -> Result<Vec<Vec<f64>>> {
        let path = Self::position_path(animal, day, epoch);
        let mmap = mmap_file(&path)?;
        let rows = parse_numeric_rows(&mmap, &path)?;
        log::debug!("Read {} position rows from {}", rows.len(), path.display());
        Ok(rows)
    }
}

#[derive(Deserialize)]
struct TetrodeRecord {
    day: u32,
    epoch: u32,
    tetrode_number: u32,
    area: String,
    #[serde(default)]
    depth: Option<f64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    num_cells: Option<u32>,
}

impl TetrodeInfoSource for TextStore {
    fn tetrode_info(&self, animals: &AnimalRegistry, epoch_key: &EpochKey) -> Result<Vec<TetrodeInfo>> {
        let animal = animals.get(&epoch_key.animal)?;
        let path = Self::tetinfo_path(animal);
        let mmap = mmap_file(&path)?;
        let records: Vec<TetrodeRecord> = serde_json::from_slice(&mmap)
            .map_err(|e| LinmuError::ParseError(format!("{}: {}", path.display(), e)))?;

        let mut infos: Vec<TetrodeInfo> = records
            .into_iter()
            .filter(|r| r.day == epoch_key.day && r.epoch == epoch_key.epoch)
            .map(|r| TetrodeInfo {
                key: TetrodeKey::new(epoch_key, r.tetrode_number),
                area: r.area,
                depth: r.depth,
                description: r.description,
                num_cells: r.num_cells,
            })
            .collect();
        if infos.is_empty() {
            return Err(LinmuError::UnknownEpoch(format!(
                "{} has no electrode groups in {}",
                epoch_key,
                path.display()
            )));
        }
        infos.sort_by_key(|info| info.key.tetrode_number);
        Ok(infos)
    }
}

impl MultiunitSource for TextStore {
    fn multiunit_indicators(
        &self,
        keys: &[TetrodeKey],
        animals: &AnimalRegistry,
        time_index: &TimeIndexProvider<'_>,
    ) -> Result<Array3<f64>> {
        crate::stage_timer!(format!("bin marks for {} groups", keys.len()));
        let mut marks = Vec::with_capacity(keys.len());
        for key in keys {
            let animal = animals.get(&key.animal)?;
            let path = Self::marks_path(animal, key.day, key.epoch, key.tetrode_number);
            marks.push(self.read_marks(&path)?);
        }

        let n_features = marks
            .iter()
            .flat_map(|rows| rows.iter().map(|row| row.len() - 1))
            .max()
            .unwrap_or(0);
        let mut time_len = None;
        let mut values = None;

        for (group, (key, rows)) in keys.iter().zip(&marks).enumerate() {
            let time = time_index(&key.epoch_key());
            let values = values.get_or_insert_with(|| {
                time_len = Some(time.len());
                Array3::from_elem((time.len(), n_features, keys.len()), f64::NAN)
            });
            if time_len != Some(time.len()) {
                return Err(LinmuError::MalformedData(format!(
                    "time index for {} differs in length from the other groups",
                    key
                )));
            }

            let tolerance = self.tolerance(&time);
            let mut filled = vec![false; time.len()];
            let mut placed = 0usize;
            for row in rows {
                let Some(bin) = nearest_bin(&time, row[0], tolerance) else {
                    continue;
                };
                if filled[bin] {
                    continue;
                }
                filled[bin] = true;
                placed += 1;
                for (feature, value) in row[1..].iter().enumerate() {
                    values[[bin, feature, group]] = *value;
                }
            }
            log::debug!("{}: placed {} of {} spikes", key, placed, rows.len());
        }

        Ok(values.unwrap_or_else(|| Array3::from_elem((0, n_features, 0), f64::NAN)))
    }
}

/// Index of the bin closest to `t`, if it lies within `tolerance`
fn nearest_bin(time: &[f64], t: f64, tolerance: f64) -> Option<usize> {
    if !t.is_finite() || time.is_empty() {
        return None;
    }
    let upper = time.partition_point(|&x| x < t);
    let candidates = [upper.checked_sub(1), (upper < time.len()).then_some(upper)];
    candidates
        .into_iter()
        .flatten()
        .map(|i| (i, (time[i] - t).abs()))
        .filter(|&(_, d)| d <= tolerance)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// Parse a whitespace or comma separated numeric matrix. Rows keep their own
/// length; callers decide what a ragged matrix means.
pub fn parse_numeric_rows(content: &[u8], path: &Path) -> Result<Vec<Vec<f64>>> {
    let text = std::str::from_utf8(content).map_err(|e| {
        LinmuError::ParseError(format!("{} is not valid UTF-8: {}", path.display(), e))
    })?;

    let mut rows = Vec::new();
    for (line_number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split(|c: char| c.is_ascii_whitespace() || c == ',')
            .filter(|token| !token.is_empty())
            .map(|token| {
                token.parse::<f64>().map_err(|_| {
                    LinmuError::ParseError(format!(
                        "{}:{}: '{}' is not a number",
                        path.display(),
                        line_number + 1,
                        token
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }
    Ok(rows)
}
