//! Multiunit spike indicators
//!
//! Electrode groups in the target areas are selected, and their spike
//! features are binned onto the position time grid by a [`MultiunitSource`].
//! A bin holds the features of a spike on that group, or NaN when the group
//! did not fire.

use ndarray::{Array3, ArrayView2, Axis};
use serde::Serialize;

use crate::config::AnimalRegistry;
use crate::error::{LinmuError, Result};
use crate::types::{EpochKey, TetrodeInfo, TetrodeKey, TimeIndex};

/// Returns the exact time index indicators must be binned onto
pub type TimeIndexProvider<'a> = dyn Fn(&EpochKey) -> TimeIndex + 'a;

/// Source of per-epoch electrode group metadata
pub trait TetrodeInfoSource: Send + Sync {
    fn tetrode_info(&self, animals: &AnimalRegistry, epoch_key: &EpochKey) -> Result<Vec<TetrodeInfo>>;
}

/// Source of binned spike features.
///
/// Returns an array shaped `[time, feature, group]` with one time row per entry
/// of the provided index and one group per key, in key order. Groups with fewer
/// features are padded with NaN.
pub trait MultiunitSource: Send + Sync {
    fn multiunit_indicators(
        &self,
        keys: &[TetrodeKey],
        animals: &AnimalRegistry,
        time_index: &TimeIndexProvider<'_>,
    ) -> Result<Array3<f64>>;
}

/// Spike features on the position grid, `[time, feature, group]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiunitIndicator {
    pub time: TimeIndex,
    pub tetrode_keys: Vec<TetrodeKey>,
    pub values: Array3<f64>,
}

impl MultiunitIndicator {
    pub fn n_time(&self) -> usize {
        self.values.len_of(Axis(0))
    }

    pub fn n_features(&self) -> usize {
        self.values.len_of(Axis(1))
    }

    pub fn n_groups(&self) -> usize {
        self.values.len_of(Axis(2))
    }

    /// `[time, feature]` view of one group
    pub fn group(&self, group: usize) -> ArrayView2<'_, f64> {
        self.values.index_axis(Axis(2), group)
    }

    /// Number of bins in which each group fired
    pub fn spike_counts(&self) -> Vec<usize> {
        (0..self.n_groups())
            .map(|group| {
                self.group(group)
                    .outer_iter()
                    .filter(|row| row.iter().any(|v| !v.is_nan()))
                    .count()
            })
            .collect()
    }
}

/// Keys of the groups whose area label is one of `target_areas`, ignoring case
pub fn select_target_groups(tetrode_info: &[TetrodeInfo], target_areas: &[String]) -> Vec<TetrodeKey> {
    let targets: Vec<String> = target_areas.iter().map(|a| a.to_uppercase()).collect();
    let keys: Vec<TetrodeKey> = tetrode_info
        .iter()
        .filter(|info| targets.contains(&info.area.to_uppercase()))
        .map(|info| info.key.clone())
        .collect();
    log::debug!(
        "Selected {} of {} electrode groups in {:?}",
        keys.len(),
        tetrode_info.len(),
        target_areas
    );
    keys
}

/// Bin the selected groups' spikes onto `time_index`
pub fn load_multiunit_indicators(
    source: &dyn MultiunitSource,
    keys: &[TetrodeKey],
    animals: &AnimalRegistry,
    time_index: &TimeIndex,
) -> Result<MultiunitIndicator> {
    if keys.is_empty() {
        log::warn!("No electrode groups selected; multiunit indicators are empty");
        return Ok(MultiunitIndicator {
            time: time_index.clone(),
            tetrode_keys: Vec::new(),
            values: Array3::from_elem((time_index.len(), 0, 0), f64::NAN),
        });
    }

    let provider = |_: &EpochKey| time_index.clone();
    let values = source.multiunit_indicators(keys, animals, &provider)?;

    let (n_time, _, n_groups) = values.dim();
    if n_time != time_index.len() || n_groups != keys.len() {
        return Err(LinmuError::MalformedData(format!(
            "multiunit indicators have shape {:?}, expected {} time bins and {} groups",
            values.dim(),
            time_index.len(),
            keys.len()
        )));
    }

    let indicator = MultiunitIndicator {
        time: time_index.clone(),
        tetrode_keys: keys.to_vec(),
        values,
    };
    log::info!(
        "Loaded multiunit indicators: {} bins x {} features x {} groups",
        indicator.n_time(),
        indicator.n_features(),
        indicator.n_groups()
    );
    Ok(indicator)
}

/// True at each bin where at least one group has a spike
pub fn population_spike_mask(indicator: &MultiunitIndicator) -> Vec<bool> {
    indicator
        .values
        .outer_iter()
        .map(|bin| bin.iter().any(|v| !v.is_nan()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    fn epoch() -> EpochKey {
        EpochKey::new("rat", 1, 2)
    }

    fn info(tetrode: u32, area: &str) -> TetrodeInfo {
        TetrodeInfo::new(TetrodeKey::new(&epoch(), tetrode), area)
    }

    fn targets() -> Vec<String> {
        crate::config::default_target_areas()
    }

    #[test]
    fn test_area_match_ignores_case() {
        let tetrodes = vec![info(1, "ca1"), info(2, "CA1"), info(3, "CA3"), info(4, "ICA1")];
        let keys = select_target_groups(&tetrodes, &targets());
        let numbers: Vec<u32> = keys.iter().map(|k| k.tetrode_number).collect();
        assert_eq!(numbers, vec![1, 2, 4]);
    }

    #[test]
    fn test_target_areas_are_configurable() {
        let tetrodes = vec![info(1, "ca1"), info(2, "mec")];
        let keys = select_target_groups(&tetrodes, &["MEC".to_string()]);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].tetrode_number, 2);
    }

    fn indicator(values: Array3<f64>) -> MultiunitIndicator {
        let n_time = values.len_of(Axis(0));
        let n_groups = values.len_of(Axis(2));
        MultiunitIndicator {
            time: TimeIndex::new((0..n_time).map(|i| i as f64 * 0.002).collect()),
            tetrode_keys: (0..n_groups as u32).map(|t| TetrodeKey::new(&epoch(), t)).collect(),
            values,
        }
    }

    #[test]
    fn test_mask_true_only_where_a_group_spikes() {
        let mut values = Array3::from_elem((6, 4, 2), f64::NAN);
        values.slice_mut(s![3, .., 0]).fill(42.0);
        let mask = population_spike_mask(&indicator(values));
        assert_eq!(mask, vec![false, false, false, true, false, false]);
    }

    #[test]
    fn test_single_feature_counts_as_spike() {
        let mut values = Array3::from_elem((3, 4, 1), f64::NAN);
        values[[1, 2, 0]] = 7.0;
        let indicator = indicator(values);
        assert_eq!(population_spike_mask(&indicator), vec![false, true, false]);
        assert_eq!(indicator.spike_counts(), vec![1]);
    }

    #[test]
    fn test_no_groups_gives_empty_mask() {
        let indicator = indicator(Array3::from_elem((4, 0, 0), f64::NAN));
        assert_eq!(population_spike_mask(&indicator), vec![false; 4]);
    }

    struct FixedSource(Array3<f64>);

    impl MultiunitSource for FixedSource {
        fn multiunit_indicators(
            &self,
            _keys: &[TetrodeKey],
            _animals: &AnimalRegistry,
            time_index: &TimeIndexProvider<'_>,
        ) -> Result<Array3<f64>> {
            assert_eq!(time_index(&epoch()).len(), self.0.len_of(Axis(0)));
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_load_uses_supplied_time_index() {
        let time = TimeIndex::new(vec![1.0, 1.002, 1.004]);
        let keys = vec![TetrodeKey::new(&epoch(), 5)];
        let source = FixedSource(Array3::from_elem((3, 4, 1), f64::NAN));
        let loaded = load_multiunit_indicators(&source, &keys, &AnimalRegistry::new(), &time).unwrap();
        assert_eq!(loaded.time, time);
        assert_eq!(loaded.tetrode_keys, keys);
    }

    #[test]
    fn test_load_rejects_misaligned_source() {
        let time = TimeIndex::new(vec![1.0, 1.002, 1.004]);
        let keys = vec![TetrodeKey::new(&epoch(), 5)];
        let source = FixedSource(Array3::from_elem((3, 4, 2), f64::NAN));
        let result = load_multiunit_indicators(&source, &keys, &AnimalRegistry::new(), &time);
        assert!(matches!(result, Err(LinmuError::MalformedData(_))));
    }
}
