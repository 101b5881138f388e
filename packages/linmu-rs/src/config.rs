//! Pipeline configuration
//!
//! Everything the pipeline needs that is not recorded data: the animal
//! registry, track geometry, linearization parameters, the target brain areas
//! and the sampling grid. A `PipelineConfig` is passed explicitly to
//! [`crate::dataset::load_data`], so several cohorts or track layouts can be
//! processed side by side in one process.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{LinmuError, Result};
use crate::linearize::{Decoder, EdgeSpacing, LinearizationConfig};
use crate::track_graph::{make_track_graph, TrackGraph};

/// Where an animal's processed data lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animal {
    pub directory: PathBuf,
    /// Prefix used in data file names, e.g. "CH105"
    pub short_name: String,
}

impl Animal {
    pub fn new(directory: impl Into<PathBuf>, short_name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            short_name: short_name.into(),
        }
    }
}

/// Animal short name -> storage location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnimalRegistry(BTreeMap<String, Animal>);

impl AnimalRegistry {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, animal: Animal) {
        self.0.insert(key.into(), animal);
    }

    pub fn with(mut self, key: impl Into<String>, animal: Animal) -> Self {
        self.insert(key, animal);
        self
    }

    pub fn get(&self, animal: &str) -> Result<&Animal> {
        self.0
            .get(animal)
            .ok_or_else(|| LinmuError::UnknownAnimal(animal.to_string()))
    }

    pub fn contains(&self, animal: &str) -> bool {
        self.0.contains_key(animal)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Animal)> {
        self.0.iter()
    }
}

/// Node coordinates (cm) and edges of the track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackGeometry {
    pub node_positions: Vec<[f64; 2]>,
    pub edges: Vec<[usize; 2]>,
}

impl TrackGeometry {
    pub fn build(&self) -> Result<TrackGraph> {
        make_track_graph(&self.node_positions, &self.edges)
    }
}

impl Default for TrackGeometry {
    /// Six-arm track with a central handle, corridor and sleep box
    fn default() -> Self {
        Self {
            node_positions: vec![
                [51.0, 54.0],   // arm 1
                [51.0, 84.0],   // arm 1 top
                [72.0, 54.0],   // arm 2
                [72.0, 84.0],   // arm 2 top
                [92.0, 54.0],   // arm 3
                [92.0, 84.0],   // arm 3 top
                [113.0, 54.0],  // arm 4
                [113.0, 84.0],  // arm 4 top
                [134.0, 54.0],  // arm 5
                [134.0, 84.0],  // arm 5 top
                [155.0, 54.0],  // arm 6
                [155.0, 84.0],  // arm 6 top
                [102.0, 84.0],  // top of handle
                [102.0, 127.0], // bottom of handle
                [82.0, 127.0],  // corridor 1
                [117.0, 127.0], // corridor 2
                [117.0, 110.0], // sleep box
                [143.0, 110.0], // sleep box far side
            ],
            edges: vec![
                [0, 1],
                [1, 3],
                [3, 2],
                [3, 5],
                [5, 4],
                [5, 12],
                [12, 7],
                [7, 6],
                [7, 9],
                [9, 8],
                [9, 11],
                [11, 10],
                [12, 13],
                [14, 13],
                [13, 15],
                [15, 16],
                [16, 17],
            ],
        }
    }
}

/// Default linearization for [`TrackGeometry::default`]
pub fn default_linearization() -> LinearizationConfig {
    LinearizationConfig {
        edge_order: vec![
            [17, 16],
            [16, 15],
            [15, 13],
            [13, 12],
            [14, 13],
            [1, 0],
            [1, 3],
            [3, 2],
            [3, 5],
            [5, 4],
            [5, 12],
            [12, 7],
            [7, 6],
            [7, 9],
            [9, 8],
            [9, 11],
            [11, 10],
        ],
        edge_spacing: EdgeSpacing::Uniform(15.0),
        decoder: Decoder::GreedyNearestEdge,
        route_euclidean_distance_scaling: 1.0,
        sensor_std_dev: 5.0,
        diagonal_bias: 0.5,
        max_projection_distance: None,
    }
}

/// Hippocampal CA1 and its lesion variants
pub fn default_target_areas() -> Vec<String> {
    vec!["CA1".to_string(), "dCA1".to_string(), "iCA1".to_string()]
}

fn default_animals() -> AnimalRegistry {
    AnimalRegistry::new()
        .with(
            "david905",
            Animal::new("/stelmo/mcoulter/david905/filterframework", "david905"),
        )
        .with(
            "CH105",
            Animal::new("/stelmo/david/Scn2a/coh2/CH105/AutoW/filterframework", "CH105"),
        )
        .with(
            "CH112",
            Animal::new("/stelmo/david/Scn2a/coh2/CH112/AutoW/filterframework", "CH112"),
        )
        .with(
            "CH109",
            Animal::new("/stelmo/david/Scn2a/coh2/CH109/AutoW/filterframework", "CH109"),
        )
        .with(
            "CH101",
            Animal::new("/stelmo/david/Scn2a/coh2/CH101/AutoW/filterframework", "CH101"),
        )
        .with("CH6", Animal::new("/stelmo/mcoulter/CH6/filterframework", "CH6"))
}

/// Complete configuration for building epoch datasets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub animals: AnimalRegistry,
    pub track: TrackGeometry,
    pub linearization: LinearizationConfig,
    /// Area labels whose electrode groups contribute multiunit activity (case-insensitive)
    pub target_areas: Vec<String>,
    /// Hz; converts per-bin spike indicators to spikes/s
    pub sampling_frequency: f64,
    /// Width of the position resampling grid in seconds
    pub position_step: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            animals: default_animals(),
            track: TrackGeometry::default(),
            linearization: default_linearization(),
            target_areas: default_target_areas(),
            sampling_frequency: 500.0,
            position_step: 0.002,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LinmuError::Config(e.to_string()))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LinmuError::Config(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        let config = Self::from_json_str(&content)?;
        log::debug!("Loaded pipeline configuration from {}", path.display());
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LinmuError::Config(e.to_string()))
    }

    /// Check every parameter that can be checked without recorded data
    pub fn validate(&self) -> Result<()> {
        if !(self.sampling_frequency.is_finite() && self.sampling_frequency > 0.0) {
            return Err(LinmuError::InvalidParameter(format!(
                "sampling_frequency must be positive, got {}",
                self.sampling_frequency
            )));
        }
        if !(self.position_step.is_finite() && self.position_step > 0.0) {
            return Err(LinmuError::InvalidParameter(format!(
                "position_step must be positive, got {}",
                self.position_step
            )));
        }
        let graph = self.track.build()?;
        self.linearization.validate(&graph)?;
        if !self.step_matches_sampling_frequency() {
            log::warn!(
                "position_step {} s does not match sampling_frequency {} Hz; firing rates use the frequency",
                self.position_step,
                self.sampling_frequency
            );
        }
        if self.target_areas.is_empty() {
            log::warn!("No target areas configured; multiunit data will be empty");
        }
        Ok(())
    }

    /// True when the resample step is one sampling period
    pub fn step_matches_sampling_frequency(&self) -> bool {
        (self.sampling_frequency * self.position_step - 1.0).abs() <= 1e-6
    }
}
