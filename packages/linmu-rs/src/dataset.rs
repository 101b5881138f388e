//! Epoch dataset assembly
//!
//! [`load_data`] runs the pipeline stages strictly in order:
//!
//! 1. `BuildPosition`: read raw position, resample onto the grid
//! 2. `LinearizePosition`: build the track graph and project position onto it
//! 3. `FilterInvalid`: drop rows without a linear position
//! 4. `LoadSpikes`: select target electrode groups, bin their spikes onto the
//!    filtered grid
//! 5. `AlignFiringRate`: population spike mask and smoothed rate
//! 6. `AssembleResult`: check alignment and return the dataset
//!
//! The first error aborts the build and is returned unchanged.

use serde::Serialize;
use std::fmt;

use crate::config::PipelineConfig;
use crate::error::{LinmuError, Result};
use crate::firing_rate::{estimate_firing_rate, FiringRateEstimator, GaussianFiringRate, PopulationFiringRate};
use crate::linearize::{linearize_position, Decoder, GraphLinearizer, LinearizedPosition, TrackLinearizer};
use crate::multiunit::{
    load_multiunit_indicators, population_spike_mask, select_target_groups, MultiunitIndicator,
    MultiunitSource, TetrodeInfoSource,
};
use crate::position::{load_raw_position, resample_and_clean, PositionReader, PositionSource, ResampledPositionSeries};
use crate::profiling::StageTimer;
use crate::track_graph::TrackGraph;
use crate::types::{EpochKey, TetrodeInfo, TimeIndex};

static GRAPH_LINEARIZER: GraphLinearizer = GraphLinearizer;
static GAUSSIAN_FIRING_RATE: GaussianFiringRate = GaussianFiringRate::DEFAULT;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    BuildPosition,
    LinearizePosition,
    FilterInvalid,
    LoadSpikes,
    AlignFiringRate,
    AssembleResult,
}

impl BuildStage {
    pub const ALL: [BuildStage; 6] = [
        BuildStage::BuildPosition,
        BuildStage::LinearizePosition,
        BuildStage::FilterInvalid,
        BuildStage::LoadSpikes,
        BuildStage::AlignFiringRate,
        BuildStage::AssembleResult,
    ];

    pub fn next(self) -> Option<BuildStage> {
        let position = Self::ALL.iter().position(|&s| s == self)?;
        Self::ALL.get(position + 1).copied()
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::BuildPosition => "build position",
            BuildStage::LinearizePosition => "linearize position",
            BuildStage::FilterInvalid => "filter invalid",
            BuildStage::LoadSpikes => "load spikes",
            BuildStage::AlignFiringRate => "align firing rate",
            BuildStage::AssembleResult => "assemble result",
        };
        f.write_str(name)
    }
}

/// The collaborators a build reads from
#[derive(Clone, Copy)]
pub struct DataSources<'a> {
    pub position: &'a dyn PositionReader,
    pub tetrodes: &'a dyn TetrodeInfoSource,
    pub multiunits: &'a dyn MultiunitSource,
    pub linearizer: &'a dyn TrackLinearizer,
    pub firing_rate: &'a dyn FiringRateEstimator,
}

impl<'a> DataSources<'a> {
    /// Read everything from one store, with the built-in linearizer and rate estimator
    pub fn from_store<S>(store: &'a S) -> Self
    where
        S: PositionReader + TetrodeInfoSource + MultiunitSource,
    {
        Self {
            position: store,
            tetrodes: store,
            multiunits: store,
            linearizer: &GRAPH_LINEARIZER,
            firing_rate: &GAUSSIAN_FIRING_RATE,
        }
    }

    pub fn with_linearizer(mut self, linearizer: &'a dyn TrackLinearizer) -> Self {
        self.linearizer = linearizer;
        self
    }

    pub fn with_firing_rate(mut self, firing_rate: &'a dyn FiringRateEstimator) -> Self {
        self.firing_rate = firing_rate;
        self
    }
}

/// Resampled position joined with its linearization
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionInfo {
    pub time: TimeIndex,
    pub source: PositionSource,
    pub x_position: Vec<f64>,
    pub y_position: Vec<f64>,
    pub head_direction: Vec<f64>,
    pub speed: Vec<f64>,
    pub linear_position: Vec<f64>,
    pub track_segment_id: Vec<Option<usize>>,
    pub projected_x_position: Vec<f64>,
    pub projected_y_position: Vec<f64>,
}

impl PositionInfo {
    pub fn new(
        series: &ResampledPositionSeries,
        linear: &LinearizedPosition,
        source: PositionSource,
    ) -> Self {
        Self {
            time: series.time.clone(),
            source,
            x_position: series.x.clone(),
            y_position: series.y.clone(),
            head_direction: series.head_direction.clone(),
            speed: series.speed.clone(),
            linear_position: linear.linear_position.clone(),
            track_segment_id: linear.track_segment_id.clone(),
            projected_x_position: linear.projected_x_position.clone(),
            projected_y_position: linear.projected_y_position.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Keep only `rows`, in order
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        fn pick<T: Copy>(column: &[T], rows: &[usize]) -> Vec<T> {
            rows.iter().map(|&row| column[row]).collect()
        }
        Self {
            time: self.time.select(rows),
            source: self.source,
            x_position: pick(&self.x_position, rows),
            y_position: pick(&self.y_position, rows),
            head_direction: pick(&self.head_direction, rows),
            speed: pick(&self.speed, rows),
            linear_position: pick(&self.linear_position, rows),
            track_segment_id: pick(&self.track_segment_id, rows),
            projected_x_position: pick(&self.projected_x_position, rows),
            projected_y_position: pick(&self.projected_y_position, rows),
        }
    }
}

/// Everything downstream analysis needs for one epoch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub position_info: PositionInfo,
    pub tetrode_info: Vec<TetrodeInfo>,
    pub multiunits: MultiunitIndicator,
    pub multiunit_firing_rate: PopulationFiringRate,
    pub track_graph: TrackGraph,
}

impl Dataset {
    /// Verify that every time-indexed member shares `position_info`'s index
    pub fn check_alignment(&self) -> Result<()> {
        let time = &self.position_info.time;
        if !time.is_strictly_increasing() {
            return Err(LinmuError::MalformedData(
                "position time index is not strictly increasing".to_string(),
            ));
        }
        if self.position_info.linear_position.iter().any(|v| v.is_nan()) {
            return Err(LinmuError::MalformedData(
                "position_info contains rows without a linear position".to_string(),
            ));
        }
        if &self.multiunits.time != time || self.multiunits.n_time() != time.len() {
            return Err(LinmuError::MalformedData(
                "multiunits are not aligned to position_info".to_string(),
            ));
        }
        if &self.multiunit_firing_rate.time != time || self.multiunit_firing_rate.len() != time.len() {
            return Err(LinmuError::MalformedData(
                "multiunit_firing_rate is not aligned to position_info".to_string(),
            ));
        }
        Ok(())
    }
}

/// Time spent in one stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageTiming {
    pub stage: BuildStage,
    pub elapsed_ms: f64,
}

/// Bookkeeping from one build, kept apart from the dataset itself
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildReport {
    pub epoch: EpochKey,
    pub decoder: Decoder,
    pub resampled_samples: usize,
    pub dropped_samples: usize,
    pub stages: Vec<StageTiming>,
}

impl BuildReport {
    fn new(epoch: &EpochKey, decoder: Decoder) -> Self {
        Self {
            epoch: epoch.clone(),
            decoder,
            resampled_samples: 0,
            dropped_samples: 0,
            stages: Vec::with_capacity(BuildStage::ALL.len()),
        }
    }

    fn run<T>(&mut self, stage: BuildStage, f: impl FnOnce() -> Result<T>) -> Result<T> {
        log::debug!("{}: {}", self.epoch, stage);
        let timer = StageTimer::new(format!("{} {}", self.epoch, stage));
        let result = f();
        self.stages.push(StageTiming {
            stage,
            elapsed_ms: timer.elapsed().as_secs_f64() * 1000.0,
        });
        if let Err(e) = &result {
            log::error!("{}: {} failed: {}", self.epoch, stage, e);
        }
        result
    }
}

/// Compact description of a built dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub epoch: EpochKey,
    pub decoder: Decoder,
    pub position_source: PositionSource,
    pub samples: usize,
    pub dropped_samples: usize,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub tetrodes: usize,
    pub multiunit_groups: usize,
    pub spike_bins: usize,
    pub mean_firing_rate: Option<f64>,
    pub track_nodes: usize,
    pub track_edges: usize,
}

impl DatasetSummary {
    pub fn new(dataset: &Dataset, report: &BuildReport) -> Self {
        Self {
            epoch: report.epoch.clone(),
            decoder: report.decoder,
            position_source: dataset.position_info.source,
            samples: dataset.position_info.len(),
            dropped_samples: report.dropped_samples,
            start_time: dataset.position_info.time.first(),
            end_time: dataset.position_info.time.last(),
            tetrodes: dataset.tetrode_info.len(),
            multiunit_groups: dataset.multiunits.n_groups(),
            spike_bins: population_spike_mask(&dataset.multiunits)
                .iter()
                .filter(|&&m| m)
                .count(),
            mean_firing_rate: dataset.multiunit_firing_rate.mean(),
            track_nodes: dataset.track_graph.node_count(),
            track_edges: dataset.track_graph.edge_count(),
        }
    }
}

/// Build the dataset for one epoch
pub fn load_data(
    epoch_key: &EpochKey,
    config: &PipelineConfig,
    sources: &DataSources<'_>,
) -> Result<Dataset> {
    load_data_with_report(epoch_key, config, sources).map(|(dataset, _)| dataset)
}

/// [`load_data`], also returning counts and stage timings
pub fn load_data_with_report(
    epoch_key: &EpochKey,
    config: &PipelineConfig,
    sources: &DataSources<'_>,
) -> Result<(Dataset, BuildReport)> {
    let mut report = BuildReport::new(epoch_key, config.linearization.decoder);

    let (series, source) = report.run(BuildStage::BuildPosition, || {
        let columns = load_raw_position(sources.position, &config.animals, epoch_key)?;
        let series = resample_and_clean(columns.samples(), config.position_step)?;
        Ok((series, columns.source()))
    })?;
    report.resampled_samples = series.len();

    let (track_graph, linear) = report.run(BuildStage::LinearizePosition, || {
        let graph = config.track.build()?;
        let linear = linearize_position(sources.linearizer, &series, &graph, &config.linearization)?;
        Ok((graph, linear))
    })?;

    let position_info = report.run(BuildStage::FilterInvalid, || {
        let valid = linear.valid_rows();
        Ok(PositionInfo::new(&series, &linear, source).select_rows(&valid))
    })?;
    report.dropped_samples = series.len() - position_info.len();
    if position_info.is_empty() {
        log::warn!("{}: no position sample could be linearized", epoch_key);
    } else {
        log::info!(
            "{}: kept {} of {} samples with a linear position",
            epoch_key,
            position_info.len(),
            series.len()
        );
    }
    drop(linear);
    drop(series);

    let (tetrode_info, multiunits) = report.run(BuildStage::LoadSpikes, || {
        let tetrode_info = sources.tetrodes.tetrode_info(&config.animals, epoch_key)?;
        let keys = select_target_groups(&tetrode_info, &config.target_areas);
        let multiunits =
            load_multiunit_indicators(sources.multiunits, &keys, &config.animals, &position_info.time)?;
        Ok((tetrode_info, multiunits))
    })?;

    let multiunit_firing_rate = report.run(BuildStage::AlignFiringRate, || {
        let mask = population_spike_mask(&multiunits);
        estimate_firing_rate(
            sources.firing_rate,
            &mask,
            config.sampling_frequency,
            &position_info.time,
        )
    })?;

    let dataset = report.run(BuildStage::AssembleResult, || {
        let dataset = Dataset {
            position_info,
            tetrode_info,
            multiunits,
            multiunit_firing_rate,
            track_graph,
        };
        dataset.check_alignment()?;
        Ok(dataset)
    })?;

    Ok((dataset, report))
}
