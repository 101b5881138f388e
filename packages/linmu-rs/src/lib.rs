pub mod config;
pub mod dataset;
pub mod error;
pub mod firing_rate;
pub mod linearize;
pub mod mmap_utils;
pub mod multiunit;
pub mod position;
pub mod profiling;
pub mod store;
pub mod track_graph;
pub mod types;

pub use config::{Animal, AnimalRegistry, PipelineConfig, TrackGeometry};
pub use dataset::{
    load_data, load_data_with_report, BuildReport, BuildStage, DataSources, Dataset,
    DatasetSummary, PositionInfo,
};
pub use error::{LinmuError, Result};
pub use firing_rate::{FiringRateEstimator, GaussianFiringRate, PopulationFiringRate};
pub use linearize::{
    Decoder, EdgeLayout, EdgeSpacing, GraphLinearizer, LinearizationConfig, LinearizedPosition,
    TrackLinearizer,
};
pub use multiunit::{MultiunitIndicator, MultiunitSource, TetrodeInfoSource};
pub use position::{PositionReader, PositionSource, ResampledPositionSeries};
pub use store::TextStore;
pub use track_graph::{make_track_graph, TrackGraph};
pub use types::*;
