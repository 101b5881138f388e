//! Projection of 2-D position onto the track graph
//!
//! Every position is mapped to the closest point on one edge of the graph and
//! expressed as a distance along the track. Edges are laid end to end in
//! `edge_order`, separated by `edge_spacing`, so the linear coordinate is
//! monotone within a traversal of each edge but not a route distance across
//! the whole track.
//!
//! Two decoders choose the edge:
//! - [`Decoder::GreedyNearestEdge`] takes the nearest edge independently for
//!   each sample.
//! - [`Decoder::HiddenMarkovDecoder`] runs Viterbi over edges with a Gaussian
//!   sensor model on distance-to-edge and transitions that prefer moves whose
//!   route distance matches the straight-line displacement.

use serde::{Deserialize, Serialize};

use crate::error::{LinmuError, Result};
use crate::position::ResampledPositionSeries;
use crate::track_graph::{EdgeProjection, TrackGraph};

/// Gap inserted between consecutive edges of the linear layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgeSpacing {
    /// Same gap after every edge
    Uniform(f64),
    /// One gap per consecutive pair in `edge_order` (`edge_order.len() - 1` values)
    PerEdge(Vec<f64>),
}

impl EdgeSpacing {
    /// Gaps between consecutive edges of an `n_edges` layout
    pub fn gaps(&self, n_edges: usize) -> Result<Vec<f64>> {
        let n_gaps = n_edges.saturating_sub(1);
        let gaps = match self {
            EdgeSpacing::Uniform(gap) => vec![*gap; n_gaps],
            EdgeSpacing::PerEdge(gaps) => {
                if gaps.len() != n_gaps {
                    return Err(LinmuError::InvalidParameter(format!(
                        "edge_spacing has {} values but {} edges need {}",
                        gaps.len(),
                        n_edges,
                        n_gaps
                    )));
                }
                gaps.clone()
            }
        };
        if let Some(gap) = gaps.iter().find(|g| !(g.is_finite() && **g >= 0.0)) {
            return Err(LinmuError::InvalidParameter(format!(
                "edge_spacing must be finite and non-negative, got {}",
                gap
            )));
        }
        Ok(gaps)
    }
}

/// Edge assignment strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decoder {
    #[default]
    GreedyNearestEdge,
    HiddenMarkovDecoder,
}

impl Decoder {
    pub fn from_use_hmm(use_hmm: bool) -> Self {
        if use_hmm {
            Decoder::HiddenMarkovDecoder
        } else {
            Decoder::GreedyNearestEdge
        }
    }

    pub fn uses_hmm(self) -> bool {
        self == Decoder::HiddenMarkovDecoder
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearizationConfig {
    /// Node pairs naming every edge once; the pair orientation sets the direction of travel
    pub edge_order: Vec<[usize; 2]>,
    pub edge_spacing: EdgeSpacing,
    pub decoder: Decoder,
    /// Scale (cm) of the exponential penalty on |route distance - euclidean distance|
    pub route_euclidean_distance_scaling: f64,
    /// Standard deviation (cm) of the Gaussian sensor model
    pub sensor_std_dev: f64,
    /// Probability mass mixed onto staying on the same edge, in [0, 1]
    pub diagonal_bias: f64,
    /// Projections farther than this (cm) are treated as failures
    pub max_projection_distance: Option<f64>,
}

impl Default for LinearizationConfig {
    fn default() -> Self {
        crate::config::default_linearization()
    }
}

impl LinearizationConfig {
    /// Check the parameters and that `edge_order` covers `graph`
    pub fn validate(&self, graph: &TrackGraph) -> Result<()> {
        EdgeLayout::new(graph, self).map(|_| ())
    }

    fn validate_parameters(&self) -> Result<()> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(LinmuError::InvalidParameter(format!(
                    "{} must be positive, got {}",
                    name, value
                )))
            }
        };
        positive(
            "route_euclidean_distance_scaling",
            self.route_euclidean_distance_scaling,
        )?;
        positive("sensor_std_dev", self.sensor_std_dev)?;
        if !(0.0..=1.0).contains(&self.diagonal_bias) {
            return Err(LinmuError::InvalidParameter(format!(
                "diagonal_bias must be in [0, 1], got {}",
                self.diagonal_bias
            )));
        }
        if let Some(max_distance) = self.max_projection_distance {
            positive("max_projection_distance", max_distance)?;
        }
        Ok(())
    }
}

/// One edge placed on the linear axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LaidOutEdge {
    pub edge: usize,
    /// Node at linear position `start`
    pub from_node: usize,
    /// Node at linear position `end`
    pub to_node: usize,
    pub start: f64,
    pub end: f64,
}

/// Placement of every graph edge on the linear axis
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeLayout {
    /// Edge ids in `edge_order` precedence
    order: Vec<usize>,
    /// Indexed by edge id
    start: Vec<f64>,
    length: Vec<f64>,
    reversed: Vec<bool>,
}

impl EdgeLayout {
    pub fn new(graph: &TrackGraph, config: &LinearizationConfig) -> Result<Self> {
        config.validate_parameters()?;

        let n_edges = graph.edge_count();
        let mut order = Vec::with_capacity(n_edges);
        let mut reversed = vec![false; n_edges];
        let mut seen = vec![false; n_edges];
        for &[a, b] in &config.edge_order {
            let edge = graph.find_edge(a, b).ok_or_else(|| {
                LinmuError::InvalidEdgeOrder(format!("({}, {}) is not an edge of the track", a, b))
            })?;
            if seen[edge] {
                return Err(LinmuError::InvalidEdgeOrder(format!(
                    "edge ({}, {}) is listed more than once",
                    a, b
                )));
            }
            seen[edge] = true;
            reversed[edge] = graph.edges()[edge][0] != a;
            order.push(edge);
        }
        let missing: Vec<String> = seen
            .iter()
            .enumerate()
            .filter(|(_, &listed)| !listed)
            .map(|(edge, _)| {
                let [a, b] = graph.edges()[edge];
                format!("({}, {})", a, b)
            })
            .collect();
        if !missing.is_empty() {
            return Err(LinmuError::InvalidEdgeOrder(format!(
                "edges missing from edge_order: {}",
                missing.join(", ")
            )));
        }

        let gaps = config.edge_spacing.gaps(n_edges)?;
        let length: Vec<f64> = (0..n_edges)
            .map(|edge| graph.edge_length(edge).unwrap_or(0.0))
            .collect();
        let mut start = vec![0.0; n_edges];
        let mut cursor = 0.0;
        for (rank, &edge) in order.iter().enumerate() {
            start[edge] = cursor;
            cursor += length[edge];
            if let Some(gap) = gaps.get(rank) {
                cursor += gap;
            }
        }

        Ok(Self {
            order,
            start,
            length,
            reversed,
        })
    }

    /// Edge ids in precedence order
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Linear position of a point `offset` along `edge`, measured from the edge's first graph node
    pub fn linear_position(&self, edge: usize, offset: f64) -> f64 {
        let along = if self.reversed[edge] {
            self.length[edge] - offset
        } else {
            offset
        };
        self.start[edge] + along
    }

    /// End of the last edge
    pub fn total_length(&self) -> f64 {
        self.order
            .last()
            .map(|&edge| self.start[edge] + self.length[edge])
            .unwrap_or(0.0)
    }

    pub fn edges(&self, graph: &TrackGraph) -> Vec<LaidOutEdge> {
        self.order
            .iter()
            .map(|&edge| {
                let [a, b] = graph.edges()[edge];
                let (from_node, to_node) = if self.reversed[edge] { (b, a) } else { (a, b) };
                LaidOutEdge {
                    edge,
                    from_node,
                    to_node,
                    start: self.start[edge],
                    end: self.start[edge] + self.length[edge],
                }
            })
            .collect()
    }
}

/// Linearization output, aligned row for row with the input positions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearizedPosition {
    /// NaN where the position could not be projected
    pub linear_position: Vec<f64>,
    pub track_segment_id: Vec<Option<usize>>,
    pub projected_x_position: Vec<f64>,
    pub projected_y_position: Vec<f64>,
}

impl LinearizedPosition {
    fn with_capacity(n: usize) -> Self {
        Self {
            linear_position: Vec::with_capacity(n),
            track_segment_id: Vec::with_capacity(n),
            projected_x_position: Vec::with_capacity(n),
            projected_y_position: Vec::with_capacity(n),
        }
    }

    fn push_missing(&mut self) {
        self.linear_position.push(f64::NAN);
        self.track_segment_id.push(None);
        self.projected_x_position.push(f64::NAN);
        self.projected_y_position.push(f64::NAN);
    }

    fn push(&mut self, layout: &EdgeLayout, projection: &EdgeProjection) {
        self.linear_position
            .push(layout.linear_position(projection.edge, projection.offset));
        self.track_segment_id.push(Some(projection.edge));
        self.projected_x_position.push(projection.point[0]);
        self.projected_y_position.push(projection.point[1]);
    }

    pub fn len(&self) -> usize {
        self.linear_position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.linear_position.is_empty()
    }

    /// Rows with a finite linear position
    pub fn valid_rows(&self) -> Vec<usize> {
        self.linear_position
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .map(|(row, _)| row)
            .collect()
    }
}

/// Projects 2-D points onto a track graph
pub trait TrackLinearizer: Send + Sync {
    fn linearize(
        &self,
        points: &[[f64; 2]],
        graph: &TrackGraph,
        config: &LinearizationConfig,
    ) -> Result<LinearizedPosition>;
}

/// Linearize a resampled series, checking the collaborator kept row alignment
pub fn linearize_position(
    linearizer: &dyn TrackLinearizer,
    series: &ResampledPositionSeries,
    graph: &TrackGraph,
    config: &LinearizationConfig,
) -> Result<LinearizedPosition> {
    let linear = linearizer.linearize(&series.points(), graph, config)?;
    if linear.len() != series.len()
        || linear.track_segment_id.len() != series.len()
        || linear.projected_x_position.len() != series.len()
        || linear.projected_y_position.len() != series.len()
    {
        return Err(LinmuError::MalformedData(format!(
            "linearizer returned {} rows for {} positions",
            linear.len(),
            series.len()
        )));
    }
    log::info!(
        "Linearized {} positions with {:?}: {} valid",
        series.len(),
        config.decoder,
        linear.valid_rows().len()
    );
    Ok(linear)
}

/// Built-in linearizer implementing both decoders
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphLinearizer;

impl TrackLinearizer for GraphLinearizer {
    fn linearize(
        &self,
        points: &[[f64; 2]],
        graph: &TrackGraph,
        config: &LinearizationConfig,
    ) -> Result<LinearizedPosition> {
        crate::stage_timer!(format!("{:?} over {} samples", config.decoder, points.len()));
        let layout = EdgeLayout::new(graph, config)?;
        let mut out = LinearizedPosition::with_capacity(points.len());
        if layout.order.is_empty() {
            points.iter().for_each(|_| out.push_missing());
            return Ok(out);
        }

        let states: Vec<Option<usize>> = match config.decoder {
            Decoder::GreedyNearestEdge => points
                .iter()
                .map(|&point| candidates(graph, &layout, point).map(|c| nearest_state(&c)))
                .collect(),
            Decoder::HiddenMarkovDecoder => HmmDecoder::new(graph, &layout, config).decode(points),
        };

        for (&point, state) in points.iter().zip(&states) {
            let projection = state
                .and_then(|state| graph.project_onto_edge(point, layout.order[state]))
                .filter(|p| {
                    config
                        .max_projection_distance
                        .map_or(true, |max| p.distance <= max)
                });
            match projection {
                Some(projection) => out.push(&layout, &projection),
                None => out.push_missing(),
            }
        }
        Ok(out)
    }
}

/// Projections of `point` onto every edge, in precedence order; `None` for non-finite points
fn candidates(graph: &TrackGraph, layout: &EdgeLayout, point: [f64; 2]) -> Option<Vec<EdgeProjection>> {
    if !point.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(
        layout
            .order
            .iter()
            .filter_map(|&edge| graph.project_onto_edge(point, edge))
            .collect(),
    )
}

/// Nearest candidate; the earliest in precedence wins exact ties
fn nearest_state(candidates: &[EdgeProjection]) -> usize {
    let mut best = 0;
    for (state, candidate) in candidates.iter().enumerate().skip(1) {
        if candidate.distance < candidates[best].distance {
            best = state;
        }
    }
    best
}

struct HmmDecoder<'a> {
    graph: &'a TrackGraph,
    layout: &'a EdgeLayout,
    node_distances: Vec<Vec<f64>>,
    sensor_std_dev: f64,
    scaling: f64,
    diagonal_bias: f64,
}

impl<'a> HmmDecoder<'a> {
    fn new(graph: &'a TrackGraph, layout: &'a EdgeLayout, config: &LinearizationConfig) -> Self {
        Self {
            graph,
            layout,
            node_distances: graph.node_distances(),
            sensor_std_dev: config.sensor_std_dev,
            scaling: config.route_euclidean_distance_scaling,
            diagonal_bias: config.diagonal_bias,
        }
    }

    fn n_states(&self) -> usize {
        self.layout.order.len()
    }

    /// Most likely state per row; non-finite rows split the sequence into independent runs
    fn decode(&self, points: &[[f64; 2]]) -> Vec<Option<usize>> {
        let finite = |p: &[f64; 2]| p.iter().all(|v| v.is_finite());
        let mut states = vec![None; points.len()];
        let mut row = 0;
        while row < points.len() {
            if !finite(&points[row]) {
                row += 1;
                continue;
            }
            let end = (row..points.len())
                .find(|&r| !finite(&points[r]))
                .unwrap_or(points.len());
            for (offset, state) in self.viterbi(&points[row..end]).into_iter().enumerate() {
                states[row + offset] = Some(state);
            }
            row = end;
        }
        states
    }

    fn log_emission(&self, projection: &EdgeProjection) -> f64 {
        let z = projection.distance / self.sensor_std_dev;
        -0.5 * z * z
    }

    /// Graph route distance between two projected points
    fn route_distance(&self, from: &EdgeProjection, to: &EdgeProjection) -> f64 {
        if from.edge == to.edge {
            return (from.offset - to.offset).abs();
        }
        let [fa, fb] = self.graph.edges()[from.edge];
        let [ta, tb] = self.graph.edges()[to.edge];
        let from_length = self.graph.edge_length(from.edge).unwrap_or(0.0);
        let to_length = self.graph.edge_length(to.edge).unwrap_or(0.0);
        let from_ends = [(fa, from.offset), (fb, from_length - from.offset)];
        let to_ends = [(ta, to.offset), (tb, to_length - to.offset)];

        let mut best = f64::INFINITY;
        for &(u, du) in &from_ends {
            for &(v, dv) in &to_ends {
                best = best.min(du + self.node_distances[u][v] + dv);
            }
        }
        best
    }

    /// Log transition matrix from the candidates at `t - 1` to those at `t`
    fn log_transitions(
        &self,
        displacement: f64,
        previous: &[EdgeProjection],
        current: &[EdgeProjection],
    ) -> Vec<Vec<f64>> {
        let n = self.n_states();
        let mut matrix = vec![vec![f64::NEG_INFINITY; n]; n];
        for (i, row) in matrix.iter_mut().enumerate() {
            // exponential density of the route/euclidean mismatch, normalised in log space
            let log_density: Vec<f64> = current
                .iter()
                .map(|to| {
                    let mismatch = (self.route_distance(&previous[i], to) - displacement).abs();
                    -mismatch / self.scaling
                })
                .collect();
            let max = log_density.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let normaliser = if max.is_finite() {
                max + log_density.iter().map(|l| (l - max).exp()).sum::<f64>().ln()
            } else {
                f64::NEG_INFINITY
            };

            for (j, value) in row.iter_mut().enumerate() {
                let routed = if normaliser.is_finite() {
                    (log_density[j] - normaliser).exp()
                } else {
                    1.0 / n as f64
                };
                let stay = if i == j { self.diagonal_bias } else { 0.0 };
                *value = ((1.0 - self.diagonal_bias) * routed + stay).ln();
            }
        }
        matrix
    }

    /// Viterbi over one run of finite points
    fn viterbi(&self, points: &[[f64; 2]]) -> Vec<usize> {
        let n = self.n_states();
        let initial = -(n as f64).ln();
        let mut previous = candidates(self.graph, self.layout, points[0]).unwrap_or_default();
        let mut score: Vec<f64> = previous
            .iter()
            .map(|p| initial + self.log_emission(p))
            .collect();
        // back[(t - 1) * n + j] is the best predecessor of state j at t
        let mut back: Vec<u32> = Vec::with_capacity(points.len().saturating_sub(1) * n);

        for t in 1..points.len() {
            let current = candidates(self.graph, self.layout, points[t]).unwrap_or_default();
            let dx = points[t][0] - points[t - 1][0];
            let dy = points[t][1] - points[t - 1][1];
            let transitions = self.log_transitions(dx.hypot(dy), &previous, &current);

            let mut next = vec![f64::NEG_INFINITY; n];
            for j in 0..n {
                let mut best = 0;
                let mut best_score = score[0] + transitions[0][j];
                for i in 1..n {
                    let candidate = score[i] + transitions[i][j];
                    if candidate > best_score {
                        best = i;
                        best_score = candidate;
                    }
                }
                next[j] = best_score + self.log_emission(&current[j]);
                back.push(best as u32);
            }
            score = next;
            previous = current;
        }

        let mut state = 0;
        for s in 1..n {
            if score[s] > score[state] {
                state = s;
            }
        }
        let mut path = vec![state; points.len()];
        for t in (1..points.len()).rev() {
            state = back[(t - 1) * n + state] as usize;
            path[t - 1] = state;
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track_graph::make_track_graph;

    fn config(edge_order: Vec<[usize; 2]>, spacing: f64, decoder: Decoder) -> LinearizationConfig {
        LinearizationConfig {
            edge_order,
            edge_spacing: EdgeSpacing::Uniform(spacing),
            decoder,
            route_euclidean_distance_scaling: 1.0,
            sensor_std_dev: 5.0,
            diagonal_bias: 0.5,
            max_projection_distance: None,
        }
    }

    fn single_edge() -> TrackGraph {
        make_track_graph(&[[0.0, 0.0], [10.0, 0.0]], &[[0, 1]]).unwrap()
    }

    #[test]
    fn test_single_edge_midpoint() {
        let graph = single_edge();
        let config = config(vec![[0, 1]], 0.0, Decoder::GreedyNearestEdge);
        let out = GraphLinearizer.linearize(&[[5.0, 0.0]], &graph, &config).unwrap();
        assert!((out.linear_position[0] - 5.0).abs() < 1e-12);
        assert_eq!(out.track_segment_id[0], Some(0));
    }

    #[test]
    fn test_nan_input_gives_nan_for_both_decoders() {
        let graph = single_edge();
        for decoder in [Decoder::GreedyNearestEdge, Decoder::HiddenMarkovDecoder] {
            let config = config(vec![[0, 1]], 0.0, decoder);
            let points = [[1.0, 0.0], [f64::NAN, f64::NAN], [3.0, 0.0]];
            let out = GraphLinearizer.linearize(&points, &graph, &config).unwrap();
            assert!(out.linear_position[1].is_nan());
            assert_eq!(out.track_segment_id[1], None);
            assert!((out.linear_position[0] - 1.0).abs() < 1e-12);
            assert!((out.linear_position[2] - 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_reversed_orientation_and_spacing() {
        let graph =
            make_track_graph(&[[0.0, 0.0], [10.0, 0.0], [20.0, 0.0]], &[[0, 1], [1, 2]]).unwrap();
        let config = config(vec![[1, 0], [1, 2]], 5.0, Decoder::GreedyNearestEdge);
        let out = GraphLinearizer
            .linearize(&[[2.0, 0.0], [12.0, 0.0]], &graph, &config)
            .unwrap();
        assert!((out.linear_position[0] - 8.0).abs() < 1e-12);
        assert!((out.linear_position[1] - 17.0).abs() < 1e-12);
    }

    #[test]
    fn test_per_edge_spacing() {
        let graph =
            make_track_graph(&[[0.0, 0.0], [10.0, 0.0], [20.0, 0.0]], &[[0, 1], [1, 2]]).unwrap();
        let mut config = config(vec![[0, 1], [1, 2]], 0.0, Decoder::GreedyNearestEdge);
        config.edge_spacing = EdgeSpacing::PerEdge(vec![30.0]);
        let layout = EdgeLayout::new(&graph, &config).unwrap();
        assert_eq!(layout.linear_position(1, 0.0), 40.0);
        assert_eq!(layout.total_length(), 50.0);

        config.edge_spacing = EdgeSpacing::PerEdge(vec![1.0, 2.0]);
        assert!(matches!(
            EdgeLayout::new(&graph, &config),
            Err(LinmuError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_ties_follow_edge_order() {
        // (-1, -1) is exactly as close to both edges, at their shared node 0
        let graph =
            make_track_graph(&[[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]], &[[0, 1], [0, 2]]).unwrap();

        let first = config(vec![[0, 1], [2, 0]], 0.0, Decoder::GreedyNearestEdge);
        let out = GraphLinearizer.linearize(&[[-1.0, -1.0]], &graph, &first).unwrap();
        assert_eq!(out.track_segment_id[0], Some(0));
        assert_eq!(out.linear_position[0], 0.0);

        let second = config(vec![[2, 0], [0, 1]], 0.0, Decoder::GreedyNearestEdge);
        let out = GraphLinearizer.linearize(&[[-1.0, -1.0]], &graph, &second).unwrap();
        assert_eq!(out.track_segment_id[0], Some(1));
        assert_eq!(out.linear_position[0], 10.0);
    }

    fn parallel_tracks() -> TrackGraph {
        make_track_graph(
            &[[0.0, 0.0], [100.0, 0.0], [0.0, 4.0], [100.0, 4.0]],
            &[[0, 1], [0, 2], [2, 3]],
        )
        .unwrap()
    }

    fn noisy_run() -> Vec<[f64; 2]> {
        (0..40)
            .map(|i| {
                let x = 10.0 + 2.0 * i as f64;
                let y = if i == 20 { 2.5 } else { 1.0 };
                [x, y]
            })
            .collect()
    }

    #[test]
    fn test_hmm_ignores_single_sample_jump() {
        let graph = parallel_tracks();
        let points = noisy_run();

        let greedy = config(vec![[0, 1], [0, 2], [2, 3]], 10.0, Decoder::GreedyNearestEdge);
        let out = GraphLinearizer.linearize(&points, &graph, &greedy).unwrap();
        assert_eq!(out.track_segment_id[20], Some(2));

        let hmm = config(vec![[0, 1], [0, 2], [2, 3]], 10.0, Decoder::HiddenMarkovDecoder);
        let out = GraphLinearizer.linearize(&points, &graph, &hmm).unwrap();
        assert!(out.track_segment_id.iter().all(|id| *id == Some(0)));
        assert!((out.linear_position[20] - 50.0).abs() < 1e-9);
    }

    /// Run along the lower track, then along the upper one from sample `from`
    fn track_change(n: usize, from: usize) -> Vec<[f64; 2]> {
        (0..n)
            .map(|i| {
                let y = if i >= from { 4.0 } else { 0.0 };
                [10.0 + 2.0 * i as f64, y]
            })
            .collect()
    }

    fn hmm(sensor_std_dev: f64, diagonal_bias: f64) -> LinearizationConfig {
        LinearizationConfig {
            route_euclidean_distance_scaling: 100.0,
            sensor_std_dev,
            diagonal_bias,
            ..config(vec![[0, 1], [0, 2], [2, 3]], 10.0, Decoder::HiddenMarkovDecoder)
        }
    }

    #[test]
    fn test_hmm_without_diagonal_bias_follows_track_change() {
        let graph = parallel_tracks();
        let out = GraphLinearizer
            .linearize(&track_change(20, 12), &graph, &hmm(0.5, 0.0))
            .unwrap();
        assert!(out.track_segment_id[..12].iter().all(|id| *id == Some(0)));
        assert!(out.track_segment_id[12..].iter().all(|id| *id == Some(2)));
    }

    #[test]
    fn test_hmm_full_diagonal_bias_never_leaves_first_state() {
        let graph = parallel_tracks();
        let out = GraphLinearizer
            .linearize(&track_change(20, 12), &graph, &hmm(0.5, 1.0))
            .unwrap();
        assert!(out.track_segment_id.iter().all(|id| *id == Some(0)));
        // still projected onto the lower track, 4 cm away
        assert!(out.projected_y_position[15].abs() < 1e-9);
    }

    #[test]
    fn test_sensor_noise_suppresses_brief_switch() {
        let graph = parallel_tracks();
        let mut points = track_change(20, 20);
        points[10][1] = 4.0;
        points[11][1] = 4.0;

        let precise = GraphLinearizer.linearize(&points, &graph, &hmm(0.5, 0.5)).unwrap();
        assert_eq!(precise.track_segment_id[9], Some(0));
        assert_eq!(precise.track_segment_id[10], Some(2));
        assert_eq!(precise.track_segment_id[11], Some(2));
        assert_eq!(precise.track_segment_id[12], Some(0));

        let noisy = GraphLinearizer.linearize(&points, &graph, &hmm(10.0, 0.5)).unwrap();
        assert!(noisy.track_segment_id.iter().all(|id| *id == Some(0)));
    }

    #[test]
    fn test_linearization_is_deterministic() {
        let graph = parallel_tracks();
        let points = noisy_run();
        for decoder in [Decoder::GreedyNearestEdge, Decoder::HiddenMarkovDecoder] {
            let config = config(vec![[0, 1], [0, 2], [2, 3]], 10.0, decoder);
            let a = GraphLinearizer.linearize(&points, &graph, &config).unwrap();
            let b = GraphLinearizer.linearize(&points, &graph, &config).unwrap();
            let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
            assert_eq!(bits(&a.linear_position), bits(&b.linear_position));
            assert_eq!(a.track_segment_id, b.track_segment_id);
        }
    }

    #[test]
    fn test_max_projection_distance() {
        let graph = single_edge();
        let mut config = config(vec![[0, 1]], 0.0, Decoder::GreedyNearestEdge);
        config.max_projection_distance = Some(3.0);
        let out = GraphLinearizer
            .linearize(&[[5.0, 2.0], [5.0, 50.0]], &graph, &config)
            .unwrap();
        assert!((out.linear_position[0] - 5.0).abs() < 1e-12);
        assert!(out.linear_position[1].is_nan());
        assert_eq!(out.valid_rows(), vec![0]);
    }

    #[test]
    fn test_edge_order_must_cover_graph() {
        let graph =
            make_track_graph(&[[0.0, 0.0], [10.0, 0.0], [20.0, 0.0]], &[[0, 1], [1, 2]]).unwrap();

        let missing = config(vec![[0, 1]], 0.0, Decoder::GreedyNearestEdge);
        assert!(matches!(
            missing.validate(&graph),
            Err(LinmuError::InvalidEdgeOrder(_))
        ));

        let duplicate = config(vec![[0, 1], [1, 0]], 0.0, Decoder::GreedyNearestEdge);
        assert!(matches!(
            duplicate.validate(&graph),
            Err(LinmuError::InvalidEdgeOrder(_))
        ));

        let unknown = config(vec![[0, 1], [0, 2]], 0.0, Decoder::GreedyNearestEdge);
        assert!(matches!(
            unknown.validate(&graph),
            Err(LinmuError::InvalidEdgeOrder(_))
        ));
    }

    #[test]
    fn test_invalid_parameters() {
        let graph = single_edge();
        let mut config = config(vec![[0, 1]], 0.0, Decoder::HiddenMarkovDecoder);
        config.diagonal_bias = 1.5;
        assert!(matches!(
            config.validate(&graph),
            Err(LinmuError::InvalidParameter(_))
        ));
        config.diagonal_bias = 0.5;
        config.sensor_std_dev = 0.0;
        assert!(matches!(
            config.validate(&graph),
            Err(LinmuError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_default_layout_edges() {
        let graph = crate::config::TrackGeometry::default().build().unwrap();
        let config = LinearizationConfig::default();
        let layout = EdgeLayout::new(&graph, &config).unwrap();
        let edges = layout.edges(&graph);
        assert_eq!(edges.len(), 17);
        // first edge in the order runs from the far side of the sleep box
        assert_eq!(edges[0].from_node, 17);
        assert_eq!(edges[0].start, 0.0);
        assert!((edges[1].start - (26.0 + 15.0)).abs() < 1e-9);
    }

    #[test]
    fn test_decoder_from_use_hmm() {
        assert_eq!(Decoder::from_use_hmm(true), Decoder::HiddenMarkovDecoder);
        assert_eq!(Decoder::from_use_hmm(false), Decoder::GreedyNearestEdge);
        assert!(!Decoder::default().uses_hmm());
    }
}
