//! Track topology
//!
//! Nodes are physical landmarks (cm), edges are the straight segments an
//! animal can run along. Edge ids are the positions in the edge list the graph
//! was built from.

use nalgebra::{Point2, Vector2};
use petgraph::algo::{connected_components, dijkstra};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::Serialize;

use crate::error::{LinmuError, Result};

/// Undirected graph of track segments
#[derive(Debug, Clone, Serialize)]
pub struct TrackGraph {
    node_positions: Vec<[f64; 2]>,
    edges: Vec<[usize; 2]>,
    #[serde(skip)]
    graph: UnGraph<Point2<f64>, f64>,
}

/// Closest point on an edge to some 2-D position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeProjection {
    pub edge: usize,
    /// Euclidean distance from the position to the projected point
    pub distance: f64,
    /// Distance along the edge, measured from its first listed node
    pub offset: f64,
    pub point: [f64; 2],
}

/// Build a track graph from node coordinates and node-index pairs.
///
/// Edge weights are the Euclidean segment lengths. Fails with
/// [`LinmuError::InvalidEdge`] if an edge names a node that does not exist.
pub fn make_track_graph(node_positions: &[[f64; 2]], edges: &[[usize; 2]]) -> Result<TrackGraph> {
    let node_count = node_positions.len();
    for (edge, pair) in edges.iter().enumerate() {
        for &node in pair {
            if node >= node_count {
                return Err(LinmuError::InvalidEdge {
                    edge,
                    node,
                    node_count,
                });
            }
        }
    }

    let mut graph = UnGraph::with_capacity(node_count, edges.len());
    let indices: Vec<NodeIndex> = node_positions
        .iter()
        .map(|&[x, y]| graph.add_node(Point2::new(x, y)))
        .collect();
    for &[a, b] in edges {
        let length = nalgebra::distance(&graph[indices[a]], &graph[indices[b]]);
        graph.add_edge(indices[a], indices[b], length);
    }

    log::debug!(
        "Built track graph: {} nodes, {} edges, {} connected component(s)",
        node_count,
        edges.len(),
        connected_components(&graph)
    );

    Ok(TrackGraph {
        node_positions: node_positions.to_vec(),
        edges: edges.to_vec(),
        graph,
    })
}

impl TrackGraph {
    pub fn node_count(&self) -> usize {
        self.node_positions.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_positions(&self) -> &[[f64; 2]] {
        &self.node_positions
    }

    pub fn node_position(&self, node: usize) -> Option<[f64; 2]> {
        self.node_positions.get(node).copied()
    }

    pub fn edges(&self) -> &[[usize; 2]] {
        &self.edges
    }

    pub fn edge_nodes(&self, edge: usize) -> Option<[usize; 2]> {
        self.edges.get(edge).copied()
    }

    pub fn edge_length(&self, edge: usize) -> Option<f64> {
        self.graph
            .edge_weight(petgraph::graph::EdgeIndex::new(edge))
            .copied()
    }

    /// Total length of all segments
    pub fn total_length(&self) -> f64 {
        self.graph.edge_weights().sum()
    }

    /// Edge id connecting `a` and `b` in either orientation
    pub fn find_edge(&self, a: usize, b: usize) -> Option<usize> {
        self.edges
            .iter()
            .position(|&[u, v]| (u == a && v == b) || (u == b && v == a))
    }

    /// Ids of the edges touching `node`, ascending
    pub fn incident_edges(&self, node: usize) -> Vec<usize> {
        if node >= self.node_count() {
            return Vec::new();
        }
        let mut ids: Vec<usize> = self
            .graph
            .edges(NodeIndex::new(node))
            .map(|e| e.id().index())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Orthogonal projection of `point` onto the segment `edge`, clamped to its endpoints
    pub fn project_onto_edge(&self, point: [f64; 2], edge: usize) -> Option<EdgeProjection> {
        let [a, b] = self.edge_nodes(edge)?;
        let start = Point2::from(self.node_positions[a]);
        let end = Point2::from(self.node_positions[b]);
        let p = Point2::from(point);

        let direction: Vector2<f64> = end - start;
        let length_squared = direction.norm_squared();
        let t = if length_squared > 0.0 {
            ((p - start).dot(&direction) / length_squared).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let projected = start + direction * t;

        Some(EdgeProjection {
            edge,
            distance: nalgebra::distance(&p, &projected),
            offset: t * length_squared.sqrt(),
            point: [projected.x, projected.y],
        })
    }

    /// Shortest route distance between every pair of nodes.
    ///
    /// `f64::INFINITY` marks pairs in different connected components.
    pub fn node_distances(&self) -> Vec<Vec<f64>> {
        let n = self.node_count();
        let mut distances = vec![vec![f64::INFINITY; n]; n];
        for (source, row) in distances.iter_mut().enumerate() {
            let reached = dijkstra(&self.graph, NodeIndex::new(source), None, |e| *e.weight());
            for (node, distance) in reached {
                row[node.index()] = distance;
            }
        }
        distances
    }
}

impl PartialEq for TrackGraph {
    fn eq(&self, other: &Self) -> bool {
        self.node_positions == other.node_positions && self.edges == other.edges
    }
}
