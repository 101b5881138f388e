use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinmuError {
    #[error("Edge {edge} references node {node}, but the graph has {node_count} nodes")]
    InvalidEdge {
        edge: usize,
        node: usize,
        node_count: usize,
    },

    #[error("Invalid edge order: {0}")]
    InvalidEdgeOrder(String),

    #[error("Unknown animal: {0}")]
    UnknownAnimal(String),

    #[error("Unknown epoch: {0}")]
    UnknownEpoch(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Malformed data: {0}")]
    MalformedData(String),

    #[error("Failed to parse data: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl LinmuError {
    /// True for errors caused by the pipeline configuration rather than the data.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            LinmuError::InvalidEdge { .. }
                | LinmuError::InvalidEdgeOrder(_)
                | LinmuError::UnknownAnimal(_)
                | LinmuError::UnknownEpoch(_)
                | LinmuError::InvalidParameter(_)
                | LinmuError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, LinmuError>;
