//! Error types for the orthogonalization engine.

use grid_types::GridError;
use thiserror::Error;

/// Errors that can occur while configuring or running the engine.
#[derive(Debug, Error)]
pub enum OrthogonalizeError {
    /// The grid carries no nodes.
    #[error("Grid has no nodes")]
    EmptyGrid,

    /// A blend factor lies outside [0, 1].
    #[error("Invalid blend factor: {0} (must be within [0, 1])")]
    InvalidBlendFactor(f64),

    /// A boundary node's anchor lacks the two boundary edges required for
    /// reprojection.
    #[error("Node {node} has no original boundary segment to project onto")]
    MissingBoundaryNeighbor { node: usize },

    /// A node's stencil does not contain a face one of its edges borders.
    #[error("Stencil of node {node} is missing an incident face")]
    InconsistentStencil { node: usize },

    /// A grid service call failed.
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Result type for engine operations.
pub type OrthogonalizeResult<T> = std::result::Result<T, OrthogonalizeError>;
