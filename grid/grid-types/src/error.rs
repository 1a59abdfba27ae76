//! Error types for grid construction and queries.

use thiserror::Error;

/// Errors raised while building or updating an unstructured grid.
#[derive(Debug, Error)]
pub enum GridError {
    /// The grid carries no nodes.
    #[error("Grid has no nodes")]
    EmptyGrid,

    /// An edge references a node outside the node array.
    #[error("Edge {edge} references missing node {node}")]
    EdgeNodeOutOfRange { edge: usize, node: usize },

    /// A face references a node outside the node array.
    #[error("Face {face} references missing node {node}")]
    FaceNodeOutOfRange { face: usize, node: usize },

    /// A face carries fewer than three nodes.
    #[error("Face {face} has fewer than 3 nodes")]
    DegenerateFace { face: usize },

    /// A face boundary segment has no matching edge.
    #[error("Face {face} uses node pair ({first}, {second}) with no edge")]
    MissingFaceEdge {
        face: usize,
        first: usize,
        second: usize,
    },
}

/// Result type for grid operations.
pub type GridResult<T> = std::result::Result<T, GridError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = GridError::EmptyGrid;
        assert_eq!(format!("{err}"), "Grid has no nodes");

        let err = GridError::EdgeNodeOutOfRange { edge: 2, node: 9 };
        assert!(format!("{err}").contains('9'));
    }
}
