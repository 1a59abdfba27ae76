//! Error types for spline operations.

use thiserror::Error;

/// Errors raised by spline construction and queries.
#[derive(Debug, Error)]
pub enum SplineError {
    /// A spline needs at least two corner points.
    #[error("Spline needs at least 2 corner points, got {0}")]
    TooFewPoints(usize),

    /// A spline index outside the set.
    #[error("Spline index {index} out of range ({len} splines)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Result type for spline operations.
pub type SplineResult<T> = std::result::Result<T, SplineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SplineError::TooFewPoints(1);
        assert!(format!("{err}").contains('1'));

        let err = SplineError::IndexOutOfRange { index: 3, len: 1 };
        assert!(format!("{err}").contains('3'));
    }
}
