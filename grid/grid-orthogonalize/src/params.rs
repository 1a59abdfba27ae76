//! Orthogonalization parameters.

use crate::error::{OrthogonalizeError, OrthogonalizeResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters controlling the orthogonalization iteration.
///
/// The blend factor weighs the orthogonalizer (1.0) against the smoother
/// (0.0) when the per-node linear system is composed; boundary nodes use the
/// larger of the two blend factors.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrthogonalizationParams {
    /// Outer iterations: each rebuilds weights and operators.
    pub outer_iterations: u32,

    /// Boundary iterations nested inside each outer iteration.
    pub boundary_iterations: u32,

    /// Inner relaxation sweeps nested inside each boundary iteration.
    pub inner_iterations: u32,

    /// Orthogonalizer/smoother blend for interior nodes, in [0, 1].
    pub orthogonalization_to_smoothing_factor: f64,

    /// Orthogonalizer/smoother blend for boundary nodes, in [0, 1].
    pub orthogonalization_to_smoothing_factor_boundary: f64,

    /// Areal smoothing fraction; caps the smoother ramp at
    /// `(1 - value) / 2`.
    pub areal_to_angle_smoothing_factor: f64,

    /// 0 disables land-boundary snapping; 1 or larger snaps boundary nodes
    /// after every inner iteration.
    pub project_to_land_boundary_option: u32,
}

impl Default for OrthogonalizationParams {
    fn default() -> Self {
        Self {
            outer_iterations: 2,
            boundary_iterations: 25,
            inner_iterations: 25,
            orthogonalization_to_smoothing_factor: 0.975,
            orthogonalization_to_smoothing_factor_boundary: 1.0,
            areal_to_angle_smoothing_factor: 1.0,
            project_to_land_boundary_option: 0,
        }
    }
}

impl OrthogonalizationParams {
    /// Create parameters with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the outer, boundary and inner iteration counts.
    #[must_use]
    pub const fn with_iterations(mut self, outer: u32, boundary: u32, inner: u32) -> Self {
        self.outer_iterations = outer;
        self.boundary_iterations = boundary;
        self.inner_iterations = inner;
        self
    }

    /// Set the interior blend factor.
    #[must_use]
    pub const fn with_smoothing_factor(mut self, factor: f64) -> Self {
        self.orthogonalization_to_smoothing_factor = factor;
        self
    }

    /// Set the boundary blend factor.
    #[must_use]
    pub const fn with_boundary_smoothing_factor(mut self, factor: f64) -> Self {
        self.orthogonalization_to_smoothing_factor_boundary = factor;
        self
    }

    /// Set the areal smoothing fraction.
    #[must_use]
    pub const fn with_areal_smoothing(mut self, factor: f64) -> Self {
        self.areal_to_angle_smoothing_factor = factor;
        self
    }

    /// Enable or disable land-boundary snapping.
    #[must_use]
    pub const fn with_land_boundary_projection(mut self, option: u32) -> Self {
        self.project_to_land_boundary_option = option;
        self
    }

    /// Check value ranges.
    ///
    /// Iteration counts of zero are allowed (the corresponding loop is
    /// skipped); blend factors must lie in [0, 1].
    pub fn validate(&self) -> OrthogonalizeResult<()> {
        for factor in [
            self.orthogonalization_to_smoothing_factor,
            self.orthogonalization_to_smoothing_factor_boundary,
            self.areal_to_angle_smoothing_factor,
        ] {
            if !(0.0..=1.0).contains(&factor) {
                return Err(OrthogonalizeError::InvalidBlendFactor(factor));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params() {
        let params = OrthogonalizationParams::default();
        assert_eq!(params.outer_iterations, 2);
        assert_eq!(params.boundary_iterations, 25);
        assert_eq!(params.inner_iterations, 25);
        assert!((params.orthogonalization_to_smoothing_factor - 0.975).abs() < 1e-12);
        assert!((params.orthogonalization_to_smoothing_factor_boundary - 1.0).abs() < 1e-12);
        assert_eq!(params.project_to_land_boundary_option, 0);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn builder() {
        let params = OrthogonalizationParams::new()
            .with_iterations(5, 1, 3)
            .with_smoothing_factor(0.5)
            .with_land_boundary_projection(1);
        assert_eq!(params.outer_iterations, 5);
        assert_eq!(params.inner_iterations, 3);
        assert!((params.orthogonalization_to_smoothing_factor - 0.5).abs() < 1e-12);
        assert_eq!(params.project_to_land_boundary_option, 1);
    }

    #[test]
    fn out_of_range_blend_is_rejected() {
        let params = OrthogonalizationParams::new().with_smoothing_factor(1.5);
        assert!(matches!(
            params.validate(),
            Err(OrthogonalizeError::InvalidBlendFactor(_))
        ));
    }
}
