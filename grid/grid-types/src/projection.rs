//! Geometric projections.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The coordinate interpretation of grid nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Projection {
    /// Planar coordinates, distances in coordinate units.
    #[default]
    Cartesian,
    /// Longitude/latitude in degrees, with cosine-latitude scaling of
    /// east-west distances.
    Spherical,
    /// Longitude/latitude in degrees, displacements handled in a local
    /// rotated 3D frame.
    SphericalAccurate,
}

impl Projection {
    /// Whether coordinates are geographic (degrees on the sphere).
    #[inline]
    #[must_use]
    pub const fn is_spherical(self) -> bool {
        matches!(self, Self::Spherical | Self::SphericalAccurate)
    }
}
