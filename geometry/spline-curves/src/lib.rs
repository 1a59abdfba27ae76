//! Cubic spline polylines over projected 2D points.
//!
//! Splines are stored as corner points with precomputed natural-cubic second
//! derivatives, evaluated in segment-index coordinates (corner `k` sits at
//! `t = k`). The set-level API covers length sampling with an optional
//! curvature weighting, local curvature/normal/tangent queries, and spline
//! intersection with bisection refinement. All distances respect the active
//! projection of the underlying geometry kernel.
//!
//! # Example
//!
//! ```
//! use grid_types::{Point, Projection};
//! use spline_curves::SplineSet;
//!
//! let mut set = SplineSet::new(Projection::Cartesian);
//! let index = set.add(vec![
//!     Point::new(0.0, 0.0),
//!     Point::new(1.0, 1.0),
//!     Point::new(2.0, 0.0),
//! ])?;
//!
//! let spline = set.get(index).unwrap();
//! assert!(spline.length() > 2.0);
//!
//! let top = spline.point_at(1.0);
//! assert!((top.y - 1.0).abs() < 1e-12);
//! # Ok::<(), spline_curves::SplineError>(())
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod spline;

pub use error::{SplineError, SplineResult};
pub use spline::{Spline, SplineCurvature, SplineIntersection, SplineSet};
