//! Orthogonalization and smoothing of 2D unstructured grids.
//!
//! The engine iteratively repositions grid nodes so that edges become more
//! nearly orthogonal to the lines joining the circumcenters of their incident
//! faces, while keeping the grid locally smooth in a curvilinear sense. Two
//! coupled operator families drive the update:
//!
//! - the **orthogonalizer** turns per-edge aspect ratios into per-neighbor
//!   weights, with a boundary term that keeps edge nodes in equilibrium;
//! - the **smoother** dedupes node stencils into topology classes, lays each
//!   class out in a local curvilinear frame, and assembles gradient,
//!   divergence and Jacobian operators into a Laplacian-like stencil.
//!
//! Both are convex-combined into one compressed linear system per outer
//! iteration and relaxed by Gauss-Seidel sweeps, interleaved with
//! reprojection of boundary nodes onto the original boundary and an optional
//! snap to external land boundaries.
//!
//! # Example
//!
//! ```
//! use grid_types::{Edge, Point, Projection, UnstructuredGrid};
//! use grid_orthogonalize::{Orthogonalization, OrthogonalizationParams};
//!
//! // A 3x3 lattice of four unit quads with one interior node nudged off
//! // center.
//! let mut nodes: Vec<Point> = (0..9)
//!     .map(|k| Point::new((k % 3) as f64, (k / 3) as f64))
//!     .collect();
//! nodes[4] = Point::new(1.2, 1.05);
//! let mut edges = Vec::new();
//! for j in 0..3 {
//!     for i in 0..2 {
//!         edges.push(Edge::new(j * 3 + i, j * 3 + i + 1));
//!     }
//! }
//! for j in 0..2 {
//!     for i in 0..3 {
//!         edges.push(Edge::new(j * 3 + i, (j + 1) * 3 + i));
//!     }
//! }
//! let faces = vec![
//!     vec![0, 1, 4, 3],
//!     vec![1, 2, 5, 4],
//!     vec![3, 4, 7, 6],
//!     vec![4, 5, 8, 7],
//! ];
//! let mut grid = UnstructuredGrid::from_parts(nodes, edges, faces, Projection::Cartesian)?;
//!
//! let params = OrthogonalizationParams::new().with_iterations(10, 1, 5);
//! let mut engine = Orthogonalization::new();
//! engine.set(&mut grid, params, &[], &[])?;
//! engine.compute(&mut grid)?;
//!
//! // The nudged node has been pulled back towards the lattice position.
//! assert!((grid.nodes[4].x - 1.0).abs() < 5e-3);
//! assert!((grid.nodes[4].y - 1.0).abs() < 5e-3);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod aspect_ratio;
mod error;
mod orthogonalizer;
mod params;
mod quality;
mod smoother;
mod solver;
mod table;

#[cfg(test)]
mod test_grids;

pub use error::{OrthogonalizeError, OrthogonalizeResult};
pub use params::OrthogonalizationParams;
pub use quality::{orthogonality, smoothness};
pub use solver::Orthogonalization;
