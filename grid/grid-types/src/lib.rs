//! 2D unstructured grid model and projection-aware geometry kernel.
//!
//! This crate carries the shared foundation of the grid ecosystem:
//!
//! - [`Point`], [`Edge`], [`Projection`] - plain coordinate and connectivity
//!   types, with planar Cartesian, spherical (degrees with cosine-latitude
//!   scaling) and high-accuracy spherical (local 3D frame) interpretations
//! - [`ops`] - pure geometric primitives: deltas, distances, inner products,
//!   segment intersection and projection, spherical/Cartesian-3D conversion
//! - [`UnstructuredGrid`] - a polygonal grid of nodes, edges and faces with
//!   derived connectivity, node classification, circumcenters, mass centers
//!   and areas
//! - [`Polygon`] node selection masks and [`LandBoundaries`] snapping
//!
//! # Example
//!
//! ```
//! use grid_types::{Edge, Point, Projection, UnstructuredGrid};
//!
//! // A single unit quad.
//! let nodes = vec![
//!     Point::new(0.0, 0.0),
//!     Point::new(1.0, 0.0),
//!     Point::new(1.0, 1.0),
//!     Point::new(0.0, 1.0),
//! ];
//! let edges = vec![
//!     Edge::new(0, 1),
//!     Edge::new(1, 2),
//!     Edge::new(2, 3),
//!     Edge::new(3, 0),
//! ];
//! let faces = vec![vec![0, 1, 2, 3]];
//!
//! let grid = UnstructuredGrid::from_parts(nodes, edges, faces, Projection::Cartesian)?;
//! assert_eq!(grid.num_faces(), 1);
//! assert!((grid.face_areas[0] - 1.0).abs() < 1e-12);
//! # Ok::<(), grid_types::GridError>(())
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod constants;
mod error;
mod grid;
mod land;
pub mod ops;
mod point;
mod polygon;
mod projection;

pub use error::{GridError, GridResult};
pub use grid::{NodeType, UnstructuredGrid};
pub use land::LandBoundaries;
pub use point::{Edge, Point};
pub use polygon::Polygon;
pub use projection::Projection;
