//! End-to-end orthogonalization scenarios on small reference grids.
//!
//! Organized by grid family:
//! - regular quad lattices: fixed-point behavior, perturbation recovery,
//!   boundary reprojection and land-boundary snapping
//! - a triangular fan: fixed-point behavior and the orthogonality diagnostic
//! - a spherical lattice: stability of the geographic path

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::cast_precision_loss)]

use approx::assert_relative_eq;
use grid_orthogonalize::{orthogonality, Orthogonalization, OrthogonalizationParams};
use grid_types::ops::distance_from_line;
use grid_types::{Edge, NodeType, Point, Projection, UnstructuredGrid};

/// An `n x n` node lattice of quads with the given spacing and origin.
fn quad_grid(n: usize, spacing: f64, origin: Point, projection: Projection) -> UnstructuredGrid {
    let mut nodes = Vec::new();
    for j in 0..n {
        for i in 0..n {
            nodes.push(Point::new(
                origin.x + i as f64 * spacing,
                origin.y + j as f64 * spacing,
            ));
        }
    }
    let idx = |i: usize, j: usize| j * n + i;
    let mut edges = Vec::new();
    for j in 0..n {
        for i in 0..n - 1 {
            edges.push(Edge::new(idx(i, j), idx(i + 1, j)));
        }
    }
    for j in 0..n - 1 {
        for i in 0..n {
            edges.push(Edge::new(idx(i, j), idx(i, j + 1)));
        }
    }
    let mut faces = Vec::new();
    for j in 0..n - 1 {
        for i in 0..n - 1 {
            faces.push(vec![
                idx(i, j),
                idx(i + 1, j),
                idx(i + 1, j + 1),
                idx(i, j + 1),
            ]);
        }
    }
    UnstructuredGrid::from_parts(nodes, edges, faces, projection).expect("valid grid")
}

/// Six equilateral triangles around the origin.
fn triangle_fan() -> UnstructuredGrid {
    let mut nodes = vec![Point::new(0.0, 0.0)];
    for k in 0..6 {
        let angle = f64::from(k) * 60.0_f64.to_radians();
        nodes.push(Point::new(angle.cos(), angle.sin()));
    }
    let mut edges = Vec::new();
    for k in 1..=6 {
        edges.push(Edge::new(0, k));
    }
    for k in 1..=6 {
        edges.push(Edge::new(k, if k == 6 { 1 } else { k + 1 }));
    }
    let mut faces = Vec::new();
    for k in 1..=6 {
        faces.push(vec![0, k, if k == 6 { 1 } else { k + 1 }]);
    }
    UnstructuredGrid::from_parts(nodes, edges, faces, Projection::Cartesian).expect("valid grid")
}

mod quad_lattice {
    use super::*;

    #[test]
    fn regular_lattice_does_not_drift() {
        let mut grid = quad_grid(3, 1.0, Point::new(0.0, 0.0), Projection::Cartesian);
        let before = grid.nodes.clone();

        let params = OrthogonalizationParams::new()
            .with_iterations(1, 1, 1)
            .with_smoothing_factor(0.975)
            .with_areal_smoothing(1.0);
        let mut engine = Orthogonalization::new();
        engine.set(&mut grid, params, &[], &[]).expect("set");
        engine.compute(&mut grid).expect("compute");

        for (after, original) in grid.nodes.iter().zip(&before) {
            assert!((after.x - original.x).abs() <= 1e-10);
            assert!((after.y - original.y).abs() <= 1e-10);
        }
    }

    #[test]
    fn perturbed_interior_node_recovers() {
        let mut grid = quad_grid(3, 1.0, Point::new(0.0, 0.0), Projection::Cartesian);
        grid.nodes[4] = Point::new(1.2, 1.05);

        let params = OrthogonalizationParams::new().with_iterations(10, 1, 5);
        let mut engine = Orthogonalization::new();
        engine.set(&mut grid, params, &[], &[]).expect("set");
        engine.compute(&mut grid).expect("compute");

        assert!((grid.nodes[4].x - 1.0).abs() <= 5e-3);
        assert!((grid.nodes[4].y - 1.0).abs() <= 5e-3);
    }

    #[test]
    fn shifted_boundary_node_is_projected_back() {
        let mut grid = quad_grid(5, 1.0, Point::new(0.0, 0.0), Projection::Cartesian);
        assert_eq!(grid.node_types[2], NodeType::Boundary);

        let params = OrthogonalizationParams::new().with_iterations(1, 1, 1);
        let mut engine = Orthogonalization::new();
        engine.set(&mut grid, params, &[], &[]).expect("set");

        // Push the middle bottom node off the boundary after the snapshot.
        grid.nodes[2] = Point::new(2.0, 0.3);
        engine.compute(&mut grid).expect("compute");

        assert!(grid.nodes[2].y.abs() <= 1e-9);
    }

    #[test]
    fn boundary_nodes_stay_within_the_original_polyline() {
        let mut grid = quad_grid(5, 1.0, Point::new(0.0, 0.0), Projection::Cartesian);
        let params = OrthogonalizationParams::new().with_iterations(2, 2, 2);
        let mut engine = Orthogonalization::new();
        engine.set(&mut grid, params, &[], &[]).expect("set");
        engine.compute(&mut grid).expect("compute");

        for n in 0..grid.num_nodes() {
            if grid.node_types[n] != NodeType::Boundary {
                continue;
            }
            // Every boundary node of the lattice sits on an axis-aligned
            // outline segment.
            let p = grid.nodes[n];
            let on_outline = p.x.abs() <= 1e-9
                || (p.x - 4.0).abs() <= 1e-9
                || p.y.abs() <= 1e-9
                || (p.y - 4.0).abs() <= 1e-9;
            assert!(on_outline, "boundary node {n} drifted to ({}, {})", p.x, p.y);
        }
    }

    #[test]
    fn lattice_reports_orthogonal_interior_edges() {
        let mut grid = quad_grid(3, 1.0, Point::new(0.0, 0.0), Projection::Cartesian);
        let params = OrthogonalizationParams::new().with_iterations(1, 1, 1);
        let mut engine = Orthogonalization::new();
        engine.set(&mut grid, params, &[], &[]).expect("set");
        engine.compute(&mut grid).expect("compute");

        let values = orthogonality(&grid);
        for e in 0..grid.num_edges() {
            if grid.edge_num_faces(e) == 2 {
                assert!(values[e] <= 1e-10, "edge {e} reports {}", values[e]);
            }
        }
    }
}

mod land_boundary {
    use super::*;

    #[test]
    fn top_row_snaps_to_the_land_segment() {
        // Nodes at 0, 10 and 20; the land segment runs slightly above the
        // top row.
        let mut grid = quad_grid(3, 10.0, Point::new(0.0, 0.0), Projection::Cartesian);
        let land = vec![Point::new(-1.37, 21.25), Point::new(20.89, 21.54)];

        let params = OrthogonalizationParams::new()
            .with_iterations(1, 1, 1)
            .with_land_boundary_projection(1);
        let mut engine = Orthogonalization::new();
        engine.set(&mut grid, params, &[], &land).expect("set");
        engine.compute(&mut grid).expect("compute");

        for n in [6, 7, 8] {
            let projection =
                distance_from_line(grid.nodes[n], land[0], land[1], Projection::Cartesian);
            assert!(
                projection.distance <= 1e-9,
                "top node {n} sits {} away from the land segment",
                projection.distance
            );
        }
        // The bottom row is far from the segment and must not snap.
        for n in [0, 1, 2] {
            assert!(grid.nodes[n].y.abs() <= 1e-9);
        }
    }
}

mod triangular_fan {
    use super::*;

    #[test]
    fn fan_is_a_fixed_point() {
        let mut grid = triangle_fan();
        let before = grid.nodes.clone();

        let params = OrthogonalizationParams::default();
        let mut engine = Orthogonalization::new();
        engine.set(&mut grid, params, &[], &[]).expect("set");
        engine.compute(&mut grid).expect("compute");

        for (after, original) in grid.nodes.iter().zip(&before) {
            assert!((after.x - original.x).abs() <= 1e-6);
            assert!((after.y - original.y).abs() <= 1e-6);
        }
    }

    #[test]
    fn fan_spokes_are_orthogonal() {
        let grid = triangle_fan();
        let values = orthogonality(&grid);
        for e in 0..6 {
            assert!(values[e] <= 1e-10, "spoke {e} reports {}", values[e]);
        }
    }
}

mod spherical_lattice {
    use super::*;

    #[test]
    fn geographic_grid_stays_put() {
        let mut grid = quad_grid(3, 1.0, Point::new(10.0, 40.0), Projection::Spherical);
        let before = grid.nodes.clone();

        let params = OrthogonalizationParams::new().with_iterations(1, 1, 1);
        let mut engine = Orthogonalization::new();
        engine.set(&mut grid, params, &[], &[]).expect("set");
        engine.compute(&mut grid).expect("compute");

        for (after, original) in grid.nodes.iter().zip(&before) {
            assert_relative_eq!(after.x, original.x, epsilon = 0.05);
            assert_relative_eq!(after.y, original.y, epsilon = 0.05);
        }
    }
}
