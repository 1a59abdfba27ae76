//! Grid fixtures shared by the unit tests.

use grid_types::{Edge, Point, Projection, UnstructuredGrid};

use crate::table::FlatTable;

/// An `n x n` node lattice of unit quads in the Cartesian projection.
pub(crate) fn unit_quad_grid(n: usize) -> UnstructuredGrid {
    spaced_quad_grid(n, 1.0)
}

/// An `n x n` node lattice of quads with the given spacing.
pub(crate) fn spaced_quad_grid(n: usize, spacing: f64) -> UnstructuredGrid {
    let mut nodes = Vec::new();
    for j in 0..n {
        for i in 0..n {
            nodes.push(Point::new(i as f64 * spacing, j as f64 * spacing));
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
    UnstructuredGrid::from_parts(nodes, edges, faces, Projection::Cartesian).expect("valid grid")
}

/// Six equilateral triangles around the origin: node 0 at the center, nodes
/// 1..=6 on the unit circle every 60 degrees.
pub(crate) fn triangle_fan() -> UnstructuredGrid {
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

/// The per-node neighbor table the solver builds in `set`.
pub(crate) fn neighbor_table(grid: &UnstructuredGrid) -> FlatTable<usize> {
    let mut table =
        FlatTable::from_row_widths((0..grid.num_nodes()).map(|n| grid.node_valence(n)));
    for n in 0..grid.num_nodes() {
        for (k, &e) in grid.nodes_edges[n].iter().enumerate() {
            table.row_mut(n)[k] = grid.edges[e].other_node(n);
        }
    }
    table
}
