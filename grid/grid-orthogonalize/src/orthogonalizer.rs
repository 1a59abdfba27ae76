//! Orthogonalizer weights and boundary right-hand side.

use grid_types::constants::DEG_TO_RAD;
use grid_types::ops::{distance, edge_outward_normal};
use grid_types::{NodeType, Projection, UnstructuredGrid};

use crate::table::FlatTable;

/// Per-neighbor weights proportional to edge aspect ratios, and the 2-vector
/// right-hand side that keeps boundary nodes in equilibrium against the
/// one-sided pull of their interior neighbors.
pub(crate) fn compute_weights_and_rhs(
    grid: &UnstructuredGrid,
    nodes_nodes: &FlatTable<usize>,
    aspect_ratios: &[f64],
) -> (FlatTable<f64>, Vec<[f64; 2]>) {
    let mut weights =
        FlatTable::from_row_widths((0..grid.num_nodes()).map(|n| grid.node_valence(n)));
    let mut rhs = vec![[0.0; 2]; grid.num_nodes()];

    for n in 0..grid.num_nodes() {
        if !matches!(grid.node_types[n], NodeType::Interior | NodeType::Boundary) {
            continue;
        }

        for k in 0..grid.node_valence(n) {
            let edge_index = grid.nodes_edges[n][k];
            let aspect_ratio = aspect_ratios[edge_index];
            weights.row_mut(n)[k] = aspect_ratio;

            if grid.edge_num_faces(edge_index) == 1 {
                // Boundary edge: half weight plus an outward normal term.
                weights.row_mut(n)[k] = 0.5 * aspect_ratio;

                let neighbour = grid.nodes[nodes_nodes.row(n)[k]];
                let node = grid.nodes[n];
                let neighbour_distance = distance(neighbour, node, grid.projection);

                let Some(left_face) = grid.edges_faces[edge_index][0] else {
                    continue;
                };
                let (mut normal, _flipped) = edge_outward_normal(
                    node,
                    neighbour,
                    grid.face_mass_centers[left_face],
                    grid.projection,
                );
                if grid.projection == Projection::Spherical {
                    normal.x *= (DEG_TO_RAD * 0.5 * (node.y + neighbour.y)).cos();
                }

                rhs[n][0] += neighbour_distance * normal.x * 0.5;
                rhs[n][1] += neighbour_distance * normal.y * 0.5;
            }
        }

        let sum: f64 = weights.row(n).iter().sum();
        if sum.abs() > 1e-14 {
            let factor = 1.0 / sum;
            for weight in weights.row_mut(n) {
                *weight *= factor;
            }
            rhs[n][0] *= factor;
            rhs[n][1] *= factor;
        }
    }

    (weights, rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspect_ratio::compute_aspect_ratios;
    use crate::test_grids::{neighbor_table, unit_quad_grid};
    use approx::assert_relative_eq;

    #[test]
    fn weights_are_normalized() {
        let grid = unit_quad_grid(3);
        let nodes_nodes = neighbor_table(&grid);
        let ratios = compute_aspect_ratios(&grid);
        let (weights, _rhs) = compute_weights_and_rhs(&grid, &nodes_nodes, &ratios);
        for n in 0..grid.num_nodes() {
            if !matches!(grid.node_types[n], NodeType::Interior | NodeType::Boundary) {
                continue;
            }
            let sum: f64 = weights.row(n).iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn boundary_rhs_balances_interior_pull() {
        let grid = unit_quad_grid(3);
        let nodes_nodes = neighbor_table(&grid);
        let ratios = compute_aspect_ratios(&grid);
        let (weights, rhs) = compute_weights_and_rhs(&grid, &nodes_nodes, &ratios);

        // Node 1 sits mid-bottom at (1, 0); its single interior neighbor
        // pulls north with the spanning weight, the right-hand side pushes
        // south with the same magnitude.
        let n = 1;
        let mut pull = [0.0; 2];
        for (k, &weight) in weights.row(n).iter().enumerate() {
            let m = grid.nodes[nodes_nodes.row(n)[k]];
            pull[0] += weight * (m.x - grid.nodes[n].x);
            pull[1] += weight * (m.y - grid.nodes[n].y);
        }
        assert_relative_eq!(pull[0] + rhs[n][0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(pull[1] + rhs[n][1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn interior_node_has_no_rhs() {
        let grid = unit_quad_grid(3);
        let nodes_nodes = neighbor_table(&grid);
        let ratios = compute_aspect_ratios(&grid);
        let (_, rhs) = compute_weights_and_rhs(&grid, &nodes_nodes, &ratios);
        assert_relative_eq!(rhs[4][0], 0.0, epsilon = 1e-14);
        assert_relative_eq!(rhs[4][1], 0.0, epsilon = 1e-14);
    }
}
