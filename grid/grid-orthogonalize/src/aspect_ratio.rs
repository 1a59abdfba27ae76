//! Per-edge aspect ratios: flow-edge length over edge length.

#![allow(clippy::float_cmp)] // sentinel comparisons against the missing value

use grid_types::constants::{DOUBLE_MISSING, MIN_EDGE_LENGTH_SQUARED};
use grid_types::ops::{distance, inner_product_two_segments};
use grid_types::{Point, UnstructuredGrid};

/// Blend between the curvilinear and the orthogonal aspect ratio on
/// curvilinear quad edges. 1.0 disables the curvilinear term entirely.
const CURVILINEAR_TO_ORTHOGONAL_RATIO: f64 = 0.5;

/// Compute the aspect ratio of every edge.
///
/// The flow edge of an interior edge connects the circumcenters of its two
/// faces; a boundary edge gets a ghost center by reflecting the single
/// circumcenter across the edge. Edges never visited by a face keep a zero
/// ratio, which downstream stages read as "no contribution".
pub(crate) fn compute_aspect_ratios(grid: &UnstructuredGrid) -> Vec<f64> {
    let num_edges = grid.num_edges();
    let mut average_edge_lengths = vec![[DOUBLE_MISSING; 2]; num_edges];
    let mut average_flow_lengths = vec![DOUBLE_MISSING; num_edges];
    let mut curvilinear = vec![true; grid.num_nodes()];
    let mut edge_lengths = vec![0.0; num_edges];
    let mut aspect_ratios = vec![0.0; num_edges];

    for e in 0..num_edges {
        let edge = grid.edges[e];
        if edge.first == edge.second {
            continue;
        }
        let first = grid.nodes[edge.first];
        let second = grid.nodes[edge.second];
        let edge_length = distance(first, second, grid.projection);
        edge_lengths[e] = edge_length;

        let left_center = grid.edges_faces[e][0]
            .map_or(first, |face| grid.face_circumcenters[face]);
        let right_center = if let Some(face) = grid.edges_faces[e][1] {
            grid.face_circumcenters[face]
        } else {
            // Ghost center: reflect the left center across the edge.
            let along = inner_product_two_segments(first, second, first, left_center, grid.projection)
                / (edge_length * edge_length).max(MIN_EDGE_LENGTH_SQUARED);
            let foot = first * (1.0 - along) + second * along;
            Point::new(2.0 * foot.x - left_center.x, 2.0 * foot.y - left_center.y)
        };
        average_flow_lengths[e] = distance(left_center, right_center, grid.projection);
    }

    for f in 0..grid.num_faces() {
        let num_face_nodes = grid.face_num_nodes(f);
        if num_face_nodes < 3 {
            continue;
        }
        for n in 0..num_face_nodes {
            if num_face_nodes != 4 {
                curvilinear[grid.faces_nodes[f][n]] = false;
            }
            let edge_index = grid.faces_edges[f][n];
            if grid.edge_num_faces(edge_index) < 1 {
                continue;
            }

            let mut edge_length = edge_lengths[edge_index];
            if edge_length != 0.0 {
                aspect_ratios[edge_index] = average_flow_lengths[edge_index] / edge_length;
            }

            // Quads average each edge with its opposite.
            if num_face_nodes == 4 {
                let opposite = grid.faces_edges[f][(n + 2) % 4];
                edge_length = 0.5 * (edge_lengths[edge_index] + edge_lengths[opposite]);
            }

            let slots = &mut average_edge_lengths[edge_index];
            if slots[0] == DOUBLE_MISSING {
                slots[0] = edge_length;
            } else {
                slots[1] = edge_length;
            }
        }
    }

    if CURVILINEAR_TO_ORTHOGONAL_RATIO == 1.0 {
        return aspect_ratios;
    }

    for e in 0..num_edges {
        let edge = grid.edges[e];
        if edge.first == edge.second || grid.edge_num_faces(e) < 1 {
            continue;
        }
        // Only edges whose both nodes sit in a fully curvilinear (quad) patch.
        if !curvilinear[edge.first] || !curvilinear[edge.second] {
            continue;
        }
        let [first_avg, second_avg] = average_edge_lengths[e];
        if grid.edge_num_faces(e) == 1 {
            if first_avg != 0.0 && first_avg != DOUBLE_MISSING {
                aspect_ratios[e] = average_flow_lengths[e] / first_avg;
            }
        } else if first_avg != 0.0
            && second_avg != 0.0
            && first_avg != DOUBLE_MISSING
            && second_avg != DOUBLE_MISSING
        {
            aspect_ratios[e] = CURVILINEAR_TO_ORTHOGONAL_RATIO * aspect_ratios[e]
                + (1.0 - CURVILINEAR_TO_ORTHOGONAL_RATIO) * average_flow_lengths[e]
                    / (0.5 * (first_avg + second_avg));
        }
    }

    aspect_ratios
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_grids::{triangle_fan, unit_quad_grid};
    use approx::assert_relative_eq;

    #[test]
    fn unit_quads_have_unit_aspect_ratios() {
        let grid = unit_quad_grid(3);
        let ratios = compute_aspect_ratios(&grid);
        for (e, &ratio) in ratios.iter().enumerate() {
            assert_relative_eq!(ratio, 1.0, epsilon = 1e-12, max_relative = 1e-12);
            assert!(ratio >= 0.0, "edge {e} has negative aspect ratio");
        }
    }

    #[test]
    fn triangle_fan_ratios_are_nonnegative() {
        let grid = triangle_fan();
        let ratios = compute_aspect_ratios(&grid);
        for &ratio in &ratios {
            assert!(ratio >= 0.0);
        }
        // Spoke edges: circumcenters of the two equilateral neighbors sit
        // 1/sqrt(3) apart, on edges of unit length.
        let expected = 1.0 / 3.0_f64.sqrt();
        assert_relative_eq!(ratios[0], expected, epsilon = 1e-9);
    }
}
