//! Per-edge quality diagnostics.

use grid_types::constants::{DOUBLE_MISSING, MIN_CELL_AREA};
use grid_types::ops::normalized_inner_product_two_segments;
use grid_types::UnstructuredGrid;

/// Per-edge orthogonality: the absolute cosine between the edge and the line
/// joining its two face circumcenters. Zero means orthogonal; edges without
/// two faces report the missing value.
#[must_use]
pub fn orthogonality(grid: &UnstructuredGrid) -> Vec<f64> {
    (0..grid.num_edges())
        .map(|e| {
            let edge = grid.edges[e];
            if edge.first == edge.second {
                return DOUBLE_MISSING;
            }
            let [Some(left), Some(right)] = grid.edges_faces[e] else {
                return DOUBLE_MISSING;
            };
            normalized_inner_product_two_segments(
                grid.nodes[edge.first],
                grid.nodes[edge.second],
                grid.face_circumcenters[left],
                grid.face_circumcenters[right],
                grid.projection,
            )
            .map_or(DOUBLE_MISSING, f64::abs)
        })
        .collect()
}

/// Per-edge smoothness: the incident face-area ratio clamped to at least 1,
/// reported only when one of the areas falls below the minimum cell area.
#[must_use]
pub fn smoothness(grid: &UnstructuredGrid) -> Vec<f64> {
    (0..grid.num_edges())
        .map(|e| {
            let edge = grid.edges[e];
            if edge.first == edge.second {
                return DOUBLE_MISSING;
            }
            let [Some(left), Some(right)] = grid.edges_faces[e] else {
                return DOUBLE_MISSING;
            };
            let left_area = grid.face_areas[left];
            let right_area = grid.face_areas[right];
            if left_area >= MIN_CELL_AREA && right_area >= MIN_CELL_AREA {
                return DOUBLE_MISSING;
            }
            if left_area <= 0.0 {
                return DOUBLE_MISSING;
            }
            let mut ratio = right_area / left_area;
            if ratio < 1.0 {
                ratio = 1.0 / ratio;
            }
            ratio
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_grids::{triangle_fan, unit_quad_grid};

    #[test]
    fn regular_lattice_is_orthogonal() {
        let grid = unit_quad_grid(3);
        let values = orthogonality(&grid);
        for e in 0..grid.num_edges() {
            if grid.edge_num_faces(e) == 2 {
                assert!(
                    values[e] <= 1e-10,
                    "interior edge {e} reports {}",
                    values[e]
                );
            } else {
                assert!((values[e] - DOUBLE_MISSING).abs() < f64::EPSILON);
            }
        }
    }

    #[test]
    fn fan_spokes_are_orthogonal() {
        let grid = triangle_fan();
        let values = orthogonality(&grid);
        // Spoke edges (center to ring) are the first six edges.
        for e in 0..6 {
            assert!(values[e] <= 1e-10, "spoke {e} reports {}", values[e]);
        }
    }

    #[test]
    fn smoothness_is_gated_on_tiny_cells() {
        let grid = unit_quad_grid(3);
        let values = smoothness(&grid);
        // All faces have unit area, so every edge reports the missing value.
        for &value in &values {
            assert!((value - DOUBLE_MISSING).abs() < f64::EPSILON);
        }
    }
}
