//! Land-boundary polylines and node snapping.

use crate::grid::{NodeType, UnstructuredGrid};
use crate::ops::{distance, distance_from_line};
use crate::point::Point;

/// Fraction of a node's longest incident edge within which a land segment is
/// accepted as that node's snap target.
const SNAP_DISTANCE_FACTOR: f64 = 0.5;

/// External land-boundary polylines the mesh boundary can be snapped to.
///
/// Polylines are separated by invalid points in the input sequence.
#[derive(Debug, Clone, Default)]
pub struct LandBoundaries {
    polylines: Vec<Vec<Point>>,
    /// Per mesh node, the accepted (polyline, segment) snap target.
    nearest_segment: Vec<Option<(usize, usize)>>,
}

impl LandBoundaries {
    /// Split the point sequence into polylines on invalid separators.
    #[must_use]
    pub fn new(points: &[Point]) -> Self {
        let mut polylines = Vec::new();
        let mut current = Vec::new();
        for &point in points {
            if point.is_valid() {
                current.push(point);
            } else if current.len() >= 2 {
                polylines.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
        if current.len() >= 2 {
            polylines.push(current);
        }
        Self {
            polylines,
            nearest_segment: Vec::new(),
        }
    }

    /// Whether any polyline was provided.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.polylines.is_empty()
    }

    /// Reset the per-node snap administration for `grid`.
    pub fn administrate(&mut self, grid: &UnstructuredGrid) {
        self.nearest_segment = vec![None; grid.num_nodes()];
    }

    /// Assign each mesh boundary node its nearest land segment, accepted only
    /// within `SNAP_DISTANCE_FACTOR` of the node's longest incident edge.
    pub fn find_nearest_mesh_boundary(&mut self, grid: &UnstructuredGrid) {
        self.administrate(grid);
        for n in 0..grid.num_nodes() {
            if !matches!(
                grid.node_types[n],
                NodeType::Boundary | NodeType::Corner
            ) {
                continue;
            }
            let node = grid.nodes[n];
            let max_edge_length = grid.nodes_edges[n]
                .iter()
                .map(|&e| {
                    let edge = grid.edges[e];
                    distance(
                        grid.nodes[edge.first],
                        grid.nodes[edge.second],
                        grid.projection,
                    )
                })
                .fold(0.0, f64::max);
            let tolerance = SNAP_DISTANCE_FACTOR * max_edge_length;

            let mut best: Option<(f64, (usize, usize))> = None;
            for (p, polyline) in self.polylines.iter().enumerate() {
                for s in 0..polyline.len() - 1 {
                    let projection =
                        distance_from_line(node, polyline[s], polyline[s + 1], grid.projection);
                    if projection.distance <= tolerance
                        && best.map_or(true, |(d, _)| projection.distance < d)
                    {
                        best = Some((projection.distance, (p, s)));
                    }
                }
            }
            self.nearest_segment[n] = best.map(|(_, target)| target);
        }
    }

    /// Project every assigned node onto its land segment.
    pub fn snap_mesh_to_land_boundaries(&self, grid: &mut UnstructuredGrid) {
        for (n, target) in self.nearest_segment.iter().enumerate() {
            let Some((p, s)) = target else { continue };
            let polyline = &self.polylines[*p];
            let projection =
                distance_from_line(grid.nodes[n], polyline[*s], polyline[*s + 1], grid.projection);
            grid.nodes[n] = projection.point;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DOUBLE_MISSING;

    #[test]
    fn polylines_split_on_invalid_points() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(DOUBLE_MISSING, DOUBLE_MISSING),
            Point::new(0.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 1.0),
        ];
        let land = LandBoundaries::new(&points);
        assert!(!land.is_empty());
        assert_eq!(land.polylines.len(), 2);
        assert_eq!(land.polylines[0].len(), 2);
        assert_eq!(land.polylines[1].len(), 3);
    }

    #[test]
    fn lone_points_are_dropped() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(DOUBLE_MISSING, DOUBLE_MISSING),
            Point::new(1.0, 1.0),
        ];
        let land = LandBoundaries::new(&points);
        assert!(land.is_empty());
    }
}
