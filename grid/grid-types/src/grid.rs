//! The 2D unstructured grid and its derived connectivity.

use hashbrown::HashMap;

use crate::constants::{DEG_TO_RAD, EARTH_RADIUS, MIN_CELL_AREA};
use crate::error::{GridError, GridResult};
use crate::ops::{get_dx, get_dy};
use crate::point::{Edge, Point};
use crate::polygon::Polygon;
use crate::projection::Projection;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Classification of a grid node by its incident faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NodeType {
    /// Surrounded by faces on all sides.
    Interior,
    /// On the grid boundary.
    Boundary,
    /// A boundary corner; never repositioned.
    Corner,
    /// Not attached to any face.
    Hanging,
}

/// A polygonal 2D grid: nodes, edges and faces with derived connectivity.
///
/// Faces list their nodes counter-clockwise. Construction derives the
/// edge-to-face incidence, the counter-clockwise edge fan around each node,
/// the node classification, and the per-face circumcenters, mass centers and
/// areas.
#[derive(Debug, Clone)]
pub struct UnstructuredGrid {
    /// Node coordinates in the active projection.
    pub nodes: Vec<Point>,
    /// Node pairs.
    pub edges: Vec<Edge>,
    /// Ordered (counter-clockwise) node loops per face.
    pub faces_nodes: Vec<Vec<usize>>,
    /// Edge ids per face, aligned with `faces_nodes` segments.
    pub faces_edges: Vec<Vec<usize>>,
    /// Incident edges per node, sorted counter-clockwise by angle.
    pub nodes_edges: Vec<Vec<usize>>,
    /// Incident faces per edge; boundary edges carry one.
    pub edges_faces: Vec<[Option<usize>; 2]>,
    /// Node classification.
    pub node_types: Vec<NodeType>,
    /// Per-face circumcenters.
    pub face_circumcenters: Vec<Point>,
    /// Per-face mass centers.
    pub face_mass_centers: Vec<Point>,
    /// Per-face areas (square meters in the spherical projections).
    pub face_areas: Vec<f64>,
    /// Active projection.
    pub projection: Projection,
}

impl UnstructuredGrid {
    /// Build a grid from nodes, edges and face node loops.
    ///
    /// # Errors
    ///
    /// Fails when the node array is empty, an edge or face references a
    /// missing node, a face has fewer than three nodes, or a face boundary
    /// segment has no matching edge.
    pub fn from_parts(
        nodes: Vec<Point>,
        edges: Vec<Edge>,
        faces_nodes: Vec<Vec<usize>>,
        projection: Projection,
    ) -> GridResult<Self> {
        if nodes.is_empty() {
            return Err(GridError::EmptyGrid);
        }
        for (e, edge) in edges.iter().enumerate() {
            for node in [edge.first, edge.second] {
                if node >= nodes.len() {
                    return Err(GridError::EdgeNodeOutOfRange { edge: e, node });
                }
            }
        }
        for (f, face) in faces_nodes.iter().enumerate() {
            if face.len() < 3 {
                return Err(GridError::DegenerateFace { face: f });
            }
            for &node in face {
                if node >= nodes.len() {
                    return Err(GridError::FaceNodeOutOfRange { face: f, node });
                }
            }
        }

        let mut grid = Self {
            nodes,
            edges,
            faces_nodes,
            faces_edges: Vec::new(),
            nodes_edges: Vec::new(),
            edges_faces: Vec::new(),
            node_types: Vec::new(),
            face_circumcenters: Vec::new(),
            face_mass_centers: Vec::new(),
            face_areas: Vec::new(),
            projection,
        };
        grid.administrate()?;
        grid.compute_face_circumcenters_mass_centers_and_areas()?;
        Ok(grid)
    }

    /// Number of nodes.
    #[inline]
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    #[inline]
    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Number of faces.
    #[inline]
    #[must_use]
    pub fn num_faces(&self) -> usize {
        self.faces_nodes.len()
    }

    /// Valence of a node.
    #[inline]
    #[must_use]
    pub fn node_valence(&self, node: usize) -> usize {
        self.nodes_edges[node].len()
    }

    /// Number of nodes (equivalently, edges) of a face.
    #[inline]
    #[must_use]
    pub fn face_num_nodes(&self, face: usize) -> usize {
        self.faces_nodes[face].len()
    }

    /// Face multiplicity of an edge: 0, 1 (boundary) or 2 (interior).
    #[inline]
    #[must_use]
    pub fn edge_num_faces(&self, edge: usize) -> usize {
        self.edges_faces[edge].iter().filter(|f| f.is_some()).count()
    }

    /// Rebuild the derived connectivity and the node classification.
    fn administrate(&mut self) -> GridResult<()> {
        let mut edge_lookup: HashMap<(usize, usize), usize> =
            HashMap::with_capacity(self.edges.len());
        for (e, edge) in self.edges.iter().enumerate() {
            edge_lookup.insert(edge.normalized(), e);
        }

        self.edges_faces = vec![[None, None]; self.edges.len()];
        self.faces_edges = Vec::with_capacity(self.faces_nodes.len());
        for (f, face) in self.faces_nodes.iter().enumerate() {
            let mut face_edges = Vec::with_capacity(face.len());
            for (k, &first) in face.iter().enumerate() {
                let second = face[(k + 1) % face.len()];
                let key = Edge::new(first, second).normalized();
                let Some(&edge_id) = edge_lookup.get(&key) else {
                    return Err(GridError::MissingFaceEdge {
                        face: f,
                        first,
                        second,
                    });
                };
                face_edges.push(edge_id);
                let slots = &mut self.edges_faces[edge_id];
                if slots[0].is_none() {
                    slots[0] = Some(f);
                } else if slots[1].is_none() {
                    slots[1] = Some(f);
                }
            }
            self.faces_edges.push(face_edges);
        }

        self.nodes_edges = vec![Vec::new(); self.nodes.len()];
        for (e, edge) in self.edges.iter().enumerate() {
            if edge.first == edge.second {
                continue;
            }
            self.nodes_edges[edge.first].push(e);
            self.nodes_edges[edge.second].push(e);
        }
        for node in 0..self.nodes.len() {
            let origin = self.nodes[node];
            let projection = self.projection;
            let edges = &self.edges;
            let nodes = &self.nodes;
            self.nodes_edges[node].sort_by(|&a, &b| {
                let angle = |e: usize| {
                    let other = nodes[edges[e].other_node(node)];
                    get_dy(origin, other, projection).atan2(get_dx(origin, other, projection))
                };
                angle(a)
                    .partial_cmp(&angle(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        self.classify_node_types();
        Ok(())
    }

    /// Classify every node from the face multiplicity of its edges.
    pub fn classify_node_types(&mut self) {
        self.node_types = (0..self.nodes.len())
            .map(|n| {
                let valence = self.nodes_edges[n].len();
                if valence == 0 {
                    return NodeType::Hanging;
                }
                let boundary_edges = self.nodes_edges[n]
                    .iter()
                    .filter(|&&e| self.edge_num_faces(e) == 1)
                    .count();
                if boundary_edges == 0 {
                    NodeType::Interior
                } else if valence == 2 {
                    NodeType::Corner
                } else {
                    NodeType::Boundary
                }
            })
            .collect();
    }

    /// Recompute per-face circumcenters, mass centers and areas.
    ///
    /// Triangles get the exact circumcenter in a local tangent frame; larger
    /// polygons use the area centroid.
    ///
    /// # Errors
    ///
    /// Fails when a face has fewer than three nodes.
    pub fn compute_face_circumcenters_mass_centers_and_areas(&mut self) -> GridResult<()> {
        let num_faces = self.faces_nodes.len();
        self.face_circumcenters = vec![Point::INVALID; num_faces];
        self.face_mass_centers = vec![Point::INVALID; num_faces];
        self.face_areas = vec![0.0; num_faces];

        for f in 0..num_faces {
            if self.faces_nodes[f].len() < 3 {
                return Err(GridError::DegenerateFace { face: f });
            }
            let reference = self.nodes[self.faces_nodes[f][0]];
            let local: Vec<(f64, f64)> = self.faces_nodes[f]
                .iter()
                .map(|&n| {
                    let p = self.nodes[n];
                    (
                        get_dx(reference, p, self.projection),
                        get_dy(reference, p, self.projection),
                    )
                })
                .collect();

            // Shoelace area and centroid in the local frame.
            let mut doubled_area = 0.0;
            let mut cx = 0.0;
            let mut cy = 0.0;
            for (i, &(xi, yi)) in local.iter().enumerate() {
                let (xj, yj) = local[(i + 1) % local.len()];
                let cross = xi * yj - xj * yi;
                doubled_area += cross;
                cx += (xi + xj) * cross;
                cy += (yi + yj) * cross;
            }
            let area = 0.5 * doubled_area;
            let (mass_x, mass_y) = if area.abs() < MIN_CELL_AREA {
                let inv = 1.0 / local.len() as f64;
                (
                    local.iter().map(|&(x, _)| x).sum::<f64>() * inv,
                    local.iter().map(|&(_, y)| y).sum::<f64>() * inv,
                )
            } else {
                (cx / (6.0 * area), cy / (6.0 * area))
            };
            let mass_center = self.local_to_coordinates(reference, mass_x, mass_y);
            let (circ_x, circ_y) = if local.len() == 3 {
                triangle_circumcenter_local(local[1], local[2]).unwrap_or((mass_x, mass_y))
            } else {
                (mass_x, mass_y)
            };
            let circumcenter = self.local_to_coordinates(reference, circ_x, circ_y);
            self.face_areas[f] = area.abs();
            self.face_mass_centers[f] = mass_center;
            self.face_circumcenters[f] = circumcenter;
        }
        Ok(())
    }

    /// Mask every node by polygon membership. An empty polygon set selects
    /// every node; `inside` selects membership or its complement.
    #[must_use]
    pub fn mask_nodes_in_polygons(&self, polygons: &[Polygon], inside: bool) -> Vec<bool> {
        if polygons.is_empty() {
            return vec![true; self.nodes.len()];
        }
        self.nodes
            .iter()
            .map(|&node| {
                let contained = polygons.iter().any(|polygon| polygon.contains(node));
                contained == inside
            })
            .collect()
    }

    fn local_to_coordinates(&self, reference: Point, local_x: f64, local_y: f64) -> Point {
        match self.projection {
            Projection::Cartesian => Point::new(reference.x + local_x, reference.y + local_y),
            Projection::Spherical | Projection::SphericalAccurate => {
                let dy = local_y / (DEG_TO_RAD * EARTH_RADIUS);
                let cos_lat = (reference.y * DEG_TO_RAD).cos().max(1e-12);
                let dx = local_x / (DEG_TO_RAD * EARTH_RADIUS * cos_lat);
                Point::new(reference.x + dx, reference.y + dy)
            }
        }
    }
}

/// Circumcenter of a triangle with one vertex at the local origin.
fn triangle_circumcenter_local(b: (f64, f64), c: (f64, f64)) -> Option<(f64, f64)> {
    let d = 2.0 * (b.0 * c.1 - b.1 * c.0);
    if d.abs() < 1e-14 {
        return None;
    }
    let b_norm = b.0 * b.0 + b.1 * b.1;
    let c_norm = c.0 * c.0 + c.1 * c.1;
    Some((
        (c.1 * b_norm - b.1 * c_norm) / d,
        (b.0 * c_norm - c.0 * b_norm) / d,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// A 3x3 node lattice of four unit quads.
    fn unit_quad_grid() -> UnstructuredGrid {
        let mut nodes = Vec::new();
        for j in 0..3 {
            for i in 0..3 {
                nodes.push(Point::new(f64::from(i), f64::from(j)));
            }
        }
        let idx = |i: usize, j: usize| j * 3 + i;
        let mut edges = Vec::new();
        for j in 0..3 {
            for i in 0..2 {
                edges.push(Edge::new(idx(i, j), idx(i + 1, j)));
            }
        }
        for j in 0..2 {
            for i in 0..3 {
                edges.push(Edge::new(idx(i, j), idx(i, j + 1)));
            }
        }
        let mut faces = Vec::new();
        for j in 0..2 {
            for i in 0..2 {
                faces.push(vec![idx(i, j), idx(i + 1, j), idx(i + 1, j + 1), idx(i, j + 1)]);
            }
        }
        UnstructuredGrid::from_parts(nodes, edges, faces, Projection::Cartesian)
            .expect("valid grid")
    }

    #[test]
    fn quad_grid_connectivity() {
        let grid = unit_quad_grid();
        assert_eq!(grid.num_nodes(), 9);
        assert_eq!(grid.num_edges(), 12);
        assert_eq!(grid.num_faces(), 4);
        // Center node touches all four faces through four edges.
        assert_eq!(grid.node_valence(4), 4);
        // Interior edges carry two faces, outer ones one.
        let interior = (0..grid.num_edges())
            .filter(|&e| grid.edge_num_faces(e) == 2)
            .count();
        assert_eq!(interior, 4);
    }

    #[test]
    fn quad_grid_node_types() {
        let grid = unit_quad_grid();
        assert_eq!(grid.node_types[4], NodeType::Interior);
        assert_eq!(grid.node_types[0], NodeType::Corner);
        assert_eq!(grid.node_types[1], NodeType::Boundary);
        assert_eq!(grid.node_types[3], NodeType::Boundary);
    }

    #[test]
    fn quad_grid_geometry() {
        let grid = unit_quad_grid();
        for f in 0..grid.num_faces() {
            assert_relative_eq!(grid.face_areas[f], 1.0, epsilon = 1e-12);
        }
        assert_relative_eq!(grid.face_mass_centers[0].x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(grid.face_mass_centers[0].y, 0.5, epsilon = 1e-12);
        assert_relative_eq!(grid.face_circumcenters[0].x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(grid.face_circumcenters[0].y, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn edge_fan_is_counter_clockwise() {
        let grid = unit_quad_grid();
        let fan: Vec<usize> = grid.nodes_edges[4]
            .iter()
            .map(|&e| grid.edges[e].other_node(4))
            .collect();
        // Neighbors of the center node sorted by angle: south, east, north, west.
        assert_eq!(fan, vec![1, 5, 7, 3]);
    }

    #[test]
    fn triangle_circumcenter() {
        let nodes = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 1.0),
        ];
        let edges = vec![Edge::new(0, 1), Edge::new(1, 2), Edge::new(2, 0)];
        let faces = vec![vec![0, 1, 2]];
        let grid = UnstructuredGrid::from_parts(nodes, edges, faces, Projection::Cartesian)
            .expect("valid grid");
        assert_relative_eq!(grid.face_circumcenters[0].x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(grid.face_circumcenters[0].y, 0.5, epsilon = 1e-12);
        assert_relative_eq!(grid.face_areas[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn face_without_edge_is_rejected() {
        let nodes = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 1.0),
        ];
        let edges = vec![Edge::new(0, 1), Edge::new(1, 2)];
        let faces = vec![vec![0, 1, 2]];
        let result = UnstructuredGrid::from_parts(nodes, edges, faces, Projection::Cartesian);
        assert!(matches!(result, Err(GridError::MissingFaceEdge { .. })));
    }
}
