//! Curvilinear smoother: topology classes, local (xi, eta) frames and the
//! discrete operators assembled in them.
//!
//! Around every movable node the smoother collects the shared faces and the
//! connected nodes, lays the stencil out in a local curvilinear frame, and
//! dedupes the resulting patterns into topology classes. The gradient,
//! divergence and Jacobian combinators are computed once per class and reused
//! by every node mapped to it.

#![allow(clippy::float_cmp)] // sentinel comparisons and exact degeneracy guards
#![allow(clippy::similar_names)]
#![allow(clippy::cast_precision_loss)]

use std::f64::consts::PI;

use hashbrown::HashMap;

use grid_types::constants::{DEG_TO_RAD, DOUBLE_MISSING, MAX_NODES_PER_FACE};
use grid_types::ops::{next_circular_backward_index, next_circular_forward_index};
use grid_types::{NodeType, Point, Projection, UnstructuredGrid};

use crate::error::{OrthogonalizeError, OrthogonalizeResult};
use crate::table::FlatTable;

/// Angular tolerance below which two stencil layouts share a topology class.
const THETA_TOLERANCE: f64 = 1e-4;

/// One topology class: the stencil layout and the operators discretized in it.
#[derive(Debug, Clone, Default)]
pub(crate) struct Topology {
    pub num_faces: usize,
    pub num_nodes: usize,
    /// Shared faces around the node; `None` marks a boundary hole in the fan.
    pub shared_faces: Vec<Option<usize>>,
    pub connected_nodes: Vec<usize>,
    /// Per shared face, the stencil position of each face node.
    pub face_node_mapping: Vec<Vec<usize>>,
    pub xi: Vec<f64>,
    pub eta: Vec<f64>,
    /// Face-center combination weights; every row sums to 1.
    pub az: Vec<Vec<f64>>,
    pub gxi: Vec<Vec<f64>>,
    pub geta: Vec<Vec<f64>>,
    pub divxi: Vec<f64>,
    pub diveta: Vec<f64>,
    pub jxi: Vec<f64>,
    pub jeta: Vec<f64>,
    /// Reference second-moment stencil used as a regularizer.
    pub ww2: Vec<f64>,
}

/// Scratch stencil of a single node before topology lookup.
#[derive(Debug, Default)]
struct NodeStencil {
    shared_faces: Vec<Option<usize>>,
    connected_nodes: Vec<usize>,
    face_node_mapping: Vec<Vec<usize>>,
    xi: Vec<f64>,
    eta: Vec<f64>,
}

/// Smoother administration over all grid nodes.
#[derive(Debug, Default)]
pub(crate) struct Smoother {
    pub num_connected_nodes: Vec<usize>,
    pub connected_nodes: Vec<Vec<usize>>,
    pub node_topology: Vec<Option<usize>>,
    pub topologies: Vec<Topology>,
    /// Topology candidates bucketed by (shared faces, connected nodes).
    buckets: HashMap<(usize, usize), Vec<usize>>,
    /// Coordinates of nodes skipped for geometric degeneracies.
    pub node_errors: Vec<Point>,
}

impl Smoother {
    /// Rebuild the per-node stencils and the topology class store.
    pub fn compute_topologies(&mut self, grid: &UnstructuredGrid) -> OrthogonalizeResult<()> {
        let num_nodes = grid.num_nodes();
        self.num_connected_nodes = vec![0; num_nodes];
        self.connected_nodes = vec![Vec::new(); num_nodes];
        self.node_topology = vec![None; num_nodes];
        self.topologies.clear();
        self.buckets.clear();
        self.node_errors.clear();

        for n in 0..num_nodes {
            let mut stencil = node_administration(grid, n);
            self.num_connected_nodes[n] = stencil.connected_nodes.len();
            self.connected_nodes[n] = stencil.connected_nodes.clone();

            stencil.xi = vec![0.0; stencil.connected_nodes.len()];
            stencil.eta = vec![0.0; stencil.connected_nodes.len()];
            if !self.compute_node_xi_eta(grid, n, &mut stencil) {
                continue;
            }
            self.save_topology_if_needed(n, stencil);
        }
        Ok(())
    }

    /// Assemble the operators of every topology class, each exactly once.
    pub fn compute_operators(&mut self, grid: &UnstructuredGrid) -> OrthogonalizeResult<()> {
        let mut computed = vec![false; self.topologies.len()];
        for n in 0..grid.num_nodes() {
            let Some(topology_index) = self.node_topology[n] else {
                continue;
            };
            if computed[topology_index] {
                continue;
            }
            computed[topology_index] = true;

            let mut topology = std::mem::take(&mut self.topologies[topology_index]);
            allocate_operators(&mut topology);
            let result = compute_topology_operators(grid, n, &mut topology);
            self.topologies[topology_index] = topology;
            result?;
        }
        Ok(())
    }

    /// Per-node stencil weights from the class operators and the metric
    /// Jacobian at the node. Rows are sized by `row_widths`.
    pub fn compute_weights(
        &self,
        grid: &UnstructuredGrid,
        row_widths: impl Iterator<Item = usize>,
    ) -> FlatTable<f64> {
        let mut weights: FlatTable<f64> = FlatTable::from_row_widths(row_widths);
        // Monitor tensor per node; identity until adaptation samples exist.
        let monitor: [f64; 4] = [1.0, 0.0, 0.0, 1.0];

        for n in 0..grid.num_nodes() {
            if grid.node_valence(n) < 2 {
                continue;
            }
            if !matches!(grid.node_types[n], NodeType::Interior | NodeType::Boundary) {
                continue;
            }
            let Some(topology_index) = self.node_topology[n] else {
                continue;
            };
            let topology = &self.topologies[topology_index];
            let num_nodes = topology.num_nodes;
            if num_nodes == 0 {
                continue;
            }

            let jacobian = self.jacobian(grid, n);
            let determinant = jacobian[0] * jacobian[3] - jacobian[1] * jacobian[2];
            if determinant == 0.0 {
                continue;
            }
            // Contravariant base vectors.
            let a1 = [jacobian[3] / determinant, -jacobian[2] / determinant];
            let a2 = [-jacobian[1] / determinant, jacobian[0] / determinant];

            let mut dginv_dxi = [0.0; 4];
            let mut dginv_deta = [0.0; 4];
            for i in 0..num_nodes {
                for c in 0..4 {
                    dginv_dxi[c] += monitor[c] * topology.jxi[i];
                    dginv_deta[c] += monitor[c] * topology.jeta[i];
                }
            }

            let mut gxi_by_divxi = vec![0.0; num_nodes];
            let mut gxi_by_diveta = vec![0.0; num_nodes];
            let mut geta_by_divxi = vec![0.0; num_nodes];
            let mut geta_by_diveta = vec![0.0; num_nodes];
            for i in 0..num_nodes {
                for f in 0..topology.divxi.len() {
                    gxi_by_divxi[i] += topology.gxi[f][i] * topology.divxi[f];
                    gxi_by_diveta[i] += topology.gxi[f][i] * topology.diveta[f];
                    geta_by_divxi[i] += topology.geta[f][i] * topology.divxi[f];
                    geta_by_diveta[i] += topology.geta[f][i] * topology.diveta[f];
                }
            }

            let row = weights.row_mut(n);
            for i in 0..num_nodes {
                row[i] -= matrix_norm(a1, a1, dginv_dxi) * topology.jxi[i]
                    + matrix_norm(a1, a2, dginv_deta) * topology.jxi[i]
                    + matrix_norm(a2, a1, dginv_dxi) * topology.jeta[i]
                    + matrix_norm(a2, a2, dginv_deta) * topology.jeta[i];
                row[i] += matrix_norm(a1, a1, monitor) * gxi_by_divxi[i]
                    + matrix_norm(a1, a2, monitor) * gxi_by_diveta[i]
                    + matrix_norm(a2, a1, monitor) * geta_by_divxi[i]
                    + matrix_norm(a2, a2, monitor) * geta_by_diveta[i];
            }

            // Regularize so every off-diagonal entry is non-negative.
            let mut alpha: f64 = 0.0;
            for i in 1..num_nodes {
                alpha = alpha.max((-row[i]).max(0.0) / topology.ww2[i].max(1.0));
            }
            let mut sum = 0.0;
            for i in 1..num_nodes {
                row[i] += alpha * topology.ww2[i].max(1.0);
                sum += row[i];
            }
            row[0] = -sum;
            for entry in row.iter_mut().take(num_nodes) {
                *entry = -*entry / (-sum + 1e-8);
            }
        }
        weights
    }

    /// Metric Jacobian at a node, rows (d/dxi, d/deta) over (x, y).
    pub fn jacobian(&self, grid: &UnstructuredGrid, node: usize) -> [f64; 4] {
        let mut jacobian = [0.0; 4];
        let Some(topology_index) = self.node_topology[node] else {
            return jacobian;
        };
        let topology = &self.topologies[topology_index];
        let cos_factor = match grid.projection {
            Projection::Cartesian => 1.0,
            Projection::Spherical | Projection::SphericalAccurate => {
                (grid.nodes[node].y * DEG_TO_RAD).cos()
            }
        };
        for i in 0..topology.num_nodes {
            let p = grid.nodes[topology.connected_nodes[i]];
            jacobian[0] += topology.jxi[i] * p.x * cos_factor;
            jacobian[1] += topology.jxi[i] * p.y;
            jacobian[2] += topology.jeta[i] * p.x * cos_factor;
            jacobian[3] += topology.jeta[i] * p.y;
        }
        jacobian
    }

    /// Lay the stencil out in the local (xi, eta) frame.
    ///
    /// Returns `false` when the node was skipped for a degenerate angle
    /// budget; the offending coordinates are recorded in `node_errors`.
    #[allow(clippy::too_many_lines)]
    fn compute_node_xi_eta(
        &mut self,
        grid: &UnstructuredGrid,
        node: usize,
        stencil: &mut NodeStencil,
    ) -> bool {
        let num_shared = stencil.shared_faces.len();
        let num_connected = stencil.connected_nodes.len();
        let mut theta_square = vec![DOUBLE_MISSING; num_connected];
        let mut is_square_face = vec![false; num_shared];

        let mut num_non_stencil_quad: i64 = 0;
        for f in 0..num_shared {
            let edge_index = grid.nodes_edges[node][f];
            let next_node = stencil.connected_nodes[f + 1];
            let face_left = grid.edges_faces[edge_index][0];
            let face_right = if grid.edge_num_faces(edge_index) == 2 {
                grid.edges_faces[edge_index][1]
            } else {
                face_left
            };

            // The neighbor counts as square when every face around it, other
            // than the two bordering this edge, is a quad.
            let mut is_square = true;
            'edges: for &edge in &grid.nodes_edges[next_node] {
                for face in grid.edges_faces[edge].iter().flatten() {
                    if Some(*face) != face_left && Some(*face) != face_right {
                        is_square = is_square && grid.face_num_nodes(*face) == 4;
                    }
                }
                if !is_square {
                    break 'edges;
                }
            }

            let left_face_index = next_circular_backward_index(f, num_shared);
            if is_square {
                match grid.node_types[next_node] {
                    NodeType::Interior | NodeType::Hanging => {
                        num_non_stencil_quad = grid.node_valence(next_node) as i64 - 2;
                        theta_square[f + 1] = (2.0 - num_non_stencil_quad as f64 * 0.5) * PI;
                    }
                    NodeType::Boundary => {
                        num_non_stencil_quad = grid.node_valence(next_node) as i64
                            - 1
                            - grid.edge_num_faces(edge_index) as i64;
                        theta_square[f + 1] = (1.0 - num_non_stencil_quad as f64 * 0.5) * PI;
                    }
                    NodeType::Corner => theta_square[f + 1] = 0.5 * PI,
                }

                if let Some(face) = stencil.shared_faces[f] {
                    if face > 1 && grid.face_num_nodes(face) == 4 {
                        num_non_stencil_quad += 1;
                    }
                }
                if let Some(face) = stencil.shared_faces[left_face_index] {
                    if face > 1 && grid.face_num_nodes(face) == 4 {
                        num_non_stencil_quad += 1;
                    }
                }
                if num_non_stencil_quad > 3 {
                    is_square = false;
                }
            }

            is_square_face[f] = is_square_face[f] || is_square;
            is_square_face[left_face_index] = is_square_face[left_face_index] || is_square;
        }

        // Fourth nodes of adjacent quads default to right angles.
        for f in 0..num_shared {
            let Some(face) = stencil.shared_faces[f] else {
                continue;
            };
            if grid.face_num_nodes(face) == 4 {
                for position in 0..grid.face_num_nodes(face) {
                    let mapped = stencil.face_node_mapping[f][position];
                    if mapped <= num_shared {
                        continue;
                    }
                    theta_square[mapped] = 0.5 * PI;
                }
            }
        }

        // Interior angle budget.
        let mut num_squared_triangles = 0i64;
        let mut num_triangles = 0i64;
        let mut phi_squared_triangles = 0.0;
        let mut phi_triangles = 0.0;
        let mut phi_tot = 0.0;
        for f in 0..num_shared {
            let Some(face) = stencil.shared_faces[f] else {
                continue;
            };
            let num_face_nodes = grid.face_num_nodes(face);
            let mut phi = optimal_edge_angle(num_face_nodes);

            if is_square_face[f] || num_face_nodes == 4 {
                let mut next = f + 2;
                if next > num_shared {
                    next -= num_shared;
                }
                let is_boundary_edge = grid.edge_num_faces(grid.nodes_edges[node][f]) == 1;
                phi = optimal_edge_angle_square(
                    num_face_nodes,
                    theta_square[f + 1],
                    theta_square[next],
                    is_boundary_edge,
                );
                if num_face_nodes == 3 {
                    num_squared_triangles += 1;
                    phi_squared_triangles += phi;
                }
            } else {
                num_triangles += 1;
                phi_triangles += phi;
            }
            phi_tot += phi;
        }

        let factor = match grid.node_types[node] {
            NodeType::Boundary => 0.5,
            NodeType::Corner => 0.25,
            _ => 1.0,
        };
        let mut mu = 1.0;
        let mut mu_squared_triangles = 1.0;
        let mut mu_triangles = 1.0;
        let min_phi = 15.0 / 180.0 * PI;
        if num_triangles > 0 {
            mu_triangles = (factor * 2.0 * PI - (phi_tot - phi_triangles)) / phi_triangles;
            mu_triangles = mu_triangles.max(num_triangles as f64 * min_phi / phi_triangles);
        } else if num_squared_triangles > 0 {
            mu_squared_triangles = (factor * 2.0 * PI - (phi_tot - phi_squared_triangles))
                .max(num_squared_triangles as f64 * min_phi)
                / phi_squared_triangles;
        }

        if phi_tot > 1e-18 {
            mu = factor * 2.0 * PI
                / (phi_tot
                    - (1.0 - mu_triangles) * phi_triangles
                    - (1.0 - mu_squared_triangles) * phi_squared_triangles);
        } else if num_shared > 0 {
            self.node_errors.push(grid.nodes[node]);
            return false;
        }

        // Lay the faces down on the running angle phi0.
        let mut phi0 = 0.0;
        let mut d_phi = 0.0;
        for f in 0..num_shared {
            phi0 += 0.5 * d_phi;
            let Some(face) = stencil.shared_faces[f] else {
                // A hole in the face fan.
                match grid.node_types[node] {
                    NodeType::Boundary => d_phi = PI,
                    NodeType::Corner => d_phi = 1.5 * PI,
                    _ => {
                        self.node_errors.push(grid.nodes[node]);
                        return false;
                    }
                }
                phi0 += 0.5 * d_phi;
                continue;
            };

            let num_face_nodes = grid.face_num_nodes(face);
            if num_face_nodes > MAX_NODES_PER_FACE {
                self.node_errors.push(grid.nodes[node]);
                return false;
            }

            let mut d_phi0 = optimal_edge_angle(num_face_nodes);
            if is_square_face[f] {
                let mut next = f + 2;
                if next > num_shared {
                    next -= num_shared;
                }
                let is_boundary_edge = grid.edge_num_faces(grid.nodes_edges[node][f]) == 1;
                d_phi0 = optimal_edge_angle_square(
                    num_face_nodes,
                    theta_square[f + 1],
                    theta_square[next],
                    is_boundary_edge,
                );
                if num_face_nodes == 3 {
                    d_phi0 *= mu_squared_triangles;
                }
            } else if num_face_nodes == 3 {
                d_phi0 *= mu_triangles;
            }

            d_phi = mu * d_phi0;
            phi0 += 0.5 * d_phi;

            let node_index = grid.faces_nodes[face]
                .iter()
                .position(|&v| v == node)
                .unwrap_or(0);
            let mut d_theta = 2.0 * PI / num_face_nodes as f64;

            // Face orientation, needed for folded cells.
            let previous_node = next_circular_forward_index(node_index, num_face_nodes);
            let next_node = next_circular_backward_index(node_index, num_face_nodes);
            let mapping_diff = stencil.face_node_mapping[f][next_node] as i64
                - stencil.face_node_mapping[f][previous_node] as i64;
            if mapping_diff == -1 || mapping_diff == grid.node_valence(node) as i64 {
                d_theta = -d_theta;
            }

            let aspect = (1.0 - d_theta.cos()) / d_theta.abs().sin() * (0.5 * d_phi).tan();
            let radius = (0.5 * d_phi).cos() / (1.0 - d_theta.cos());

            for position in 0..num_face_nodes {
                let theta = d_theta * (position as f64 - node_index as f64);
                let xip = radius - radius * theta.cos();
                let ethap = -radius * theta.sin();
                let mapped = stencil.face_node_mapping[f][position];
                stencil.xi[mapped] = xip * phi0.cos() - aspect * ethap * phi0.sin();
                stencil.eta[mapped] = xip * phi0.sin() + aspect * ethap * phi0.cos();
            }
        }
        true
    }

    /// Map the node onto a matching topology class, creating one if needed.
    fn save_topology_if_needed(&mut self, node: usize, stencil: NodeStencil) {
        let key = (stencil.shared_faces.len(), stencil.connected_nodes.len());
        if let Some(candidates) = self.buckets.get(&key) {
            'candidates: for &topology_index in candidates {
                let topology = &self.topologies[topology_index];
                for i in 1..stencil.connected_nodes.len() {
                    let theta_local = stencil.eta[i].atan2(stencil.xi[i]);
                    let theta_topology = topology.eta[i].atan2(topology.xi[i]);
                    if (theta_local - theta_topology).abs() > THETA_TOLERANCE {
                        continue 'candidates;
                    }
                }
                self.node_topology[node] = Some(topology_index);
                return;
            }
        }

        let topology_index = self.topologies.len();
        self.topologies.push(Topology {
            num_faces: stencil.shared_faces.len(),
            num_nodes: stencil.connected_nodes.len(),
            shared_faces: stencil.shared_faces,
            connected_nodes: stencil.connected_nodes,
            face_node_mapping: stencil.face_node_mapping,
            xi: stencil.xi,
            eta: stencil.eta,
            ..Topology::default()
        });
        self.buckets.entry(key).or_default().push(topology_index);
        self.node_topology[node] = Some(topology_index);
    }
}

/// Collect the shared faces and connected nodes around `node`, walking the
/// edge fan in its stored counter-clockwise order.
fn node_administration(grid: &UnstructuredGrid, node: usize) -> NodeStencil {
    let mut stencil = NodeStencil::default();
    let valence = grid.node_valence(node);
    if valence < 2 {
        return stencil;
    }

    let mut new_face: Option<usize> = None;
    for e in 0..valence {
        let first_edge = grid.nodes_edges[node][e];
        let second_edge = grid.nodes_edges[node][(e + 1) % valence];
        if grid.edge_num_faces(first_edge) < 1 || grid.edge_num_faces(second_edge) < 1 {
            continue;
        }

        let first_faces = grid.edges_faces[first_edge];
        let second_faces = grid.edges_faces[second_edge];
        let first_last = if grid.edge_num_faces(first_edge) == 2 {
            first_faces[1]
        } else {
            first_faces[0]
        };
        let second_last = if grid.edge_num_faces(second_edge) == 2 {
            second_faces[1]
        } else {
            second_faces[0]
        };

        new_face = if first_faces[0] != new_face
            && (first_faces[0] == second_faces[0] || first_faces[0] == second_last)
        {
            first_faces[0]
        } else if first_last != new_face
            && (first_last == second_faces[0] || first_last == second_last)
        {
            first_last
        } else {
            None
        };

        // A valence-2 corner would otherwise record its single face twice.
        if valence == 2
            && e == 1
            && grid.node_types[node] == NodeType::Corner
            && stencil.shared_faces.first() == Some(&new_face)
        {
            new_face = None;
        }
        stencil.shared_faces.push(new_face);
    }

    if stencil.shared_faces.is_empty() {
        return stencil;
    }

    // Slot 0 is the node itself, then its edge neighbors in fan order.
    stencil.connected_nodes.push(node);
    for e in 0..valence {
        let edge = grid.edges[grid.nodes_edges[node][e]];
        stencil.connected_nodes.push(edge.other_node(node));
    }

    // Walk each shared face from the node and append unseen face nodes.
    stencil.face_node_mapping = vec![Vec::new(); stencil.shared_faces.len()];
    for f in 0..stencil.shared_faces.len() {
        let Some(face) = stencil.shared_faces[f] else {
            continue;
        };
        let num_face_nodes = grid.face_num_nodes(face);
        stencil.face_node_mapping[f] = vec![0; num_face_nodes];
        let start = grid.faces_nodes[face]
            .iter()
            .position(|&v| v == node)
            .unwrap_or(0);

        let mut face_node_index = start;
        for _ in 0..num_face_nodes {
            if face_node_index >= num_face_nodes {
                face_node_index -= num_face_nodes;
            }
            let face_node = grid.faces_nodes[face][face_node_index];
            if let Some(position) = stencil
                .connected_nodes
                .iter()
                .position(|&v| v == face_node)
            {
                stencil.face_node_mapping[f][face_node_index] = position;
            } else {
                stencil.connected_nodes.push(face_node);
                stencil.face_node_mapping[f][face_node_index] = stencil.connected_nodes.len() - 1;
            }
            face_node_index += 1;
        }
    }
    stencil
}

/// Size the operator tables of a topology class, zeroed.
fn allocate_operators(topology: &mut Topology) {
    let faces = topology.num_faces;
    let nodes = topology.num_nodes;
    topology.az = vec![vec![0.0; nodes]; faces];
    topology.gxi = vec![vec![0.0; nodes]; faces];
    topology.geta = vec![vec![0.0; nodes]; faces];
    topology.divxi = vec![0.0; faces];
    topology.diveta = vec![0.0; faces];
    topology.jxi = vec![0.0; nodes];
    topology.jeta = vec![0.0; nodes];
    topology.ww2 = vec![0.0; nodes];
}

/// Assemble the operators of one topology class at its representative node.
#[allow(clippy::too_many_lines)]
fn compute_topology_operators(
    grid: &UnstructuredGrid,
    node: usize,
    topology: &mut Topology,
) -> OrthogonalizeResult<()> {
    let num_faces = topology.num_faces;
    let num_nodes = topology.num_nodes;

    // Face centers as combinations of the stencil nodes.
    for f in 0..num_faces {
        let Some(face) = topology.shared_faces[f] else {
            continue;
        };
        if grid.node_types[node] == NodeType::Corner {
            continue;
        }

        let edge_left = f + 1;
        let mut edge_right = edge_left + 1;
        if edge_right > num_faces {
            edge_right -= num_faces;
        }
        let xi_left = topology.xi[edge_left];
        let xi_right = topology.xi[edge_right];
        let eta_left = topology.eta[edge_left];
        let eta_right = topology.eta[edge_right];
        let left_length = (xi_left * xi_left + eta_left * eta_left + 1e-16).sqrt();
        let right_length = (xi_right * xi_right + eta_right * eta_right + 1e-16).sqrt();
        let cos_phi = (xi_left * xi_right + eta_left * eta_right) / (left_length * right_length);

        let num_face_nodes = grid.face_num_nodes(face);
        if num_face_nodes == 3 {
            // The two face nodes adjacent to the stencil node weigh in by the
            // angle between their stencil directions.
            let node_index = grid.faces_nodes[face]
                .iter()
                .position(|&v| v == node)
                .unwrap_or(0);
            let node_left = next_circular_backward_index(node_index, num_face_nodes);
            let node_right = next_circular_forward_index(node_index, num_face_nodes);

            let alpha = 1.0 / (1.0 - cos_phi * cos_phi + 1e-8);
            let alpha_left = 0.5 * (1.0 - left_length / right_length * cos_phi) * alpha;
            let alpha_right = 0.5 * (1.0 - right_length / left_length * cos_phi) * alpha;

            topology.az[f][topology.face_node_mapping[f][node_index]] =
                1.0 - (alpha_left + alpha_right);
            topology.az[f][topology.face_node_mapping[f][node_left]] = alpha_left;
            topology.az[f][topology.face_node_mapping[f][node_right]] = alpha_right;
        } else {
            for position in 0..topology.face_node_mapping[f].len() {
                topology.az[f][topology.face_node_mapping[f][position]] =
                    1.0 / num_face_nodes as f64;
            }
        }
    }

    // Edge gradients and divergences.
    let mut xis = vec![0.0; num_faces];
    let mut etas = vec![0.0; num_faces];
    for f in 0..num_faces.min(grid.node_valence(node)) {
        let edge_index = grid.nodes_edges[node][f];
        let xi_one = topology.xi[f + 1];
        let eta_one = topology.eta[f + 1];

        let mut left_right_swap = 1.0;
        let mut left_xi = 0.0;
        let mut left_eta = 0.0;
        let mut right_xi = 0.0;
        let mut right_eta = 0.0;
        let mut alpha_x = 0.0;
        let mut xi_boundary = 0.0;
        let mut eta_boundary = 0.0;
        let face_left_index;
        let mut face_right_index = 0;

        if grid.edge_num_faces(edge_index) == 1 {
            let Some(left_face) = grid.edges_faces[edge_index][0] else {
                return Err(OrthogonalizeError::InconsistentStencil { node });
            };
            face_left_index = topology
                .shared_faces
                .iter()
                .position(|&shared| shared == Some(left_face))
                .ok_or(OrthogonalizeError::InconsistentStencil { node })?;

            // The boundary sits at the left when the fan and face orders differ.
            if f != face_left_index {
                left_right_swap = -1.0;
            }

            for i in 0..num_nodes {
                left_xi += topology.xi[i] * topology.az[face_left_index][i];
                left_eta += topology.eta[i] * topology.az[face_left_index][i];
            }

            // Mirror the face center across the boundary edge.
            let mut alpha = left_xi * xi_one + left_eta * eta_one;
            alpha /= xi_one * xi_one + eta_one * eta_one;
            alpha_x = alpha;
            xi_boundary = alpha * xi_one;
            eta_boundary = alpha * eta_one;
            right_xi = 2.0 * xi_boundary - left_xi;
            right_eta = 2.0 * eta_boundary - left_eta;
        } else {
            face_left_index = f;
            face_right_index = next_circular_backward_index(face_left_index, num_faces);

            let face_left = topology.shared_faces[face_left_index];
            let face_right = topology.shared_faces[face_right_index];
            let edge_faces = grid.edges_faces[edge_index];
            if (face_left != edge_faces[0] && face_left != edge_faces[1])
                || (face_right != edge_faces[0] && face_right != edge_faces[1])
            {
                return Err(OrthogonalizeError::InconsistentStencil { node });
            }

            for i in 0..num_nodes {
                left_xi += topology.xi[i] * topology.az[face_left_index][i];
                left_eta += topology.eta[i] * topology.az[face_left_index][i];
                right_xi += topology.xi[i] * topology.az[face_right_index][i];
                right_eta += topology.eta[i] * topology.az[face_right_index][i];
            }
        }

        xis[f] = 0.5 * (left_xi + right_xi);
        etas[f] = 0.5 * (left_eta + right_eta);

        let exi_lr = right_xi - left_xi;
        let eeta_lr = right_eta - left_eta;
        let exi01 = xi_one;
        let eeta01 = eta_one;

        let fac = 1.0 / (exi01 * eeta_lr - eeta01 * exi_lr + 1e-16).abs();
        let mut facxi1 = -eeta_lr * fac * left_right_swap;
        let mut facxi0 = -facxi1;
        let mut faceta1 = exi_lr * fac * left_right_swap;
        let mut faceta0 = -faceta1;
        let facxi_r = eeta01 * fac * left_right_swap;
        let mut facxi_l = -facxi_r;
        let faceta_r = -exi01 * fac * left_right_swap;
        let mut faceta_l = -faceta_r;

        if grid.edge_num_faces(edge_index) == 1 {
            // The reflected ghost center folds back into the stencil nodes.
            facxi1 += -facxi_l * 2.0 * alpha_x;
            facxi0 += -facxi_l * 2.0 * (1.0 - alpha_x);
            facxi_l *= 2.0;
            faceta1 += -faceta_l * 2.0 * alpha_x;
            faceta0 += -faceta_l * 2.0 * (1.0 - alpha_x);
            faceta_l *= 2.0;
        }

        let node1 = f + 1;
        let node0 = 0;
        for i in 0..num_nodes {
            topology.gxi[f][i] = facxi_l * topology.az[face_left_index][i];
            topology.geta[f][i] = faceta_l * topology.az[face_left_index][i];
            if grid.edge_num_faces(edge_index) == 2 {
                topology.gxi[f][i] += facxi_r * topology.az[face_right_index][i];
                topology.geta[f][i] += faceta_r * topology.az[face_right_index][i];
            }
        }
        topology.gxi[f][node1] += facxi1;
        topology.geta[f][node1] += faceta1;
        topology.gxi[f][node0] += facxi0;
        topology.geta[f][node0] += faceta0;

        topology.divxi[f] = -eeta_lr * left_right_swap;
        topology.diveta[f] = exi_lr * left_right_swap;
        if grid.edge_num_faces(edge_index) == 1 {
            topology.divxi[f] = 0.5 * topology.divxi[f] + eta_boundary * left_right_swap;
            topology.diveta[f] = 0.5 * topology.diveta[f] - xi_boundary * left_right_swap;
        }
    }

    // Normalize the divergences by the stencil volume.
    let mut volxi = 0.0;
    for f in 0..num_faces {
        volxi += 0.5 * (topology.divxi[f] * xis[f] + topology.diveta[f] * etas[f]);
    }
    if volxi == 0.0 {
        volxi = 1.0;
    }
    for f in 0..num_faces {
        topology.divxi[f] /= volxi;
        topology.diveta[f] /= volxi;
    }

    // Node-to-node Jacobian rows.
    for f in 0..num_faces.min(grid.node_valence(node)) {
        if grid.edge_num_faces(grid.nodes_edges[node][f]) == 2 {
            let right_face = next_circular_backward_index(f, num_faces);
            for i in 0..num_nodes {
                topology.jxi[i] += topology.divxi[f]
                    * 0.5
                    * (topology.az[f][i] + topology.az[right_face][i]);
                topology.jeta[i] += topology.diveta[f]
                    * 0.5
                    * (topology.az[f][i] + topology.az[right_face][i]);
            }
        } else {
            topology.jxi[0] += topology.divxi[f] * 0.5;
            topology.jxi[f + 1] += topology.divxi[f] * 0.5;
            topology.jeta[0] += topology.diveta[f] * 0.5;
            topology.jeta[f + 1] += topology.diveta[f] * 0.5;
        }
    }

    // Reference Laplacian stencil.
    for f in 0..num_faces {
        for i in 0..num_nodes {
            topology.ww2[i] +=
                topology.divxi[f] * topology.gxi[f][i] + topology.diveta[f] * topology.geta[f][i];
        }
    }

    Ok(())
}

/// The interior angle of a regular face with `num_face_nodes` corners.
fn optimal_edge_angle(num_face_nodes: usize) -> f64 {
    PI * (1.0 - 2.0 / num_face_nodes as f64)
}

/// The interior angle of a square-classified face between two stencil
/// directions with target corner angles `theta1` and `theta2`.
fn optimal_edge_angle_square(
    num_face_nodes: usize,
    theta1: f64,
    theta2: f64,
    is_boundary_edge: bool,
) -> f64 {
    if num_face_nodes != 3 {
        return optimal_edge_angle(num_face_nodes);
    }
    if (theta1 + theta2 - PI).abs() < 1e-12 && !is_boundary_edge {
        0.5 * PI
    } else {
        0.25 * PI
    }
}

/// Bilinear form (M x) . y for a row-major 2x2 matrix.
fn matrix_norm(x: [f64; 2], y: [f64; 2], m: [f64; 4]) -> f64 {
    (m[0] * x[0] + m[1] * x[1]) * y[0] + (m[2] * x[0] + m[3] * x[1]) * y[1]
}
