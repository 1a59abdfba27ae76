//! The orthogonalization driver: iteration nesting, the compressed linear
//! system and the relaxed Gauss-Seidel sweep.

use nalgebra::Matrix3;
use rayon::prelude::*;
use tracing::debug;

use grid_types::constants::{DEG_TO_RAD, EARTH_RADIUS};
use grid_types::ops::{
    cartesian3d_to_spherical, distance_from_line, spherical_local_bases, spherical_to_cartesian3d,
};
use grid_types::{LandBoundaries, NodeType, Point, Polygon, Projection, UnstructuredGrid};

use crate::error::{OrthogonalizeError, OrthogonalizeResult};
use crate::params::OrthogonalizationParams;
use crate::smoother::Smoother;
use crate::table::FlatTable;
use crate::{aspect_ratio, orthogonalizer};

/// Under-relaxation of the Gauss-Seidel node update.
const RELAXATION_FACTOR: f64 = 0.75;

/// Orthogonalization engine state.
///
/// The engine owns every solver cache; the grid is borrowed by the stepping
/// entry points and only its node coordinates are rewritten. `set` snapshots
/// the node positions for boundary reprojection; that snapshot is never
/// touched afterwards.
#[derive(Debug, Default)]
pub struct Orthogonalization {
    params: OrthogonalizationParams,

    /// Per-node neighbor ids, aligned with the node's edge fan.
    nodes_nodes: FlatTable<usize>,
    /// Orthogonalizer weights per neighbor slot.
    w_orth: FlatTable<f64>,
    /// Orthogonalizer right-hand side per node.
    rhs_orth: Vec<[f64; 2]>,
    /// Per-edge aspect ratios.
    aspect_ratios: Vec<f64>,
    smoother: Smoother,
    /// Smoother stencil weights per node.
    w_smoother: FlatTable<f64>,

    /// Smoother ramp coefficient and its cap.
    mu: f64,
    mu_max: f64,

    /// Node positions at `set` time; the reprojection target.
    original_nodes: Vec<Point>,
    /// Staging buffer of the inner sweep.
    orthogonal_coordinates: Vec<Point>,
    /// Per boundary node, the original node it is currently anchored to.
    nearest_points: Vec<usize>,

    land_boundaries: LandBoundaries,

    /// Skip circumcenter recomputation between outer iterations.
    pub keep_circumcenters_and_mass_centers: bool,

    // Compressed linear system, rebuilt each outer iteration.
    cmp_rhs: Vec<f64>,
    cmp_end_index: Vec<usize>,
    cmp_start_index: Vec<usize>,
    cmp_nodes_nodes: Vec<usize>,
    cmp_weight_x: Vec<f64>,
    cmp_weight_y: Vec<f64>,

    /// Local displacement table of the high-accuracy spherical sweep.
    /// Allocated zeroed; the recomputation hook is a reserved no-op, so the
    /// high-accuracy path holds its nodes still.
    local_coordinates: FlatTable<Point>,
}

impl Orthogonalization {
    /// Create an engine with default parameters; `set` must run before any
    /// iteration entry point.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Coordinates of nodes skipped for geometric degeneracies during the
    /// last preparation.
    #[must_use]
    pub fn node_errors(&self) -> &[Point] {
        self.smoother.node_errors.as_slice()
    }

    /// Bind the engine to a grid: validate the configuration, freeze nodes
    /// outside the polygon selection, snapshot the boundary, and administer
    /// the land boundaries.
    ///
    /// # Errors
    ///
    /// Fails on an empty grid or out-of-range parameters.
    pub fn set(
        &mut self,
        grid: &mut UnstructuredGrid,
        params: OrthogonalizationParams,
        polygons: &[Polygon],
        land_boundary_points: &[Point],
    ) -> OrthogonalizeResult<()> {
        params.validate()?;
        if grid.num_nodes() == 0 {
            return Err(OrthogonalizeError::EmptyGrid);
        }
        self.params = params;

        // Nodes outside the selection become corners and never move.
        let mask = grid.mask_nodes_in_polygons(polygons, true);
        for (n, &selected) in mask.iter().enumerate() {
            if !selected {
                grid.node_types[n] = NodeType::Corner;
            }
        }

        self.nodes_nodes =
            FlatTable::from_row_widths((0..grid.num_nodes()).map(|n| grid.node_valence(n)));
        for n in 0..grid.num_nodes() {
            for (k, &e) in grid.nodes_edges[n].iter().enumerate() {
                self.nodes_nodes.row_mut(n)[k] = grid.edges[e].other_node(n);
            }
        }

        self.mu_max = (1.0 - self.params.areal_to_angle_smoothing_factor) * 0.5;
        self.mu = 1e-2_f64.min(self.mu_max);

        self.orthogonal_coordinates = grid.nodes.clone();
        self.nearest_points = (0..grid.num_nodes()).collect();
        self.original_nodes = grid.nodes.clone();

        self.land_boundaries = LandBoundaries::new(land_boundary_points);
        if self.params.project_to_land_boundary_option >= 1 && !self.land_boundaries.is_empty() {
            self.land_boundaries.administrate(grid);
            self.land_boundaries.find_nearest_mesh_boundary(grid);
        }

        if grid.projection == Projection::SphericalAccurate {
            if self.params.orthogonalization_to_smoothing_factor < 1.0 {
                self.prepare_outer_iteration(grid)?;
            }
            let smoother = &self.smoother;
            self.local_coordinates = FlatTable::from_row_widths(
                (0..grid.num_nodes())
                    .map(|n| (grid.node_valence(n) + 1).max(smoother.num_connected_nodes[n])),
            );
        }

        Ok(())
    }

    /// Run the full outer/boundary/inner iteration and release the
    /// compressed system.
    ///
    /// # Errors
    ///
    /// Propagates the first stage failure; the compressed system is released
    /// either way.
    pub fn compute(&mut self, grid: &mut UnstructuredGrid) -> OrthogonalizeResult<()> {
        let result = self.iterate(grid);
        self.deallocate();
        result
    }

    fn iterate(&mut self, grid: &mut UnstructuredGrid) -> OrthogonalizeResult<()> {
        for outer in 0..self.params.outer_iterations {
            debug!(outer, "outer iteration");
            self.prepare_outer_iteration(grid)?;
            for _boundary in 0..self.params.boundary_iterations {
                for _inner in 0..self.params.inner_iterations {
                    self.inner_iteration(grid)?;
                }
            }
            self.finalize_outer_iteration(grid)?;
        }
        Ok(())
    }

    /// Rebuild every weight table and the compressed linear system.
    ///
    /// # Errors
    ///
    /// Fails when a node's stencil is inconsistent with the grid.
    pub fn prepare_outer_iteration(&mut self, grid: &UnstructuredGrid) -> OrthogonalizeResult<()> {
        self.aspect_ratios = aspect_ratio::compute_aspect_ratios(grid);
        let (w_orth, rhs_orth) =
            orthogonalizer::compute_weights_and_rhs(grid, &self.nodes_nodes, &self.aspect_ratios);
        self.w_orth = w_orth;
        self.rhs_orth = rhs_orth;

        self.compute_local_coordinates(grid);

        self.smoother.compute_topologies(grid)?;
        self.smoother.compute_operators(grid)?;
        debug!(
            topologies = self.smoother.topologies.len(),
            skipped = self.smoother.node_errors.len(),
            "smoother operators ready"
        );

        let widths: Vec<usize> = (0..grid.num_nodes())
            .map(|n| (grid.node_valence(n) + 1).max(self.smoother.num_connected_nodes[n]))
            .collect();
        self.w_smoother = self.smoother.compute_weights(grid, widths.iter().copied());

        self.allocate_linear_system(grid, &widths);
        self.compose_linear_system_terms(grid);
        Ok(())
    }

    /// One relaxation sweep over all nodes, then boundary reprojection and
    /// the optional land snap.
    ///
    /// # Errors
    ///
    /// Fails when a boundary node loses its reprojection anchor.
    pub fn inner_iteration(&mut self, grid: &mut UnstructuredGrid) -> OrthogonalizeResult<()> {
        // Per-node writes are disjoint; the bulk commit below makes the sweep
        // Jacobi-like between iterations.
        let solver = &*self;
        let grid_ref: &UnstructuredGrid = grid;
        let updated: Vec<Point> = (0..grid_ref.num_nodes())
            .into_par_iter()
            .map(|n| solver.updated_node_position(n, grid_ref))
            .collect();
        self.orthogonal_coordinates = updated;
        grid.nodes.clone_from(&self.orthogonal_coordinates);

        self.project_on_original_mesh_boundary(grid)?;
        self.compute_local_coordinates(grid);

        if self.params.project_to_land_boundary_option >= 1 && !self.land_boundaries.is_empty() {
            self.land_boundaries.snap_mesh_to_land_boundaries(grid);
        }
        Ok(())
    }

    /// Ramp the smoother coefficient and refresh the face geometry.
    ///
    /// # Errors
    ///
    /// Propagates the circumcenter recomputation failure.
    pub fn finalize_outer_iteration(
        &mut self,
        grid: &mut UnstructuredGrid,
    ) -> OrthogonalizeResult<()> {
        self.mu = (2.0 * self.mu).min(self.mu_max);
        if !self.keep_circumcenters_and_mass_centers {
            grid.compute_face_circumcenters_mass_centers_and_areas()?;
        }
        Ok(())
    }

    /// Release the compressed linear system.
    pub fn deallocate(&mut self) {
        self.cmp_rhs.clear();
        self.cmp_end_index.clear();
        self.cmp_start_index.clear();
        self.cmp_nodes_nodes.clear();
        self.cmp_weight_x.clear();
        self.cmp_weight_y.clear();
    }

    fn allocate_linear_system(&mut self, grid: &UnstructuredGrid, widths: &[usize]) {
        if !self.cmp_end_index.is_empty() {
            return;
        }
        self.cmp_rhs = vec![0.0; grid.num_nodes() * 2];
        self.cmp_end_index = Vec::with_capacity(grid.num_nodes());
        self.cmp_start_index = Vec::with_capacity(grid.num_nodes());
        let mut cache_size = 0;
        for &width in widths {
            self.cmp_end_index.push(cache_size);
            cache_size += width;
            self.cmp_start_index.push(cache_size);
        }
        self.cmp_nodes_nodes = vec![0; cache_size];
        self.cmp_weight_x = vec![0.0; cache_size];
        self.cmp_weight_y = vec![0.0; cache_size];
    }

    /// Convex-combine the orthogonalizer and smoother weights per node.
    fn compose_linear_system_terms(&mut self, grid: &UnstructuredGrid) {
        let atpf = self.params.orthogonalization_to_smoothing_factor;
        let max_atpf = self
            .params
            .orthogonalization_to_smoothing_factor_boundary
            .max(atpf);

        for n in 0..grid.num_nodes() {
            let valence = grid.node_valence(n);
            if !matches!(grid.node_types[n], NodeType::Interior | NodeType::Boundary)
                || valence < 2
            {
                continue;
            }
            // With frozen face geometry only tri- and uni-valent nodes move.
            if self.keep_circumcenters_and_mass_centers && valence != 3 && valence != 1 {
                continue;
            }

            let atpf_local = if grid.node_types[n] == NodeType::Boundary {
                max_atpf
            } else {
                atpf
            };
            let atpf_complement = 1.0 - atpf_local;

            let width = self.cmp_start_index[n] - self.cmp_end_index[n];
            for nn in 1..width {
                let cache_index = self.cmp_end_index[n] + nn - 1;
                let mut weight = 0.0;

                if atpf_complement > 0.0 && grid.node_types[n] == NodeType::Interior {
                    weight = atpf_complement * self.w_smoother.row(n)[nn];
                }

                if nn < valence + 1 {
                    weight += atpf_local * self.w_orth.row(n)[nn - 1];
                    self.cmp_nodes_nodes[cache_index] = self.nodes_nodes.row(n)[nn - 1];
                } else {
                    self.cmp_nodes_nodes[cache_index] = self.smoother.connected_nodes[n][nn];
                }

                self.cmp_weight_x[cache_index] = weight;
                self.cmp_weight_y[cache_index] = weight;
            }

            self.cmp_rhs[2 * n] = atpf_local * self.rhs_orth[n][0];
            self.cmp_rhs[2 * n + 1] = atpf_local * self.rhs_orth[n][1];
        }
    }

    /// The relaxed update of a single node; immovable or degenerate nodes
    /// keep their staged position.
    fn updated_node_position(&self, n: usize, grid: &UnstructuredGrid) -> Point {
        if self.cmp_end_index.is_empty() {
            return self.orthogonal_coordinates[n];
        }
        let width = self.cmp_start_index[n] - self.cmp_end_index[n];
        let mut dx0 = 0.0;
        let mut dy0 = 0.0;
        let mut increments = [0.0; 2];
        for nn in 1..width {
            let cache_index = self.cmp_end_index[n] + nn - 1;
            self.local_increments(
                self.cmp_weight_x[cache_index],
                self.cmp_weight_y[cache_index],
                self.cmp_nodes_nodes[cache_index],
                nn,
                n,
                grid,
                &mut dx0,
                &mut dy0,
                &mut increments,
            );
        }

        if increments[0] <= 1e-8 || increments[1] <= 1e-8 {
            return self.orthogonal_coordinates[n];
        }

        dx0 = (dx0 + self.cmp_rhs[2 * n]) / increments[0];
        dy0 = (dy0 + self.cmp_rhs[2 * n + 1]) / increments[1];

        let node = grid.nodes[n];
        match grid.projection {
            Projection::Cartesian | Projection::Spherical => {
                let relaxed = 1.0 - RELAXATION_FACTOR;
                Point::new(
                    RELAXATION_FACTOR * (node.x + dx0) + relaxed * node.x,
                    RELAXATION_FACTOR * (node.y + dy0) + relaxed * node.y,
                )
            }
            Projection::SphericalAccurate => {
                // Rotate the local displacement into the fixed frame.
                let local = Point::new(RELAXATION_FACTOR * dx0, RELAXATION_FACTOR * dy0);
                let (radial, east, north) = spherical_local_bases(node);
                let rotation = Matrix3::from_columns(&[radial, east, north]);
                let transformed = rotation * spherical_to_cartesian3d(local);
                cartesian3d_to_spherical(transformed, node.x)
            }
        }
    }

    /// Accumulate one neighbor's contribution to the node increment.
    #[allow(clippy::too_many_arguments)]
    fn local_increments(
        &self,
        weight_x: f64,
        weight_y: f64,
        neighbor: usize,
        slot: usize,
        n: usize,
        grid: &UnstructuredGrid,
        dx0: &mut f64,
        dy0: &mut f64,
        increments: &mut [f64; 2],
    ) {
        let node = grid.nodes[n];
        let other = grid.nodes[neighbor];
        let (weight_x_transformed, weight_y_transformed) = match grid.projection {
            Projection::Cartesian => {
                *dx0 += weight_x * (other.x - node.x);
                *dy0 += weight_y * (other.y - node.y);
                (weight_x, weight_y)
            }
            Projection::Spherical => {
                let wx = weight_x
                    * EARTH_RADIUS
                    * DEG_TO_RAD
                    * (0.5 * (other.y + node.y) * DEG_TO_RAD).cos();
                let wy = weight_y * EARTH_RADIUS * DEG_TO_RAD;
                *dx0 += wx * (other.x - node.x);
                *dy0 += wy * (other.y - node.y);
                (wx, wy)
            }
            Projection::SphericalAccurate => {
                let wx = weight_x * EARTH_RADIUS * DEG_TO_RAD;
                let wy = weight_y * EARTH_RADIUS * DEG_TO_RAD;
                let local = self.local_coordinates.row(n)[slot - 1];
                *dx0 += wx * local.x;
                *dy0 += wy * local.y;
                (wx, wy)
            }
        };
        increments[0] += weight_x_transformed;
        increments[1] += weight_y_transformed;
    }

    /// Pull every moved boundary node back onto the original boundary
    /// polyline, advancing its anchor when it crosses a segment midpoint.
    fn project_on_original_mesh_boundary(
        &mut self,
        grid: &mut UnstructuredGrid,
    ) -> OrthogonalizeResult<()> {
        for n in 0..grid.num_nodes() {
            let nearest = self.nearest_points[n];
            if grid.node_types[n] != NodeType::Boundary
                || grid.node_valence(n) == 0
                || grid.node_valence(nearest) == 0
            {
                continue;
            }

            let mut left_node = None;
            let mut right_node = None;
            for &edge_index in &grid.nodes_edges[nearest] {
                if grid.edge_num_faces(edge_index) != 1 {
                    continue;
                }
                let other = grid.edges[edge_index].other_node(nearest);
                if left_node.is_none() {
                    left_node = Some(other);
                } else if right_node.is_none() {
                    right_node = Some(other);
                }
            }
            let (Some(left_node), Some(right_node)) = (left_node, right_node) else {
                return Err(OrthogonalizeError::MissingBoundaryNeighbor { node: n });
            };

            let moved = grid.nodes[n];
            let anchor = self.original_nodes[nearest];
            let to_left = distance_from_line(
                moved,
                anchor,
                self.original_nodes[left_node],
                grid.projection,
            );
            let to_right = distance_from_line(
                moved,
                anchor,
                self.original_nodes[right_node],
                grid.projection,
            );

            if to_left.distance < to_right.distance {
                grid.nodes[n] = to_left.point;
                if to_left.ratio > 0.5 && grid.node_types[n] != NodeType::Corner {
                    self.nearest_points[n] = left_node;
                }
            } else {
                grid.nodes[n] = to_right.point;
                if to_right.ratio > 0.5 && grid.node_types[n] != NodeType::Corner {
                    self.nearest_points[n] = right_node;
                }
            }
        }
        Ok(())
    }

    /// Refresh the local displacement table of the high-accuracy spherical
    /// path. Reserved; the table stays zeroed.
    #[allow(clippy::unused_self)]
    fn compute_local_coordinates(&mut self, _grid: &UnstructuredGrid) {}
}
