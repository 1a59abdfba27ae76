//! Geometric constants shared across the grid crates.

/// Earth radius in meters (WGS84 equatorial).
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Degrees to radians.
pub const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// Sentinel for an absent floating point value.
pub const DOUBLE_MISSING: f64 = -999.0;

/// Faces smaller than this area are considered degenerate.
pub const MIN_CELL_AREA: f64 = 1e-12;

/// Floor for squared edge lengths in ghost-center reflections.
pub const MIN_EDGE_LENGTH_SQUARED: f64 = 1e-4;

/// Upper bound on node valence the solver caches are sized for.
pub const MAX_EDGES_PER_NODE: usize = 12;

/// Upper bound on the number of nodes a single face may carry.
pub const MAX_NODES_PER_FACE: usize = 8;

/// Upper bound on the size of a node's connected-node stencil.
pub const MAX_CONNECTED_NODES: usize = 4 * MAX_EDGES_PER_NODE;
