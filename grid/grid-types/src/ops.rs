//! Projection-aware geometric primitives.
//!
//! All functions are pure. Spherical inputs are longitude/latitude in
//! degrees; deltas and distances come back in meters. Divisions that could
//! degenerate are guarded by explicit epsilons rather than error paths.

use nalgebra::Vector3;

use crate::constants::{DEG_TO_RAD, DOUBLE_MISSING, EARTH_RADIUS};
use crate::point::Point;
use crate::projection::Projection;

/// East-west delta from `a` to `b`, in projection units (meters when
/// spherical). Longitude differences are wrapped into (-180, 180].
#[must_use]
pub fn get_dx(a: Point, b: Point, projection: Projection) -> f64 {
    match projection {
        Projection::Cartesian => b.x - a.x,
        Projection::Spherical | Projection::SphericalAccurate => {
            let mut dx = b.x - a.x;
            if dx > 180.0 {
                dx -= 360.0;
            } else if dx < -180.0 {
                dx += 360.0;
            }
            dx * DEG_TO_RAD * EARTH_RADIUS * (0.5 * (a.y + b.y) * DEG_TO_RAD).cos()
        }
    }
}

/// North-south delta from `a` to `b`, in projection units.
#[must_use]
pub fn get_dy(a: Point, b: Point, projection: Projection) -> f64 {
    match projection {
        Projection::Cartesian => b.y - a.y,
        Projection::Spherical | Projection::SphericalAccurate => {
            (b.y - a.y) * DEG_TO_RAD * EARTH_RADIUS
        }
    }
}

/// Squared distance between two points.
#[must_use]
pub fn squared_distance(a: Point, b: Point, projection: Projection) -> f64 {
    if !a.is_valid() || !b.is_valid() {
        return 0.0;
    }
    match projection {
        Projection::SphericalAccurate => {
            (spherical_to_cartesian3d(b) - spherical_to_cartesian3d(a)).norm_squared()
        }
        _ => {
            let dx = get_dx(a, b, projection);
            let dy = get_dy(a, b, projection);
            dx * dx + dy * dy
        }
    }
}

/// Distance between two points.
#[must_use]
pub fn distance(a: Point, b: Point, projection: Projection) -> f64 {
    squared_distance(a, b, projection).sqrt()
}

/// Inner product of the directed segments `a->b` and `c->d`.
#[must_use]
pub fn inner_product_two_segments(
    a: Point,
    b: Point,
    c: Point,
    d: Point,
    projection: Projection,
) -> f64 {
    match projection {
        Projection::SphericalAccurate => {
            let u = spherical_to_cartesian3d(b) - spherical_to_cartesian3d(a);
            let v = spherical_to_cartesian3d(d) - spherical_to_cartesian3d(c);
            u.dot(&v)
        }
        _ => {
            get_dx(a, b, projection) * get_dx(c, d, projection)
                + get_dy(a, b, projection) * get_dy(c, d, projection)
        }
    }
}

/// Cosine of the angle between `a->b` and `c->d`, in [-1, 1].
///
/// `None` when either segment is degenerate.
#[must_use]
pub fn normalized_inner_product_two_segments(
    a: Point,
    b: Point,
    c: Point,
    d: Point,
    projection: Projection,
) -> Option<f64> {
    let first_length = distance(a, b, projection);
    let second_length = distance(c, d, projection);
    if first_length <= 0.0 || second_length <= 0.0 {
        return None;
    }
    let product = inner_product_two_segments(a, b, c, d, projection);
    Some((product / (first_length * second_length)).clamp(-1.0, 1.0))
}

/// Unit normal to the right of the directed segment `a->b`, in the local
/// metric of the projection. Returns the zero vector for a degenerate
/// segment.
#[must_use]
pub fn normal_vector_outside(a: Point, b: Point, projection: Projection) -> Point {
    let dx = get_dx(a, b, projection);
    let dy = get_dy(a, b, projection);
    let length = dx.hypot(dy);
    if length < 1e-16 {
        return Point::new(0.0, 0.0);
    }
    Point::new(dy / length, -dx / length)
}

/// Unit normal to the segment `a->b` pointing away from `inner_point`.
///
/// The flag reports whether the right-hand normal of `a->b` had to be
/// reversed to face away from `inner_point`.
#[must_use]
pub fn edge_outward_normal(
    a: Point,
    b: Point,
    inner_point: Point,
    projection: Projection,
) -> (Point, bool) {
    let base = normal_vector_outside(a, b, projection);
    let midpoint = (a + b) * 0.5;
    let towards_inner_x = get_dx(midpoint, inner_point, projection);
    let towards_inner_y = get_dy(midpoint, inner_point, projection);
    if base.x * towards_inner_x + base.y * towards_inner_y > 0.0 {
        (Point::new(-base.x, -base.y), true)
    } else {
        (base, false)
    }
}

/// Result of a segment intersection query.
#[derive(Debug, Clone, Copy)]
pub struct LineCrossing {
    /// Whether the segments (or lines, in infinite mode) intersect.
    pub crossing: bool,
    /// The intersection point; invalid when there is none.
    pub intersection: Point,
    /// The cross product of the two direction vectors.
    pub cross_product: f64,
    /// Parametric position of the intersection on the first segment.
    pub ratio_first: f64,
    /// Parametric position of the intersection on the second segment.
    pub ratio_second: f64,
}

/// Intersect segments `p1->p2` and `q1->q2`.
///
/// With `treat_as_infinite` the parametric ratios are not required to lie in
/// [0, 1]. Parallel or degenerate segments report no crossing and missing
/// ratios.
#[must_use]
pub fn are_lines_crossing(
    p1: Point,
    p2: Point,
    q1: Point,
    q2: Point,
    treat_as_infinite: bool,
    projection: Projection,
) -> LineCrossing {
    let dx1 = get_dx(p1, p2, projection);
    let dy1 = get_dy(p1, p2, projection);
    let dx2 = get_dx(q1, q2, projection);
    let dy2 = get_dy(q1, q2, projection);
    let determinant = dx1 * dy2 - dy1 * dx2;

    if determinant.abs() < 1e-12 {
        return LineCrossing {
            crossing: false,
            intersection: Point::INVALID,
            cross_product: 0.0,
            ratio_first: DOUBLE_MISSING,
            ratio_second: DOUBLE_MISSING,
        };
    }

    let ex = get_dx(p1, q1, projection);
    let ey = get_dy(p1, q1, projection);
    let ratio_first = (ex * dy2 - ey * dx2) / determinant;
    let ratio_second = (ex * dy1 - ey * dx1) / determinant;

    let within = |r: f64| (0.0..=1.0).contains(&r);
    let crossing = treat_as_infinite || (within(ratio_first) && within(ratio_second));

    LineCrossing {
        crossing,
        intersection: p1 + (p2 - p1) * ratio_first,
        cross_product: determinant,
        ratio_first,
        ratio_second,
    }
}

/// Projection of `point` onto the segment `a->b`.
#[derive(Debug, Clone, Copy)]
pub struct SegmentProjection {
    /// Distance from `point` to the projected point.
    pub distance: f64,
    /// The projected point on the segment.
    pub point: Point,
    /// Parametric position on the segment, clamped to [0, 1].
    pub ratio: f64,
}

/// Project `point` onto the segment `a->b`, clamping to the endpoints.
#[must_use]
pub fn distance_from_line(
    point: Point,
    a: Point,
    b: Point,
    projection: Projection,
) -> SegmentProjection {
    let squared_length = squared_distance(a, b, projection);
    if squared_length < 1e-16 {
        return SegmentProjection {
            distance: distance(point, a, projection),
            point: a,
            ratio: 0.0,
        };
    }
    let ratio =
        (inner_product_two_segments(a, b, a, point, projection) / squared_length).clamp(0.0, 1.0);
    let projected = a + (b - a) * ratio;
    SegmentProjection {
        distance: distance(point, projected, projection),
        point: projected,
        ratio,
    }
}

/// Geographic coordinates to 3D Cartesian on the Earth sphere.
#[must_use]
pub fn spherical_to_cartesian3d(point: Point) -> Vector3<f64> {
    let longitude = point.x * DEG_TO_RAD;
    let latitude = point.y * DEG_TO_RAD;
    Vector3::new(
        EARTH_RADIUS * latitude.cos() * longitude.cos(),
        EARTH_RADIUS * latitude.cos() * longitude.sin(),
        EARTH_RADIUS * latitude.sin(),
    )
}

/// 3D Cartesian back to geographic coordinates, with the longitude wrapped
/// to within 180 degrees of `reference_longitude`.
#[must_use]
pub fn cartesian3d_to_spherical(position: Vector3<f64>, reference_longitude: f64) -> Point {
    let mut longitude = position.y.atan2(position.x) / DEG_TO_RAD;
    let latitude = position
        .z
        .atan2(position.x.hypot(position.y))
        / DEG_TO_RAD;
    longitude += 360.0 * ((reference_longitude - longitude) / 360.0).round();
    Point::new(longitude, latitude)
}

/// The local right-handed frame at a point on the sphere: radial, east and
/// north unit vectors.
#[must_use]
pub fn spherical_local_bases(point: Point) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
    let longitude = point.x * DEG_TO_RAD;
    let latitude = point.y * DEG_TO_RAD;
    let (sin_lon, cos_lon) = longitude.sin_cos();
    let (sin_lat, cos_lat) = latitude.sin_cos();
    let radial = Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);
    let east = Vector3::new(-sin_lon, cos_lon, 0.0);
    let north = Vector3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
    (radial, east, north)
}

/// Next index in a circular range of `size` entries.
#[inline]
#[must_use]
pub fn next_circular_forward_index(index: usize, size: usize) -> usize {
    if index + 1 >= size {
        0
    } else {
        index + 1
    }
}

/// Previous index in a circular range of `size` entries.
#[inline]
#[must_use]
pub fn next_circular_backward_index(index: usize, size: usize) -> usize {
    if index == 0 {
        size - 1
    } else {
        index - 1
    }
}
