//! Natural cubic splines over projected 2D corner points.

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::suboptimal_flops)]

use grid_types::constants::{DEG_TO_RAD, EARTH_RADIUS};
use grid_types::ops::{
    are_lines_crossing, distance, get_dx, get_dy, normal_vector_outside, squared_distance,
};
use grid_types::{Point, Projection};

use crate::error::{SplineError, SplineResult};

/// A single spline: corner points with precomputed natural-cubic second
/// derivatives and a sampled length.
#[derive(Debug, Clone)]
pub struct Spline {
    corner_points: Vec<Point>,
    derivatives: Vec<Point>,
    length: f64,
}

impl Spline {
    /// Corner points of the spline.
    #[must_use]
    pub fn corner_points(&self) -> &[Point] {
        &self.corner_points
    }

    /// Sampled length at construction time.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Evaluate the spline at `t`, in segment-index coordinates (corner `k`
    /// sits at `t = k`). `t` is clamped to the spline range.
    #[must_use]
    pub fn point_at(&self, t: f64) -> Point {
        interpolate(&self.corner_points, &self.derivatives, t)
    }
}

/// Curvature query result: the curvature factor and the local unit normal
/// and tangent.
#[derive(Debug, Clone, Copy)]
pub struct SplineCurvature {
    pub curvature: f64,
    pub normal: Point,
    pub tangent: Point,
}

/// Intersection of two splines, with the parametric positions on both.
#[derive(Debug, Clone, Copy)]
pub struct SplineIntersection {
    pub point: Point,
    pub cross_product: f64,
    pub first_ratio: f64,
    pub second_ratio: f64,
}

/// A set of splines sharing one projection.
#[derive(Debug, Clone)]
pub struct SplineSet {
    splines: Vec<Spline>,
    projection: Projection,
}

impl SplineSet {
    #[must_use]
    pub fn new(projection: Projection) -> Self {
        Self {
            splines: Vec::new(),
            projection,
        }
    }

    /// Number of splines in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.splines.len()
    }

    /// Whether the set holds no splines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.splines.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Spline> {
        self.splines.get(index)
    }

    /// Add a spline; returns its index.
    ///
    /// # Errors
    ///
    /// Fails with fewer than two corner points.
    pub fn add(&mut self, corner_points: Vec<Point>) -> SplineResult<usize> {
        if corner_points.len() < 2 {
            return Err(SplineError::TooFewPoints(corner_points.len()));
        }
        let derivatives = second_order_derivative(&corner_points);
        let mut spline = Spline {
            corner_points,
            derivatives,
            length: 0.0,
        };
        spline.length = sampled_length(
            &spline,
            0.0,
            (spline.corner_points.len() - 1) as f64,
            100,
            false,
            1.0,
            self.projection,
        );
        self.splines.push(spline);
        Ok(self.splines.len() - 1)
    }

    /// Remove the spline at `index`.
    ///
    /// # Errors
    ///
    /// Fails when `index` is out of range.
    pub fn remove(&mut self, index: usize) -> SplineResult<()> {
        self.check_index(index)?;
        self.splines.remove(index);
        Ok(())
    }

    /// Append a corner point to an existing spline, refreshing its
    /// derivatives and length.
    ///
    /// # Errors
    ///
    /// Fails when `index` is out of range.
    pub fn add_point(&mut self, index: usize, point: Point) -> SplineResult<()> {
        self.check_index(index)?;
        let projection = self.projection;
        let spline = &mut self.splines[index];
        spline.corner_points.push(point);
        spline.derivatives = second_order_derivative(&spline.corner_points);
        spline.length = sampled_length(
            spline,
            0.0,
            (spline.corner_points.len() - 1) as f64,
            100,
            false,
            1.0,
            projection,
        );
        Ok(())
    }

    /// Length of the spline between `begin` and `end` (segment-index
    /// coordinates), sampled with `samples` points per segment. With
    /// `account_for_curvature` each sample is weighted by
    /// `1 + curvature * height`.
    ///
    /// # Errors
    ///
    /// Fails when `index` is out of range.
    pub fn length(
        &self,
        index: usize,
        begin: f64,
        end: f64,
        samples: usize,
        account_for_curvature: bool,
        height: f64,
    ) -> SplineResult<f64> {
        self.check_index(index)?;
        Ok(sampled_length(
            &self.splines[index],
            begin,
            end,
            samples,
            account_for_curvature,
            height,
            self.projection,
        ))
    }

    /// Curvature, normal and tangent at `t` on the spline.
    ///
    /// # Errors
    ///
    /// Fails when `index` is out of range.
    pub fn curvature_at(&self, index: usize, t: f64) -> SplineResult<SplineCurvature> {
        self.check_index(index)?;
        Ok(curvature_on_spline_point(
            &self.splines[index],
            t,
            self.projection,
        ))
    }

    /// Intersect two splines of the set.
    ///
    /// Scans all segment pairs for the most central crossing, then refines
    /// it by bisection on interpolated sub-segments.
    ///
    /// # Errors
    ///
    /// Fails when either index is out of range.
    #[allow(clippy::too_many_lines)]
    pub fn intersection(
        &self,
        first: usize,
        second: usize,
    ) -> SplineResult<Option<SplineIntersection>> {
        self.check_index(first)?;
        self.check_index(second)?;
        let first_spline = &self.splines[first];
        let second_spline = &self.splines[second];
        let num_first = first_spline.corner_points.len();
        let num_second = second_spline.corner_points.len();

        let mut minimum_crossing_distance = f64::MAX;
        let mut num_crossing = 0;
        let mut first_crossing_ratio = 0.0;
        let mut second_crossing_ratio = 0.0;
        let mut first_crossing_index = 0;
        let mut second_crossing_index = 0;
        let mut closest_intersection = Point::INVALID;
        let mut cross_product = 0.0;

        // Coarse scan over all segment pairs; prefer the crossing most
        // central on a two-point spline.
        for n in 0..num_first - 1 {
            for nn in 0..num_second - 1 {
                let crossing = are_lines_crossing(
                    first_spline.corner_points[n],
                    first_spline.corner_points[n + 1],
                    second_spline.corner_points[nn],
                    second_spline.corner_points[nn + 1],
                    false,
                    self.projection,
                );
                if !crossing.crossing {
                    continue;
                }
                let crossing_distance = if num_first == 2 {
                    minimum_crossing_distance.min((crossing.ratio_first - 0.5).abs())
                } else if num_second == 2 {
                    (crossing.ratio_second - 0.5).abs()
                } else {
                    minimum_crossing_distance
                };
                if crossing_distance < minimum_crossing_distance || num_crossing == 0 {
                    minimum_crossing_distance = crossing_distance;
                    num_crossing = 1;
                    first_crossing_index = n;
                    second_crossing_index = nn;
                    first_crossing_ratio = crossing.ratio_first;
                    second_crossing_ratio = crossing.ratio_second;
                    closest_intersection = crossing.intersection;
                    cross_product = crossing.cross_product;
                }
            }
        }
        if num_crossing == 0 {
            return Ok(None);
        }

        let mut first_crossing = first_crossing_index as f64 + first_crossing_ratio;
        let mut second_crossing = second_crossing_index as f64 + second_crossing_ratio;

        // Bisection refinement on interpolated sub-segments.
        let max_squared_distance = 1e-12;
        let max_vertex_distance = 1e-4;
        let mut squared_crossing_distance = f64::MAX;
        let mut first_window = 1.0;
        let mut second_window = 1.0;
        let mut iterations = 0;
        while squared_crossing_distance > max_squared_distance && iterations < 20 {
            iterations += 1;

            if first_crossing_ratio > 0.0 && first_crossing_ratio < 1.0 {
                first_window *= 0.5;
            }
            if second_crossing_ratio > 0.0 && second_crossing_ratio < 1.0 {
                second_window *= 0.5;
            }

            first_crossing = first_crossing.clamp(0.0, num_first as f64);
            second_crossing = second_crossing.clamp(0.0, num_second as f64);

            let first_left =
                (first_crossing - 0.5 * first_window).clamp(0.0, (num_first - 1) as f64);
            let first_right =
                (first_crossing + 0.5 * first_window).clamp(0.0, (num_first - 1) as f64);
            let second_left =
                (second_crossing - 0.5 * second_window).clamp(0.0, (num_second - 1) as f64);
            let second_right =
                (second_crossing + 0.5 * second_window).clamp(0.0, (num_second - 1) as f64);
            first_window = first_right - first_left;
            second_window = second_right - second_left;

            let first_left_point = first_spline.point_at(first_left);
            let first_right_point = first_spline.point_at(first_right);
            let second_left_point = second_spline.point_at(second_left);
            let second_right_point = second_spline.point_at(second_right);

            let old_intersection = closest_intersection;
            let crossing = are_lines_crossing(
                first_left_point,
                first_right_point,
                second_left_point,
                second_right_point,
                true,
                self.projection,
            );

            // Step only when the refined crossing lies in the search window.
            if crossing.ratio_first > -2.0
                && crossing.ratio_first < 3.0
                && crossing.ratio_second > -2.0
                && crossing.ratio_second < 3.0
            {
                let previous_first = first_crossing;
                let previous_second = second_crossing;

                first_crossing = first_left + crossing.ratio_first * (first_right - first_left);
                second_crossing =
                    second_left + crossing.ratio_second * (second_right - second_left);
                first_crossing = first_crossing.clamp(0.0, (num_first - 1) as f64);
                second_crossing = second_crossing.clamp(0.0, (num_second - 1) as f64);

                if crossing.crossing {
                    num_crossing = 1;
                    cross_product = crossing.cross_product;
                    closest_intersection = crossing.intersection;
                }

                if (first_crossing - previous_first).abs() > max_vertex_distance
                    || (second_crossing - previous_second).abs() > max_vertex_distance
                {
                    squared_crossing_distance =
                        squared_distance(old_intersection, closest_intersection, self.projection);
                } else {
                    break;
                }
            }
        }

        Ok(Some(SplineIntersection {
            point: closest_intersection,
            cross_product,
            first_ratio: first_crossing,
            second_ratio: second_crossing,
        }))
    }

    fn check_index(&self, index: usize) -> SplineResult<()> {
        if index >= self.splines.len() {
            return Err(SplineError::IndexOutOfRange {
                index,
                len: self.splines.len(),
            });
        }
        Ok(())
    }
}

/// Second derivatives of a natural cubic spline through `points`.
fn second_order_derivative(points: &[Point]) -> Vec<Point> {
    let num_nodes = points.len();
    let mut derivatives = vec![Point::new(0.0, 0.0); num_nodes];
    let mut u = vec![Point::new(0.0, 0.0); num_nodes];

    for i in 1..num_nodes - 1 {
        let px = derivatives[i - 1].x * 0.5 + 2.0;
        let py = derivatives[i - 1].y * 0.5 + 2.0;
        derivatives[i] = Point::new(-0.5 / px, -0.5 / py);

        let delta = points[i + 1] - points[i] - (points[i] - points[i - 1]);
        u[i] = Point::new(
            (delta.x * 3.0 - u[i - 1].x * 0.5) / px,
            (delta.y * 3.0 - u[i - 1].y * 0.5) / py,
        );
    }

    derivatives[num_nodes - 1] = Point::new(0.0, 0.0);
    for i in (0..num_nodes - 1).rev() {
        derivatives[i] = Point::new(
            derivatives[i].x * derivatives[i + 1].x + u[i].x,
            derivatives[i].y * derivatives[i + 1].y + u[i].y,
        );
    }
    derivatives
}

/// Evaluate a cubic spline at `t` in segment-index coordinates.
fn interpolate(points: &[Point], derivatives: &[Point], t: f64) -> Point {
    let num_nodes = points.len();
    let t = t.clamp(0.0, (num_nodes - 1) as f64);
    let left = (t.floor() as usize).min(num_nodes - 2);
    let right = left + 1;
    let a = right as f64 - t;
    let b = t - left as f64;

    Point::new(
        a * points[left].x
            + b * points[right].x
            + ((a * a * a - a) * derivatives[left].x + (b * b * b - b) * derivatives[right].x)
                / 6.0,
        a * points[left].y
            + b * points[right].y
            + ((a * a * a - a) * derivatives[left].y + (b * b * b - b) * derivatives[right].y)
                / 6.0,
    )
}

/// Sampled spline length between `begin` and `end`.
fn sampled_length(
    spline: &Spline,
    begin: f64,
    end: f64,
    samples: usize,
    account_for_curvature: bool,
    height: f64,
    projection: Projection,
) -> f64 {
    let delta = 1.0 / samples.max(1) as f64;
    let num_points = (0.9999 + (end - begin) / delta).floor().max(10.0);
    let delta = (end - begin) / num_points;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_points = num_points as usize;

    let mut left_point = spline.point_at(begin);
    let mut length = 0.0;
    let mut right_coordinate = begin;
    for _ in 0..num_points {
        let left_coordinate = right_coordinate;
        right_coordinate += delta;
        if right_coordinate > end {
            right_coordinate = end;
        }
        let right_point = spline.point_at(right_coordinate);
        let curvature_factor = if account_for_curvature {
            curvature_on_spline_point(
                spline,
                0.5 * (left_coordinate + right_coordinate),
                projection,
            )
            .curvature
        } else {
            0.0
        };
        length += distance(left_point, right_point, projection) * (1.0 + curvature_factor * height);
        left_point = right_point;
    }
    length
}

/// Curvature, unit normal and unit tangent at `t` on the spline.
fn curvature_on_spline_point(spline: &Spline, t: f64, projection: Projection) -> SplineCurvature {
    let points = &spline.corner_points;
    let derivatives = &spline.derivatives;
    let num_nodes = points.len();
    let t = t.clamp(0.0, (num_nodes - 1) as f64);
    let left = (t.floor() as usize).min(num_nodes - 2);
    let right = left + 1;
    let left_segment = right as f64 - t;
    let right_segment = t - left as f64;

    let point = interpolate(points, derivatives, t);

    // First and second parametric derivatives.
    let mut p = points[right] - points[left]
        + (derivatives[left] * (-3.0 * left_segment * left_segment + 1.0)
            + derivatives[right] * (3.0 * right_segment * right_segment - 1.0))
            / 6.0;
    let mut pp = derivatives[left] * left_segment + derivatives[right] * right_segment;

    if projection == Projection::Spherical {
        let scale_x = DEG_TO_RAD * EARTH_RADIUS * (DEG_TO_RAD * point.y).cos();
        let scale_y = DEG_TO_RAD * EARTH_RADIUS;
        p = Point::new(p.x * scale_x, p.y * scale_y);
        pp = Point::new(pp.x * scale_x, pp.y * scale_y);
    }

    let curvature =
        (pp.x * p.y - pp.y * p.x).abs() / (p.x * p.x + p.y * p.y + 1e-8).powf(1.5);

    let incremented = point + p * 1e-4;
    let normal = normal_vector_outside(point, incremented, projection);
    let segment_distance = distance(point, incremented, projection);
    let dx = get_dx(point, incremented, projection);
    let dy = get_dy(point, incremented, projection);
    let tangent = if segment_distance > 0.0 {
        Point::new(dx / segment_distance, dy / segment_distance)
    } else {
        Point::new(0.0, 0.0)
    };

    SplineCurvature {
        curvature,
        normal,
        tangent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn straight_spline_has_zero_derivatives() {
        let points: Vec<Point> = (0..5).map(|k| Point::new(f64::from(k), 0.0)).collect();
        let derivatives = second_order_derivative(&points);
        for d in derivatives {
            assert_relative_eq!(d.x, 0.0, epsilon = 1e-12);
            assert_relative_eq!(d.y, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn straight_spline_length_is_euclidean() {
        let mut set = SplineSet::new(Projection::Cartesian);
        let index = set
            .add(vec![
                Point::new(0.0, 0.0),
                Point::new(1.0, 0.0),
                Point::new(2.0, 0.0),
            ])
            .expect("spline added");
        let spline = set.get(index).expect("spline exists");
        assert_relative_eq!(spline.length(), 2.0, epsilon = 1e-9);

        let mid = spline.point_at(1.0);
        assert_relative_eq!(mid.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(mid.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn too_few_points_are_rejected() {
        let mut set = SplineSet::new(Projection::Cartesian);
        assert!(matches!(
            set.add(vec![Point::new(0.0, 0.0)]),
            Err(SplineError::TooFewPoints(1))
        ));
    }

    #[test]
    fn crossing_splines_intersect_near_the_center() {
        let mut set = SplineSet::new(Projection::Cartesian);
        let first = set
            .add(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)])
            .expect("first spline");
        let second = set
            .add(vec![Point::new(0.0, 1.0), Point::new(1.0, 0.0)])
            .expect("second spline");

        let intersection = set
            .intersection(first, second)
            .expect("valid indices")
            .expect("splines cross");
        assert_relative_eq!(intersection.point.x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(intersection.point.y, 0.5, epsilon = 1e-6);
        assert_relative_eq!(intersection.first_ratio, 0.5, epsilon = 1e-4);
        assert_relative_eq!(intersection.second_ratio, 0.5, epsilon = 1e-4);
    }

    #[test]
    fn parallel_splines_do_not_intersect() {
        let mut set = SplineSet::new(Projection::Cartesian);
        let first = set
            .add(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)])
            .expect("first spline");
        let second = set
            .add(vec![Point::new(0.0, 1.0), Point::new(1.0, 1.0)])
            .expect("second spline");
        assert!(set
            .intersection(first, second)
            .expect("valid indices")
            .is_none());
    }

    #[test]
    fn straight_spline_has_no_curvature() {
        let mut set = SplineSet::new(Projection::Cartesian);
        let index = set
            .add(vec![
                Point::new(0.0, 0.0),
                Point::new(1.0, 0.0),
                Point::new(2.0, 0.0),
            ])
            .expect("spline added");
        let result = set.curvature_at(index, 1.0).expect("valid index");
        assert_relative_eq!(result.curvature, 0.0, epsilon = 1e-9);
        assert_relative_eq!(result.tangent.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(result.tangent.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn removing_a_spline_shrinks_the_set() {
        let mut set = SplineSet::new(Projection::Cartesian);
        set.add(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)])
            .expect("spline added");
        assert_eq!(set.len(), 1);
        set.remove(0).expect("removed");
        assert!(set.is_empty());
        assert!(matches!(
            set.remove(0),
            Err(SplineError::IndexOutOfRange { .. })
        ));
    }
}
