//! Polygon membership tests for node selection.

use crate::point::Point;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A closed polygon given by its corner ring. The closing segment from the
/// last corner back to the first is implicit.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    #[must_use]
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// The corner ring.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Ray-casting membership test.
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        if self.points.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = self.points.len() - 1;
        for i in 0..self.points.len() {
            let pi = self.points[i];
            let pj = self.points[j];
            if (pi.y > point.y) != (pj.y > point.y) {
                let slope_x = (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x;
                if point.x < slope_x {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Polygon {
        Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ])
    }

    #[test]
    fn contains_interior_point() {
        assert!(unit_square().contains(Point::new(0.5, 0.5)));
    }

    #[test]
    fn excludes_exterior_point() {
        assert!(!unit_square().contains(Point::new(1.5, 0.5)));
        assert!(!unit_square().contains(Point::new(0.5, -0.1)));
    }

    #[test]
    fn degenerate_polygon_contains_nothing() {
        let line = Polygon::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)]);
        assert!(!line.contains(Point::new(0.5, 0.0)));
    }
}
