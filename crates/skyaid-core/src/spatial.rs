//! Planar geometry for route lengths and hazard checks.
//!
//! All coordinates are kilometers on a flat plane. Distance helpers never fail:
//! coincident points simply yield zero.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tolerance used when comparing coordinates and segment parameters.
pub const EPS_KM: f64 = 1e-9;

/// A position on the plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Point at parameter `t` along the segment `self -> other`.
    pub fn lerp(&self, other: &Point, t: f64) -> Point {
        Point::new(
            self.x + t * (other.x - self.x),
            self.y + t * (other.y - self.y),
        )
    }

    /// Move toward `target` by at most `max_step`. Returns the new point and the
    /// distance actually covered.
    pub fn step_toward(&self, target: &Point, max_step: f64) -> (Point, f64) {
        let remaining = self.distance_to(target);
        if remaining <= max_step.max(0.0) || remaining < EPS_KM {
            return (*target, remaining);
        }
        let step = max_step.max(0.0);
        (self.lerp(target, step / remaining), step)
    }

    pub fn approx_eq(&self, other: &Point, tolerance: f64) -> bool {
        self.distance_to(other) <= tolerance
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// Axis-aligned rectangle. Containment and intersection are inclusive of the edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    /// Rectangle from two opposite corners in any order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            min: Point::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn centered(center: Point, width: f64, height: f64) -> Self {
        let half_w = width.abs() / 2.0;
        let half_h = height.abs() / 2.0;
        Self {
            min: Point::new(center.x - half_w, center.y - half_h),
            max: Point::new(center.x + half_w, center.y + half_h),
        }
    }

    /// Grow every side by `margin` (negative margins are ignored).
    pub fn expand(&self, margin: f64) -> Self {
        let margin = margin.max(0.0);
        Self {
            min: Point::new(self.min.x - margin, self.min.y - margin),
            max: Point::new(self.max.x + margin, self.max.y + margin),
        }
    }

    pub fn union(&self, other: &Rect) -> Self {
        Self {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    pub fn include_point(&self, point: &Point) -> Self {
        self.union(&Rect::from_corners(*point, *point))
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// Liang-Barsky clip of the segment `a -> b` against this rectangle.
    pub fn intersects_segment(&self, a: &Point, b: &Point) -> bool {
        if self.contains(a) || self.contains(b) {
            return true;
        }

        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let mut t_enter = 0.0_f64;
        let mut t_exit = 1.0_f64;

        let clips = [
            (-dx, a.x - self.min.x),
            (dx, self.max.x - a.x),
            (-dy, a.y - self.min.y),
            (dy, self.max.y - a.y),
        ];

        for (p, q) in clips {
            if p.abs() < f64::EPSILON {
                // Parallel to this edge: reject if outside it.
                if q < 0.0 {
                    return false;
                }
                continue;
            }
            let r = q / p;
            if p < 0.0 {
                if r > t_exit {
                    return false;
                }
                t_enter = t_enter.max(r);
            } else {
                if r < t_enter {
                    return false;
                }
                t_exit = t_exit.min(r);
            }
        }

        t_enter <= t_exit
    }

    /// Shortest distance from `point` to this rectangle (0 when inside).
    pub fn distance_to_point(&self, point: &Point) -> f64 {
        let dx = (self.min.x - point.x).max(0.0).max(point.x - self.max.x);
        let dy = (self.min.y - point.y).max(0.0).max(point.y - self.max.y);
        dx.hypot(dy)
    }
}

/// Sum of consecutive segment lengths.
pub fn path_length(points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|pair| pair[0].distance_to(&pair[1]))
        .sum()
}
