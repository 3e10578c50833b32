//! Face landmarks as delivered by the tracking provider, and their projection
//! into destination pixels.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

use crate::error::{Result, TryOnError};
use crate::transform::RenderTransform;

/// Number of points in one face-mesh detection.
pub const LANDMARK_COUNT: usize = 468;

/// One normalized point in `[0,1]x[0,1]` of the source video frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A full detection. Construction rejects anything that is not exactly
/// [`LANDMARK_COUNT`] finite points, so draw code can index freely.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    points: Vec<Landmark>,
}

impl LandmarkFrame {
    pub fn new(points: Vec<Landmark>) -> Result<Self> {
        if points.len() != LANDMARK_COUNT {
            return Err(TryOnError::InvalidLandmarks(format!(
                "expected {LANDMARK_COUNT} points, got {}",
                points.len()
            )));
        }
        if let Some(i) = points.iter().position(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(TryOnError::InvalidLandmarks(format!("point {i} is not finite")));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Landmark {
        self.points[index]
    }
}

/// Destination-space point (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn lerp(self, other: Point, t: f32) -> Point {
        Point::new(self.x + (other.x - self.x) * t, self.y + (other.y - self.y) * t)
    }

    pub fn midpoint(self, other: Point) -> Point {
        self.lerp(other, 0.5)
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, o: Point) -> Point {
        Point::new(self.x + o.x, self.y + o.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, o: Point) -> Point {
        Point::new(self.x - o.x, self.y - o.y)
    }
}

impl Mul<f32> for Point {
    type Output = Point;
    fn mul(self, s: f32) -> Point {
        Point::new(self.x * s, self.y * s)
    }
}

/// Axis-aligned bounds in destination pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Bounds {
    pub fn of(points: &[Point]) -> Option<Bounds> {
        let first = points.first()?;
        let mut b = Bounds { min_x: first.x, min_y: first.y, max_x: first.x, max_y: first.y };
        for p in &points[1..] {
            b.min_x = b.min_x.min(p.x);
            b.min_y = b.min_y.min(p.y);
            b.max_x = b.max_x.max(p.x);
            b.max_y = b.max_y.max(p.y);
        }
        Some(b)
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point {
        Point::new((self.min_x + self.max_x) * 0.5, (self.min_y + self.max_y) * 0.5)
    }
}

/// Every landmark of one frame projected through the active [`RenderTransform`].
/// Both backends read from the same projection, so their output lines up.
#[derive(Debug, Clone)]
pub struct ProjectedFace {
    points: Vec<Point>,
}

impl ProjectedFace {
    pub fn project(frame: &LandmarkFrame, transform: &RenderTransform) -> Self {
        let points = frame.points().iter().map(|lm| transform.project(*lm)).collect();
        Self { points }
    }

    #[inline]
    pub fn at(&self, index: u16) -> Point {
        self.points[index as usize]
    }

    /// Resolve a landmark index list into destination points.
    pub fn polygon(&self, indices: &[u16]) -> Vec<Point> {
        indices.iter().map(|&i| self.at(i)).collect()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_wrong_length() {
        let err = LandmarkFrame::new(vec![Landmark::default(); 10]).unwrap_err();
        assert!(matches!(err, TryOnError::InvalidLandmarks(_)));
    }

    #[test]
    fn frame_rejects_nan() {
        let mut pts = vec![Landmark::new(0.5, 0.5); LANDMARK_COUNT];
        pts[17].y = f32::NAN;
        assert!(LandmarkFrame::new(pts).is_err());
    }

    #[test]
    fn bounds_cover_all_points() {
        let pts = [Point::new(3.0, 9.0), Point::new(-1.0, 4.0), Point::new(7.0, 2.0)];
        let b = Bounds::of(&pts).unwrap();
        assert_eq!((b.min_x, b.min_y, b.max_x, b.max_y), (-1.0, 2.0, 7.0, 9.0));
        assert!((b.center().x - 3.0).abs() < 1e-6);
    }
}
