//! Geometry types for spatial indexing.
//!
//! This module provides a small set of planar shapes that implement
//! [`Shape`] exactly:
//! - Points
//! - Regions (axis-aligned rectangles)
//! - Circles
//!
//! Every pairwise combination has an exact containment, intersection and
//! distance formula, so the index never has to fall back to bounding box
//! approximations for these types.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::bounding_box::BoundingBox;
use crate::shape::Shape;

/// A 2D coordinate (x, y).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    /// Creates a new coordinate.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Calculates the Euclidean distance to another coordinate.
    pub fn distance(&self, other: &Coordinate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    coordinate: Coordinate,
}

impl Point {
    /// Creates a new point at the given coordinates.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            coordinate: Coordinate::new(x, y),
        }
    }

    pub fn from_coordinate(coord: Coordinate) -> Self {
        Self { coordinate: coord }
    }

    pub fn x(&self) -> f64 {
        self.coordinate.x
    }

    pub fn y(&self) -> f64 {
        self.coordinate.y
    }

    pub fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }
}

impl Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "POINT({} {})", self.coordinate.x, self.coordinate.y)
    }
}

/// A shape that can be stored in a [`SpatialIndex`](crate::SpatialIndex).
///
/// ## Example
///
/// ```rust
/// use spatial_index::{Geometry, Shape};
///
/// let room = Geometry::region(0.0, 0.0, 10.0, 10.0);
/// let lamp = Geometry::point(3.0, 4.0);
/// let rug = Geometry::circle(5.0, 5.0, 2.0);
///
/// assert!(room.contains(&lamp));
/// assert!(room.contains(&rug));
/// assert!((Geometry::point(0.0, 0.0).distance_to(&lamp) - 5.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    /// A single point.
    Point(Point),
    /// An axis-aligned rectangle, boundary included.
    Region(BoundingBox),
    /// A disc defined by center and radius, boundary included.
    Circle { center: Point, radius: f64 },
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point(Point::new(x, y))
    }

    pub fn region(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Geometry::Region(BoundingBox::new(min_x, min_y, max_x, max_y))
    }

    pub fn circle(center_x: f64, center_y: f64, radius: f64) -> Self {
        Geometry::Circle {
            center: Point::new(center_x, center_y),
            radius,
        }
    }
}

impl Shape for Geometry {
    fn bounding_box(&self) -> BoundingBox {
        match self {
            Geometry::Point(p) => BoundingBox::from_point(p.x(), p.y()),
            Geometry::Region(bbox) => *bbox,
            Geometry::Circle { center, radius } => BoundingBox::new(
                center.x() - radius,
                center.y() - radius,
                center.x() + radius,
                center.y() + radius,
            ),
        }
    }

    fn contains(&self, other: &Geometry) -> bool {
        match (self, other) {
            (Geometry::Point(p), _) => {
                // Only a shape collapsed onto the very same point fits inside a point
                let bbox = other.bounding_box();
                bbox.min_x == p.x() && bbox.max_x == p.x() && bbox.min_y == p.y() && bbox.max_y == p.y()
            }
            (Geometry::Region(outer), other) => outer.contains(&other.bounding_box()),
            (Geometry::Circle { center, radius }, Geometry::Point(p)) => {
                center.coordinate().distance(p.coordinate()) <= *radius
            }
            (Geometry::Circle { center, radius }, Geometry::Region(bbox)) => {
                // A disc is convex, so it holds the rectangle iff it holds all four corners
                let corners = [
                    Coordinate::new(bbox.min_x, bbox.min_y),
                    Coordinate::new(bbox.min_x, bbox.max_y),
                    Coordinate::new(bbox.max_x, bbox.min_y),
                    Coordinate::new(bbox.max_x, bbox.max_y),
                ];
                corners
                    .iter()
                    .all(|c| center.coordinate().distance(c) <= *radius)
            }
            (
                Geometry::Circle { center: c1, radius: r1 },
                Geometry::Circle { center: c2, radius: r2 },
            ) => c1.coordinate().distance(c2.coordinate()) + r2 <= *r1,
        }
    }

    fn intersects(&self, other: &Geometry) -> bool {
        self.distance_to(other) == 0.0
    }

    fn distance_to(&self, other: &Geometry) -> f64 {
        match (self, other) {
            (Geometry::Point(a), Geometry::Point(b)) => a.coordinate().distance(b.coordinate()),
            (Geometry::Circle { center, radius }, other)
            | (other, Geometry::Circle { center, radius }) => {
                (Geometry::Point(*center).distance_to(other) - radius).max(0.0)
            }
            (a, b) => a.bounding_box().min_distance(&b.bounding_box()),
        }
    }
}

impl Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Geometry::Point(p) => write!(f, "{}", p),
            Geometry::Region(bbox) => write!(
                f,
                "REGION({} {}, {} {})",
                bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y
            ),
            Geometry::Circle { center, radius } => {
                write!(f, "CIRCLE({} {}, {})", center.x(), center.y(), radius)
            }
        }
    }
}
