//! The shape capability the index is generic over.

use std::fmt::Debug;

use crate::bounding_box::BoundingBox;

/// A geometric region that can be stored in and queried against a
/// [`SpatialIndex`](crate::SpatialIndex).
///
/// The engine only ever sees [`Shape::bounding_box`]; it uses boxes to prune
/// the tree and the index re-applies the exact predicate on every candidate.
/// For that to be correct an implementation must keep its predicates
/// consistent with its bounding box:
///
/// - `a.contains(b)` implies `a.bounding_box().contains(&b.bounding_box())`
/// - `a.intersects(b)` implies `a.bounding_box().intersects(&b.bounding_box())`
/// - `a.distance_to(b) >= a.bounding_box().min_distance(&b.bounding_box())`
///
/// All operations must be stable: repeated calls on unchanged shapes return
/// the same answer for as long as the shape is stored in an index.
///
/// `PartialEq` is the equality [`SpatialIndex::delete`](crate::SpatialIndex::delete)
/// matches on.
pub trait Shape: Clone + PartialEq + Debug + Send + Sync {
    /// The minimum bounding rectangle of the shape.
    fn bounding_box(&self) -> BoundingBox;

    /// Returns true if `other` lies entirely within `self`.
    fn contains(&self, other: &Self) -> bool;

    /// Returns true if `self` and `other` share at least one point.
    fn intersects(&self, other: &Self) -> bool;

    /// Smallest Euclidean distance between the two shapes, zero when they
    /// intersect.
    fn distance_to(&self, other: &Self) -> f64;
}

impl Shape for BoundingBox {
    fn bounding_box(&self) -> BoundingBox {
        *self
    }

    fn contains(&self, other: &Self) -> bool {
        BoundingBox::contains(self, other)
    }

    fn intersects(&self, other: &Self) -> bool {
        BoundingBox::intersects(self, other)
    }

    fn distance_to(&self, other: &Self) -> f64 {
        self.min_distance(other)
    }
}
