use crate::bounding_box::BoundingBox;
use crate::shape::Shape;

/// Identifier the index assigns to every added entry.
///
/// Ids increase monotonically over the life of an index, so comparing two
/// ids compares insertion order. Ids are never reused.
pub type EntryId = u64;

/// An immutable (shape, payload id) pair, as stored in the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<S> {
    id: EntryId,
    shape: S,
}

impl<S: Shape> Entry<S> {
    pub fn new(id: EntryId, shape: S) -> Self {
        Self { id, shape }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn shape(&self) -> &S {
        &self.shape
    }

    /// The box the engine indexes this entry under.
    pub fn bounding_box(&self) -> BoundingBox {
        self.shape.bounding_box()
    }
}
