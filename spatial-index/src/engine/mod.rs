//! The spatial engine the index delegates to.
//!
//! An engine only knows bounding boxes and 64-bit entry ids. It prunes and
//! orders by box geometry and pushes every candidate it finds into a
//! [`Visitor`]. Resolving ids to typed values and applying the exact shape
//! predicate happens above it, in the index.

mod node;
mod rtree;

pub use rtree::RTree;

use std::ops::ControlFlow;

use crate::bounding_box::BoundingBox;
use crate::entry::EntryId;
use crate::errors::SpatialResult;

/// What an engine reports for each entry it visits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineData {
    /// Id the entry was inserted with
    pub id: EntryId,
    /// Bounding box the entry was inserted with
    pub mbr: BoundingBox,
    /// Lower bound of the entry's distance to the query, set only by
    /// nearest-neighbor traversal
    pub mindist: Option<f64>,
}

/// Receives entries from an engine traversal, one at a time.
///
/// Returning [`ControlFlow::Break`] stops the traversal; the query method
/// then returns `Ok(())` without visiting anything else. An error stops the
/// traversal and is returned from the query method.
pub trait Visitor {
    fn visit_data(&mut self, data: &EngineData) -> SpatialResult<ControlFlow<()>>;
}

impl<F> Visitor for F
where
    F: FnMut(&EngineData) -> SpatialResult<ControlFlow<()>>,
{
    fn visit_data(&mut self, data: &EngineData) -> SpatialResult<ControlFlow<()>> {
        self(data)
    }
}

/// Structural statistics of an engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub entry_count: u64,
    /// Number of levels, 0 for an empty tree
    pub height: u32,
    pub node_count: u64,
    pub leaf_capacity: usize,
    pub index_capacity: usize,
}

/// Result of [`SpatialEngine::check_integrity`].
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    /// Total nodes visited
    pub nodes_checked: u64,
    /// Entries found in leaves
    pub entries_found: u64,
    /// Summary of findings
    pub is_valid: bool,
    /// Detailed error messages
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn new() -> Self {
        Self {
            nodes_checked: 0,
            entries_found: 0,
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.is_valid = false;
        self.errors.push(message);
    }
}

impl Default for IntegrityReport {
    fn default() -> Self {
        Self::new()
    }
}

/// The query and mutation contract every engine provides.
///
/// Engines are exclusively owned by one index. Queries take `&self` and
/// must not mutate the structure; the persistence backend underneath is
/// internally synchronized.
pub trait SpatialEngine: Send + Sync {
    /// Adds an entry with bounding box `mbr` and id `id`.
    fn insert_data(&mut self, mbr: &BoundingBox, id: EntryId) -> SpatialResult<()>;

    /// Removes the entry inserted with exactly `mbr` and `id`.
    /// Returns false when no such entry exists.
    fn delete_data(&mut self, mbr: &BoundingBox, id: EntryId) -> SpatialResult<bool>;

    /// Visits every entry whose box lies within `query`.
    fn contains_what_query(
        &self,
        query: &BoundingBox,
        visitor: &mut dyn Visitor,
    ) -> SpatialResult<()>;

    /// Visits every entry whose box intersects `query`.
    fn intersects_with_query(
        &self,
        query: &BoundingBox,
        visitor: &mut dyn Visitor,
    ) -> SpatialResult<()>;

    /// Visits entries in non-decreasing order of box distance to `query`,
    /// setting [`EngineData::mindist`]. Runs until every entry has been
    /// visited or the visitor breaks.
    fn nearest_neighbor_query(
        &self,
        query: &BoundingBox,
        visitor: &mut dyn Visitor,
    ) -> SpatialResult<()>;

    /// Visits every entry.
    fn query_all(&self, visitor: &mut dyn Visitor) -> SpatialResult<()>;

    /// Number of entries.
    fn size(&self) -> u64;

    fn dimensions(&self) -> usize;

    fn stats(&self) -> EngineStats;

    fn check_integrity(&self) -> SpatialResult<IntegrityReport>;

    /// Persists the engine's bookkeeping and flushes the storage manager.
    fn flush(&self) -> SpatialResult<()>;
}
