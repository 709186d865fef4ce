//! Traversal bridge between the engine and typed consumers.
//!
//! The engine pushes [`EngineData`] into a [`Visitor`]. The bridge resolves
//! each hit through the payload table, re-checks the exact shape predicate
//! the engine could only approximate with bounding boxes, and hands the
//! resulting [`IndexData`] to an [`IndexVisitor`].
//!
//! The index builds its three consumption styles on this one primitive:
//!
//! - callback: `visit_*` methods stream every match straight to a closure
//! - sequence: `contains_what`, `intersects_with`, `nearest_neighbors` and
//!   `entries` collect the matches into a `Vec` before returning
//! - full scan: `for_each` streams every entry without a geometric filter

use std::fmt::{self, Debug, Formatter};
use std::ops::ControlFlow;

use crate::adapter::QueryResultAdapter;
use crate::engine::{EngineData, Visitor};
use crate::entry::EntryId;
use crate::errors::SpatialResult;
use crate::shape::Shape;

/// One query result: a stored shape, its value and, for nearest-neighbor
/// queries, its distance to the query shape.
///
/// Records borrow from the index, so the index cannot be mutated while any
/// record from it is alive.
pub struct IndexData<'a, S, V> {
    id: EntryId,
    shape: &'a S,
    value: &'a V,
    distance: Option<f64>,
}

impl<'a, S, V> IndexData<'a, S, V> {
    pub(crate) fn new(id: EntryId, shape: &'a S, value: &'a V, distance: Option<f64>) -> Self {
        Self {
            id,
            shape,
            value,
            distance,
        }
    }

    /// Id the entry was assigned when it was added. Smaller ids were added
    /// earlier.
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn shape(&self) -> &'a S {
        self.shape
    }

    pub fn value(&self) -> &'a V {
        self.value
    }

    /// Distance to the query shape. Only set by nearest-neighbor queries.
    pub fn distance(&self) -> Option<f64> {
        self.distance
    }

    pub fn into_pair(self) -> (&'a S, &'a V) {
        (self.shape, self.value)
    }
}

impl<S, V> Clone for IndexData<'_, S, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, V> Copy for IndexData<'_, S, V> {}

impl<S: Debug, V: Debug> Debug for IndexData<'_, S, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexData")
            .field("id", &self.id)
            .field("shape", self.shape)
            .field("value", self.value)
            .field("distance", &self.distance)
            .finish()
    }
}

impl<S: PartialEq, V: PartialEq> PartialEq for IndexData<'_, S, V> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.shape == other.shape
            && self.value == other.value
            && self.distance == other.distance
    }
}

/// Consumer of typed query results.
///
/// Returning [`ControlFlow::Break`] ends the traversal early.
pub trait IndexVisitor<'a, S, V> {
    fn visit(&mut self, data: IndexData<'a, S, V>) -> ControlFlow<()>;
}

/// [`IndexVisitor`] backed by a closure. Built with [`visitor_fn`].
pub struct FnVisitor<F> {
    f: F,
}

impl<'a, S, V, F> IndexVisitor<'a, S, V> for FnVisitor<F>
where
    S: 'a,
    V: 'a,
    F: FnMut(IndexData<'a, S, V>) -> ControlFlow<()>,
{
    fn visit(&mut self, data: IndexData<'a, S, V>) -> ControlFlow<()> {
        (self.f)(data)
    }
}

/// Turn a closure into an [`IndexVisitor`].
///
/// ```
/// use std::ops::ControlFlow;
/// use std::sync::Arc;
/// use spatial_index::{visitor_fn, Geometry, MemoryStorageManager, Query, SpatialIndex};
///
/// let mut index = SpatialIndex::new(Arc::new(MemoryStorageManager::new())).unwrap();
/// index.add(Geometry::point(1.0, 1.0), "a").unwrap();
/// index.add(Geometry::point(2.0, 2.0), "b").unwrap();
///
/// let mut first = None;
/// index
///     .traverse(
///         Query::All,
///         &mut visitor_fn(|data| {
///             first = Some(*data.value());
///             ControlFlow::Break(())
///         }),
///     )
///     .unwrap();
/// assert!(first.is_some());
/// ```
pub fn visitor_fn<'a, S, V, F>(f: F) -> FnVisitor<F>
where
    S: 'a,
    V: 'a,
    F: FnMut(IndexData<'a, S, V>) -> ControlFlow<()>,
{
    FnVisitor { f }
}

/// A query the index can run.
#[derive(Debug)]
pub enum Query<'q, S> {
    /// Entries whose shape lies within the given shape
    ContainsWhat(&'q S),
    /// Entries whose shape intersects the given shape
    IntersectsWith(&'q S),
    /// The `count` entries nearest to `shape`, nearest first
    NearestNeighbors { count: usize, shape: &'q S },
    /// Every entry
    All,
}

impl<S> Clone for Query<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Query<'_, S> {}

/// Exact test applied to each engine candidate.
#[derive(Debug)]
pub enum Predicate<'q, S> {
    /// The query shape contains the candidate
    Contains(&'q S),
    /// The query shape intersects the candidate
    Intersects(&'q S),
    Any,
}

impl<S: Shape> Predicate<'_, S> {
    pub fn matches(&self, candidate: &S) -> bool {
        match self {
            Predicate::Contains(query) => query.contains(candidate),
            Predicate::Intersects(query) => query.intersects(candidate),
            Predicate::Any => true,
        }
    }
}

/// Engine visitor that resolves, filters and forwards hits to a typed
/// consumer.
pub(crate) struct RefiningVisitor<'a, 'q, 'c, S, V, C: ?Sized> {
    adapter: QueryResultAdapter<'a, S, V>,
    predicate: Predicate<'q, S>,
    consumer: &'c mut C,
}

impl<'a, 'q, 'c, S, V, C> RefiningVisitor<'a, 'q, 'c, S, V, C>
where
    S: Shape,
    C: IndexVisitor<'a, S, V> + ?Sized,
{
    pub fn new(
        adapter: QueryResultAdapter<'a, S, V>,
        predicate: Predicate<'q, S>,
        consumer: &'c mut C,
    ) -> Self {
        Self {
            adapter,
            predicate,
            consumer,
        }
    }
}

impl<'a, S, V, C> Visitor for RefiningVisitor<'a, '_, '_, S, V, C>
where
    S: Shape,
    C: IndexVisitor<'a, S, V> + ?Sized,
{
    fn visit_data(&mut self, data: &EngineData) -> SpatialResult<ControlFlow<()>> {
        let record = self.adapter.resolve(data, None)?;
        if !self.predicate.matches(record.shape()) {
            return Ok(ControlFlow::Continue(()));
        }
        Ok(self.consumer.visit(record))
    }
}
