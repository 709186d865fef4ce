//! The typed spatial index.

use std::fmt::{self, Display, Formatter};
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::adapter::{PayloadTable, QueryResultAdapter};
use crate::bridge::{visitor_fn, IndexData, IndexVisitor, Predicate, Query, RefiningVisitor};
use crate::config::RTreeConfig;
use crate::engine::{EngineData, RTree, SpatialEngine};
use crate::entry::{Entry, EntryId};
use crate::errors::{SpatialError, SpatialResult};
use crate::ranking::NearestNeighborRanker;
use crate::shape::Shape;
use crate::storage::StorageManager;

/// Lifecycle state of a [`SpatialIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// The engine is live and every operation is available.
    Active,
    /// The engine has been released. Every operation fails with
    /// [`SpatialError::ObjectDisposed`].
    Disposed,
}

/// Summary statistics of a [`SpatialIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub entries: u64,
    pub height: u32,
    pub nodes: u64,
    pub dimensions: usize,
    pub leaf_capacity: usize,
    pub index_capacity: usize,
}

/// A spatial index mapping shapes of type `S` to values of type `V`.
///
/// The index owns its engine exclusively and borrows the storage manager it
/// was created with: [`dispose`](SpatialIndex::dispose) releases the engine
/// but never disposes the storage manager.
///
/// Mutations take `&mut self` and queries `&self`, so the borrow checker
/// rules out a mutation running concurrently with a query. Shared queries
/// from several threads are fine when `S` and `V` are `Sync`.
///
/// ## Example
///
/// ```rust
/// use std::sync::Arc;
/// use spatial_index::{Geometry, MemoryStorageManager, SpatialIndex};
///
/// let storage = Arc::new(MemoryStorageManager::new());
/// let mut index = SpatialIndex::new(storage).unwrap();
///
/// index.add(Geometry::region(0.0, 0.0, 10.0, 10.0), "foo").unwrap();
/// index.add(Geometry::region(20.0, 20.0, 30.0, 30.0), "bar").unwrap();
/// index.add(Geometry::region(5.0, 5.0, 15.0, 15.0), "baz").unwrap();
///
/// let hits = index.intersects_with(&Geometry::region(0.0, 0.0, 12.0, 12.0)).unwrap();
/// let mut values: Vec<_> = hits.iter().map(|d| *d.value()).collect();
/// values.sort();
/// assert_eq!(values, vec!["baz", "foo"]);
///
/// let nearest = index.nearest_neighbors(1, &Geometry::point(19.0, 19.0)).unwrap();
/// assert_eq!(*nearest[0].value(), "bar");
/// assert!((nearest[0].distance().unwrap() - 2f64.sqrt()).abs() < 1e-9);
/// ```
pub struct SpatialIndex<S: Shape, V> {
    engine: Option<Box<dyn SpatialEngine>>,
    storage: Arc<dyn StorageManager>,
    table: PayloadTable<S, V>,
}

impl<S: Shape, V> SpatialIndex<S, V> {
    /// Create an index backed by an R-Tree with default capacities.
    pub fn new(storage: Arc<dyn StorageManager>) -> SpatialResult<Self> {
        Self::with_config(storage, RTreeConfig::default())
    }

    /// Create an index backed by an R-Tree configured with `config`.
    pub fn with_config(storage: Arc<dyn StorageManager>, config: RTreeConfig) -> SpatialResult<Self> {
        Self::with_engine(storage, |storage| {
            let engine: Box<dyn SpatialEngine> = Box::new(RTree::create(storage, config)?);
            Ok(engine)
        })
    }

    /// Create an index over an engine built by `factory`.
    ///
    /// The factory receives the storage manager and must return an empty
    /// engine: the index has no values for entries it did not add itself.
    pub fn with_engine<F>(storage: Arc<dyn StorageManager>, factory: F) -> SpatialResult<Self>
    where
        F: FnOnce(Arc<dyn StorageManager>) -> SpatialResult<Box<dyn SpatialEngine>>,
    {
        let engine = factory(storage.clone())?;
        if engine.size() != 0 {
            return Err(SpatialError::InvalidOperation(format!(
                "A new index needs an empty engine, this one holds {} entries",
                engine.size()
            )));
        }

        log::debug!(
            "Created spatial index over a {}-dimensional engine",
            engine.dimensions()
        );
        Ok(Self {
            engine: Some(engine),
            storage,
            table: PayloadTable::new(),
        })
    }

    fn engine(&self) -> SpatialResult<&dyn SpatialEngine> {
        self.engine.as_deref().ok_or(SpatialError::ObjectDisposed)
    }

    /// Adds `shape` with `value`.
    ///
    /// Adding a shape equal to one already stored creates a second,
    /// independent entry.
    pub fn add(&mut self, shape: S, value: V) -> SpatialResult<()> {
        let engine = self
            .engine
            .as_deref_mut()
            .ok_or(SpatialError::ObjectDisposed)?;

        let id = self.table.reserve_id();
        let entry = Entry::new(id, shape);
        // A failed insert leaves the engine as it was; the id is never reused
        engine.insert_data(&entry.bounding_box(), id)?;
        self.table.insert(entry, value);

        log::trace!("Added entry {}", id);
        Ok(())
    }

    /// Removes every entry whose shape is equal to `shape` and returns how
    /// many were removed. Removing a shape that is not stored is a no-op
    /// returning 0.
    pub fn delete(&mut self, shape: &S) -> SpatialResult<usize> {
        let engine = self
            .engine
            .as_deref_mut()
            .ok_or(SpatialError::ObjectDisposed)?;
        let mbr = shape.bounding_box();

        let mut matches: Vec<EntryId> = Vec::new();
        {
            let adapter = QueryResultAdapter::new(&self.table);
            let mut collect = |data: &EngineData| -> SpatialResult<ControlFlow<()>> {
                if data.mbr == mbr {
                    let (entry, _) = adapter.entry(data.id)?;
                    if entry.shape() == shape {
                        matches.push(data.id);
                    }
                }
                Ok(ControlFlow::Continue(()))
            };
            engine.intersects_with_query(&mbr, &mut collect)?;
        }

        for &id in &matches {
            if !engine.delete_data(&mbr, id)? {
                log::error!("Engine lost entry {} before it could be deleted", id);
                return Err(SpatialError::InconsistentState(format!(
                    "Entry {} was reported but could not be deleted",
                    id
                )));
            }
            self.table.remove(id);
            log::trace!("Deleted entry {}", id);
        }
        Ok(matches.len())
    }

    /// Number of entries.
    pub fn count(&self) -> SpatialResult<u64> {
        Ok(self.engine()?.size())
    }

    /// The storage manager the index was created with.
    pub fn storage_manager(&self) -> &Arc<dyn StorageManager> {
        &self.storage
    }

    /// Number of dimensions of the underlying engine.
    pub fn dimensions(&self) -> SpatialResult<usize> {
        Ok(self.engine()?.dimensions())
    }

    /// Runs `query` and pushes every result into `visitor`, stopping early
    /// if the visitor breaks.
    ///
    /// Containment and intersection results arrive in engine order.
    /// Nearest-neighbor results arrive nearest first, ties in insertion
    /// order; they are ranked before the first one is delivered.
    pub fn traverse<'a>(
        &'a self,
        query: Query<'_, S>,
        visitor: &mut dyn IndexVisitor<'a, S, V>,
    ) -> SpatialResult<()> {
        let engine = self.engine()?;
        let adapter = QueryResultAdapter::new(&self.table);

        match query {
            Query::ContainsWhat(shape) => {
                let mut refine = RefiningVisitor::new(adapter, Predicate::Contains(shape), visitor);
                engine.contains_what_query(&shape.bounding_box(), &mut refine)
            }
            Query::IntersectsWith(shape) => {
                let mut refine =
                    RefiningVisitor::new(adapter, Predicate::Intersects(shape), visitor);
                engine.intersects_with_query(&shape.bounding_box(), &mut refine)
            }
            Query::NearestNeighbors { count, shape } => {
                if count == 0 {
                    return Ok(());
                }
                let mut ranker = NearestNeighborRanker::new(adapter, shape, count);
                engine.nearest_neighbor_query(&shape.bounding_box(), &mut ranker)?;
                ranker.emit(visitor)
            }
            Query::All => {
                let mut refine = RefiningVisitor::new(adapter, Predicate::Any, visitor);
                engine.query_all(&mut refine)
            }
        }
    }

    fn collect(&self, query: Query<'_, S>) -> SpatialResult<Vec<IndexData<'_, S, V>>> {
        let mut results = Vec::new();
        self.traverse(
            query,
            &mut visitor_fn(|data| {
                results.push(data);
                ControlFlow::Continue(())
            }),
        )?;
        Ok(results)
    }

    /// Entries whose shape lies within `query`.
    ///
    /// Collects the whole result before returning. Prefer
    /// [`visit_contains_what`](SpatialIndex::visit_contains_what) for large
    /// result sets.
    pub fn contains_what(&self, query: &S) -> SpatialResult<Vec<IndexData<'_, S, V>>> {
        self.collect(Query::ContainsWhat(query))
    }

    /// Streams the entries whose shape lies within `query` to `callback`.
    pub fn visit_contains_what<'a, F>(&'a self, query: &S, callback: F) -> SpatialResult<()>
    where
        F: FnMut(IndexData<'a, S, V>) -> ControlFlow<()>,
    {
        self.traverse(Query::ContainsWhat(query), &mut visitor_fn(callback))
    }

    /// Entries whose shape intersects `query`.
    ///
    /// Collects the whole result before returning. Prefer
    /// [`visit_intersects_with`](SpatialIndex::visit_intersects_with) for
    /// large result sets.
    pub fn intersects_with(&self, query: &S) -> SpatialResult<Vec<IndexData<'_, S, V>>> {
        self.collect(Query::IntersectsWith(query))
    }

    /// Streams the entries whose shape intersects `query` to `callback`.
    pub fn visit_intersects_with<'a, F>(&'a self, query: &S, callback: F) -> SpatialResult<()>
    where
        F: FnMut(IndexData<'a, S, V>) -> ControlFlow<()>,
    {
        self.traverse(Query::IntersectsWith(query), &mut visitor_fn(callback))
    }

    /// The `count` entries nearest to `query`, nearest first. Ties are
    /// broken by insertion order. Returns every entry when `count` exceeds
    /// the number of entries.
    pub fn nearest_neighbors(
        &self,
        count: usize,
        query: &S,
    ) -> SpatialResult<Vec<IndexData<'_, S, V>>> {
        self.collect(Query::NearestNeighbors {
            count,
            shape: query,
        })
    }

    /// Streams the `count` entries nearest to `query` to `callback`,
    /// nearest first.
    pub fn visit_nearest_neighbors<'a, F>(
        &'a self,
        count: usize,
        query: &S,
        callback: F,
    ) -> SpatialResult<()>
    where
        F: FnMut(IndexData<'a, S, V>) -> ControlFlow<()>,
    {
        self.traverse(
            Query::NearestNeighbors {
                count,
                shape: query,
            },
            &mut visitor_fn(callback),
        )
    }

    /// Streams every entry to `callback`, without any geometric filter.
    pub fn for_each<'a, F>(&'a self, callback: F) -> SpatialResult<()>
    where
        F: FnMut(IndexData<'a, S, V>) -> ControlFlow<()>,
    {
        self.traverse(Query::All, &mut visitor_fn(callback))
    }

    /// Every entry, collected into a `Vec`.
    ///
    /// This is a full scan and materializes the whole index; use
    /// [`for_each`](SpatialIndex::for_each) where possible.
    pub fn entries(&self) -> SpatialResult<Vec<IndexData<'_, S, V>>> {
        self.collect(Query::All)
    }

    /// Iterator over every entry. Same cost as
    /// [`entries`](SpatialIndex::entries).
    pub fn iter(&self) -> SpatialResult<std::vec::IntoIter<IndexData<'_, S, V>>> {
        Ok(self.entries()?.into_iter())
    }

    /// Flushes the engine and its storage manager.
    pub fn flush(&self) -> SpatialResult<()> {
        self.engine()?.flush()
    }

    /// Snapshot of the engine's size and shape.
    pub fn stats(&self) -> SpatialResult<IndexStats> {
        let engine = self.engine()?;
        let stats = engine.stats();
        Ok(IndexStats {
            entries: stats.entry_count,
            height: stats.height,
            nodes: stats.node_count,
            dimensions: engine.dimensions(),
            leaf_capacity: stats.leaf_capacity,
            index_capacity: stats.index_capacity,
        })
    }

    /// Checks the engine structure and that every engine entry has a value.
    pub fn is_index_valid(&self) -> SpatialResult<bool> {
        let engine = self.engine()?;
        let report = engine.check_integrity()?;
        for error in &report.errors {
            log::warn!("Integrity check: {}", error);
        }
        Ok(report.is_valid && self.table.len() as u64 == engine.size())
    }

    /// Whether the index is still usable.
    pub fn state(&self) -> IndexState {
        if self.engine.is_some() {
            IndexState::Active
        } else {
            IndexState::Disposed
        }
    }

    /// Shorthand for `state() == IndexState::Disposed`.
    pub fn is_disposed(&self) -> bool {
        self.state() == IndexState::Disposed
    }

    /// Releases the engine and drops every stored value.
    ///
    /// The engine is flushed first; if that fails the engine is released
    /// anyway and the error is returned. Calling `dispose` again is a no-op.
    pub fn dispose(&mut self) -> SpatialResult<()> {
        let engine = match self.engine.take() {
            Some(engine) => engine,
            None => return Ok(()),
        };

        let flushed = engine.flush();
        drop(engine);
        self.table.clear();

        log::debug!("Disposed spatial index");
        flushed
    }
}

impl<S: Shape, V> Display for SpatialIndex<S, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.stats() {
            Ok(stats) => write!(
                f,
                "SpatialIndex(entries={}, height={}, nodes={})",
                stats.entries, stats.height, stats.nodes
            ),
            Err(_) => write!(f, "SpatialIndex(disposed)"),
        }
    }
}

impl<S: Shape, V> Drop for SpatialIndex<S, V> {
    fn drop(&mut self) {
        // Only the engine is released here; the payload table is dropped
        // with the struct
        if let Some(engine) = self.engine.take() {
            log::warn!("Spatial index dropped without dispose, releasing its engine");
            if let Err(e) = engine.flush() {
                log::warn!("Failed to flush spatial index on drop: {}", e);
            }
        }
    }
}
