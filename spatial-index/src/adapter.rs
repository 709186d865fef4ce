//! Typed side of the engine boundary.
//!
//! The engine only stores [`EntryId`]s. [`PayloadTable`] maps every id that
//! is live in the engine back to its shape and value, and
//! [`QueryResultAdapter`] turns what the engine reports into
//! [`IndexData`] records through that table.

use std::collections::HashMap;

use crate::bridge::IndexData;
use crate::engine::EngineData;
use crate::entry::{Entry, EntryId};
use crate::errors::{SpatialError, SpatialResult};
use crate::shape::Shape;

/// Maps entry ids to the typed (shape, value) pairs they were added with.
///
/// Kept in lockstep with the engine: an id is present here exactly while
/// the engine holds an entry with that id.
pub(crate) struct PayloadTable<S, V> {
    entries: HashMap<EntryId, (Entry<S>, V)>,
    next_id: EntryId,
}

impl<S: Shape, V> PayloadTable<S, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 0,
        }
    }

    /// Hands out the next entry id. Ids of failed inserts are not reused.
    pub fn reserve_id(&mut self) -> EntryId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, entry: Entry<S>, value: V) {
        self.entries.insert(entry.id(), (entry, value));
    }

    pub fn remove(&mut self, id: EntryId) -> Option<(Entry<S>, V)> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: EntryId) -> Option<&(Entry<S>, V)> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Resolves engine hits against a [`PayloadTable`].
pub(crate) struct QueryResultAdapter<'a, S, V> {
    table: &'a PayloadTable<S, V>,
}

impl<S, V> Clone for QueryResultAdapter<'_, S, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, V> Copy for QueryResultAdapter<'_, S, V> {}

impl<'a, S: Shape, V> QueryResultAdapter<'a, S, V> {
    pub fn new(table: &'a PayloadTable<S, V>) -> Self {
        Self { table }
    }

    /// Look up the entry behind `id`.
    ///
    /// A miss means the engine reported an entry the table does not know,
    /// which is never a caller error.
    pub fn entry(&self, id: EntryId) -> SpatialResult<&'a (Entry<S>, V)> {
        self.table.get(id).ok_or_else(|| {
            log::error!("Engine reported entry {} which has no payload", id);
            SpatialError::InconsistentState(format!("No payload for entry {}", id))
        })
    }

    /// Convert an engine hit into a typed record.
    pub fn resolve(
        &self,
        data: &EngineData,
        distance: Option<f64>,
    ) -> SpatialResult<IndexData<'a, S, V>> {
        let (entry, value) = self.entry(data.id)?;
        if entry.bounding_box() != data.mbr {
            log::error!(
                "Engine box {} for entry {} does not match its shape box {}",
                data.mbr,
                data.id,
                entry.bounding_box()
            );
            return Err(SpatialError::InconsistentState(format!(
                "Entry {} is indexed under a stale bounding box",
                data.id
            )));
        }
        Ok(IndexData::new(entry.id(), entry.shape(), value, distance))
    }

    /// Convert a ranked id into a typed record carrying its distance.
    pub fn resolve_ranked(&self, id: EntryId, distance: f64) -> SpatialResult<IndexData<'a, S, V>> {
        let (entry, value) = self.entry(id)?;
        Ok(IndexData::new(entry.id(), entry.shape(), value, Some(distance)))
    }
}
