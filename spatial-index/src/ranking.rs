//! Exact ranking of nearest-neighbor candidates.
//!
//! The engine orders candidates by bounding-box distance, which is only a
//! lower bound of the real shape distance. The ranker recomputes the exact
//! distance of every candidate, keeps the best `k`, and stops the engine as
//! soon as no unseen candidate can beat them.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::ControlFlow;

use crate::adapter::QueryResultAdapter;
use crate::bridge::IndexVisitor;
use crate::engine::{EngineData, Visitor};
use crate::entry::EntryId;
use crate::errors::SpatialResult;
use crate::shape::Shape;

/// A candidate with its exact distance. Orders by (distance, id), so ties
/// go to the entry added first.
#[derive(Debug, Clone, Copy)]
struct Ranked {
    distance: f64,
    id: EntryId,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Engine visitor that keeps the `k` entries nearest to a query shape.
pub(crate) struct NearestNeighborRanker<'a, 'q, S, V> {
    adapter: QueryResultAdapter<'a, S, V>,
    query: &'q S,
    k: usize,
    /// Max-heap, the current k-th best candidate on top
    best: BinaryHeap<Ranked>,
}

impl<'a, 'q, S: Shape, V> NearestNeighborRanker<'a, 'q, S, V> {
    pub fn new(adapter: QueryResultAdapter<'a, S, V>, query: &'q S, k: usize) -> Self {
        Self {
            adapter,
            query,
            k,
            best: BinaryHeap::with_capacity(k.saturating_add(1).min(1024)),
        }
    }

    /// Whether nothing at box distance `mindist` or beyond can enter the
    /// result any more.
    fn is_settled(&self, mindist: f64) -> bool {
        if self.best.len() < self.k {
            return false;
        }
        match self.best.peek() {
            Some(kth) => kth.distance < mindist,
            None => false,
        }
    }

    /// The ranked result, nearest first.
    pub fn into_ranked(self) -> Vec<(EntryId, f64)> {
        self.best
            .into_sorted_vec()
            .into_iter()
            .map(|r| (r.id, r.distance))
            .collect()
    }

    /// Hand the ranked result to `consumer`, nearest first.
    pub fn emit<C>(self, consumer: &mut C) -> SpatialResult<()>
    where
        C: IndexVisitor<'a, S, V> + ?Sized,
    {
        let adapter = self.adapter;
        for (id, distance) in self.into_ranked() {
            let record = adapter.resolve_ranked(id, distance)?;
            if consumer.visit(record).is_break() {
                break;
            }
        }
        Ok(())
    }
}

impl<S: Shape, V> Visitor for NearestNeighborRanker<'_, '_, S, V> {
    fn visit_data(&mut self, data: &EngineData) -> SpatialResult<ControlFlow<()>> {
        if self.k == 0 || self.is_settled(data.mindist.unwrap_or(0.0)) {
            return Ok(ControlFlow::Break(()));
        }

        let (entry, _) = self.adapter.entry(data.id)?;
        let candidate = Ranked {
            distance: entry.shape().distance_to(self.query),
            id: data.id,
        };

        if self.best.len() < self.k {
            self.best.push(candidate);
        } else if let Some(mut kth) = self.best.peek_mut() {
            if candidate < *kth {
                *kth = candidate;
            }
        }
        Ok(ControlFlow::Continue(()))
    }
}
