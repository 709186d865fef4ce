//! # Spatial Index
//!
//! A generic spatial index that maps shapes to values, backed by a paged
//! R-Tree engine over a pluggable storage manager.
//!
//! ## Features
//!
//! - **Typed API**: any [`Shape`] implementation as key, any value type
//! - **Pluggable Storage**: in-memory, file-backed and LRU-buffered page stores
//! - **Two-Phase Search**: bounding-box search in the engine followed by an
//!   exact shape check
//! - **Exact Nearest Neighbors**: best-first search ranked by real shape
//!   distance, ties broken by insertion order
//! - **Three Consumption Styles**: collected results, streaming callbacks
//!   with early exit, and full scans
//!
//! ## Quick Start
//!
//! ```rust
//! use std::ops::ControlFlow;
//! use std::sync::Arc;
//! use spatial_index::{Geometry, MemoryStorageManager, SpatialIndex};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut index = SpatialIndex::new(Arc::new(MemoryStorageManager::new()))?;
//! index.add(Geometry::point(1.0, 1.0), "cafe")?;
//! index.add(Geometry::circle(5.0, 5.0, 2.0), "park")?;
//!
//! // Collected
//! let nearest = index.nearest_neighbors(1, &Geometry::point(0.0, 0.0))?;
//! assert_eq!(*nearest[0].value(), "cafe");
//!
//! // Streamed, stopping after the first hit
//! let mut first = None;
//! index.visit_intersects_with(&Geometry::region(0.0, 0.0, 10.0, 10.0), |data| {
//!     first = Some(*data.value());
//!     ControlFlow::Break(())
//! })?;
//! assert!(first.is_some());
//!
//! index.dispose()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use spatial_index::{BufferedStorageManager, DiskStorageManager, Geometry, SpatialIndex};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let disk = Arc::new(DiskStorageManager::create("places.idx")?);
//! let storage = Arc::new(BufferedStorageManager::with_capacity(disk, 256));
//!
//! let mut index = SpatialIndex::new(storage)?;
//! index.add(Geometry::region(0.0, 0.0, 10.0, 10.0), 42u32)?;
//! index.flush()?;
//! # Ok(())
//! # }
//! ```

mod adapter;
pub mod bounding_box;
pub mod bridge;
pub mod config;
pub mod constants;
pub mod engine;
pub mod entry;
pub mod errors;
pub mod facade;
pub mod geometry;
mod ranking;
pub mod shape;
pub mod storage;

pub use bounding_box::BoundingBox;
pub use bridge::{visitor_fn, FnVisitor, IndexData, IndexVisitor, Predicate, Query};
pub use config::RTreeConfig;
pub use engine::{EngineData, EngineStats, IntegrityReport, RTree, SpatialEngine, Visitor};
pub use entry::{Entry, EntryId};
pub use errors::{ErrorKind, SpatialError, SpatialResult};
pub use facade::{IndexState, IndexStats, SpatialIndex};
pub use geometry::{Coordinate, Geometry, Point};
pub use shape::Shape;
pub use storage::{
    BufferStats, BufferedStorageManager, DiskStorageConfig, DiskStorageManager,
    MemoryStorageManager, PageId, StorageManager,
};
