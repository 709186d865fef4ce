//! Persistence backends the engine stores its nodes in.
//!
//! A storage manager is a byte-addressable page store. The engine hands it
//! opaque byte arrays and gets back page ids; it never interprets the bytes
//! and the index never disposes it. Three implementations are provided:
//!
//! - [`MemoryStorageManager`]: pages in a hash map, for tests and
//!   short-lived indexes
//! - [`DiskStorageManager`]: fixed-size pages in a single file with an
//!   on-disk free list and optional checksums
//! - [`BufferedStorageManager`]: an LRU write-back cache in front of any
//!   other manager

mod buffer;
mod disk;
mod memory;
#[cfg(test)]
pub(crate) mod testing;

pub use buffer::{BufferStats, BufferedStorageManager};
pub use disk::{DiskStorageConfig, DiskStorageManager};
pub use memory::MemoryStorageManager;

use crate::errors::SpatialResult;

/// Page ID - unique identifier for a byte array inside a storage manager
pub type PageId = u64;

/// A byte-addressable page store.
///
/// Implementations are shared between the index and the caller through an
/// `Arc`, so every method takes `&self` and implementations synchronize
/// internally.
pub trait StorageManager: Send + Sync {
    /// Loads the byte array stored at `page`.
    ///
    /// Fails with [`SpatialError::InvalidPage`](crate::SpatialError::InvalidPage)
    /// if the page was never allocated or has been deleted.
    fn load_byte_array(&self, page: PageId) -> SpatialResult<Vec<u8>>;

    /// Stores `data` at `page`, or at a newly allocated page when `page` is
    /// `None`, and returns the page it was written to.
    fn store_byte_array(&self, page: Option<PageId>, data: &[u8]) -> SpatialResult<PageId>;

    /// Releases `page`. Its id may be handed out again by a later store.
    fn delete_byte_array(&self, page: PageId) -> SpatialResult<()>;

    /// Makes every completed store durable.
    fn flush(&self) -> SpatialResult<()>;

    /// Number of live pages.
    fn page_count(&self) -> u64;

    /// Largest byte array a single page can hold, or `None` when pages
    /// grow to fit.
    fn max_payload(&self) -> Option<usize> {
        None
    }
}
