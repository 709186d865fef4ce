//! LRU write-back cache in front of another storage manager.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use super::{PageId, StorageManager};
use crate::constants::DEFAULT_BUFFER_PAGES;
use crate::errors::{SpatialError, SpatialResult};

/// A cached page with its data and dirty flag
struct CachedPage {
    bytes: Vec<u8>,
    dirty: bool,
}

/// Counters collected by a [`BufferedStorageManager`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Loads served from the cache
    pub hits: u64,
    /// Loads that went to the inner manager
    pub misses: u64,
    /// Reads issued against the inner manager
    pub reads: u64,
    /// Writes issued against the inner manager
    pub writes: u64,
}

impl BufferStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Caches up to `capacity` pages of an inner manager.
///
/// Overwrites of cached pages stay in memory until the page is evicted or
/// [`flush`](StorageManager::flush) is called. Allocations and deletes go
/// to the inner manager immediately so page ids always come from it.
pub struct BufferedStorageManager {
    inner: Arc<dyn StorageManager>,
    cache: Mutex<LruCache<PageId, CachedPage>>,
    hits: AtomicU64,
    misses: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl BufferedStorageManager {
    /// Wrap `inner` with a cache of [`DEFAULT_BUFFER_PAGES`] pages.
    pub fn new(inner: Arc<dyn StorageManager>) -> Self {
        Self::with_capacity(inner, DEFAULT_BUFFER_PAGES)
    }

    /// Wrap `inner` with a cache of `capacity` pages. A capacity of zero is
    /// treated as one.
    pub fn with_capacity(inner: Arc<dyn StorageManager>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    /// Number of pages currently cached.
    pub fn cached_pages(&self) -> usize {
        self.cache.lock().len()
    }

    /// Number of cached pages not yet written to the inner manager.
    pub fn dirty_pages(&self) -> usize {
        self.cache.lock().iter().filter(|(_, page)| page.dirty).count()
    }

    pub fn inner(&self) -> &Arc<dyn StorageManager> {
        &self.inner
    }

    fn write_inner(&self, page: PageId, bytes: &[u8]) -> SpatialResult<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.inner.store_byte_array(Some(page), bytes)?;
        Ok(())
    }

    /// Cache a page, first writing back the least recently used page if it
    /// has to make room. A failed write-back leaves the cache unchanged.
    fn insert_page(
        &self,
        cache: &mut LruCache<PageId, CachedPage>,
        page: PageId,
        cached: CachedPage,
    ) -> SpatialResult<()> {
        if !cache.contains(&page) && cache.len() >= cache.cap().get() {
            if let Some((&lru_id, lru)) = cache.peek_lru() {
                if lru.dirty {
                    log::trace!("Writing back evicted page {}", lru_id);
                    self.write_inner(lru_id, &lru.bytes)?;
                }
            }
            cache.pop_lru();
        }
        cache.put(page, cached);
        Ok(())
    }

    fn check_payload(&self, data: &[u8]) -> SpatialResult<()> {
        match self.inner.max_payload() {
            Some(capacity) if data.len() > capacity => Err(SpatialError::PageOverflow {
                size: data.len(),
                capacity,
            }),
            _ => Ok(()),
        }
    }
}

impl StorageManager for BufferedStorageManager {
    fn load_byte_array(&self, page: PageId) -> SpatialResult<Vec<u8>> {
        let mut cache = self.cache.lock();
        if let Some(cached) = cache.get(&page) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached.bytes.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.reads.fetch_add(1, Ordering::Relaxed);
        let bytes = self.inner.load_byte_array(page)?;
        self.insert_page(
            &mut cache,
            page,
            CachedPage {
                bytes: bytes.clone(),
                dirty: false,
            },
        )?;
        Ok(bytes)
    }

    fn store_byte_array(&self, page: Option<PageId>, data: &[u8]) -> SpatialResult<PageId> {
        let mut cache = self.cache.lock();
        match page {
            Some(page) => {
                if let Some(cached) = cache.get_mut(&page) {
                    // Deferred writes must still fit once written back
                    self.check_payload(data)?;
                    cached.bytes = data.to_vec();
                    cached.dirty = true;
                    return Ok(page);
                }
                // Uncached overwrite goes through so the inner manager
                // validates the page id
                self.write_inner(page, data)?;
                self.insert_page(
                    &mut cache,
                    page,
                    CachedPage {
                        bytes: data.to_vec(),
                        dirty: false,
                    },
                )?;
                Ok(page)
            }
            None => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                let page = self.inner.store_byte_array(None, data)?;
                self.insert_page(
                    &mut cache,
                    page,
                    CachedPage {
                        bytes: data.to_vec(),
                        dirty: false,
                    },
                )?;
                Ok(page)
            }
        }
    }

    fn delete_byte_array(&self, page: PageId) -> SpatialResult<()> {
        let mut cache = self.cache.lock();
        cache.pop(&page);
        self.inner.delete_byte_array(page)
    }

    fn flush(&self) -> SpatialResult<()> {
        let mut cache = self.cache.lock();
        let mut written = 0usize;
        for (page, cached) in cache.iter_mut() {
            if cached.dirty {
                self.writes.fetch_add(1, Ordering::Relaxed);
                self.inner.store_byte_array(Some(*page), &cached.bytes)?;
                cached.dirty = false;
                written += 1;
            }
        }
        drop(cache);

        log::debug!("Flushed {} dirty pages", written);
        self.inner.flush()
    }

    fn page_count(&self) -> u64 {
        self.inner.page_count()
    }

    fn max_payload(&self) -> Option<usize> {
        self.inner.max_payload()
    }
}

impl Drop for BufferedStorageManager {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("Failed to flush buffered pages on drop: {}", e);
        }
    }
}
